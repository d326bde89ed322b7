//! Expression trees evaluated by selectors and scans.
#![forbid(unsafe_code)]

use std::cmp::Ordering;

use dynpart_result::Result;
use dynpart_types::{AttrNumber, Value, Varno, is_system_attno};
use rustc_hash::FxHashSet;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Whether `ord` (left compared to right) satisfies the operator.
    #[inline]
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::NotEq => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::LtEq => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::GtEq => ord != Ordering::Less,
        }
    }

    /// Operator with its operands swapped: `a < b` iff `b > a`.
    pub fn commute(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }
}

/// Reference to a column of the relation at range-table position `varno`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub varno: Varno,
    pub attno: AttrNumber,
}

impl ColumnRef {
    pub const fn new(varno: Varno, attno: AttrNumber) -> Self {
        Self { varno, attno }
    }

    #[inline]
    pub fn is_system(&self) -> bool {
        is_system_attno(self.attno)
    }
}

/// Side of a range partition bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundSide {
    Lower,
    Upper,
}

/// Scalar or boolean expression.
///
/// `Column` reads the row being scanned (or the projected row handed to a
/// selector), `OuterColumn` reads the outer row supplied by a parent join
/// or selector input. The `Part*` variants only make sense while a partition
/// rule is under test and read that rule.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(ColumnRef),
    OuterColumn(AttrNumber),
    Param(usize),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    /// True when the rule under test accepts the value. For a default rule
    /// this means no explicit sibling accepts it.
    PartRuleContains(Box<Expr>),
    /// True when some value accepted by the rule under test could satisfy
    /// `key <op> value`.
    PartRuleMaySatisfy {
        op: CompareOp,
        value: Box<Expr>,
    },
    /// Bound value of the rule under test, NULL when open.
    PartBound(BoundSide),
    PartBoundInclusive(BoundSide),
    PartBoundOpen(BoundSide),
    /// True when the rule under test is its level's default rule.
    PartDefault,
}

impl Expr {
    #[inline]
    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    #[inline]
    pub fn col(varno: Varno, attno: AttrNumber) -> Expr {
        Expr::Column(ColumnRef::new(varno, attno))
    }

    #[inline]
    pub fn outer(attno: AttrNumber) -> Expr {
        Expr::OuterColumn(attno)
    }

    #[inline]
    pub fn param(index: usize) -> Expr {
        Expr::Param(index)
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::compare(CompareOp::Eq, left, right)
    }

    pub fn and(exprs: Vec<Expr>) -> Expr {
        Expr::And(exprs)
    }

    pub fn or(exprs: Vec<Expr>) -> Expr {
        Expr::Or(exprs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    pub fn is_null(expr: Expr) -> Expr {
        Expr::IsNull(Box::new(expr))
    }

    pub fn in_list(expr: Expr, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(expr),
            list,
            negated: false,
        }
    }

    pub fn part_contains(value: Expr) -> Expr {
        Expr::PartRuleContains(Box::new(value))
    }

    pub fn part_may_satisfy(op: CompareOp, value: Expr) -> Expr {
        Expr::PartRuleMaySatisfy {
            op,
            value: Box::new(value),
        }
    }

    /// Pre-order walk over this expression and all sub-expressions.
    pub fn walk<'e>(&'e self, f: &mut impl FnMut(&'e Expr)) {
        f(self);
        match self {
            Expr::Literal(_)
            | Expr::Column(_)
            | Expr::OuterColumn(_)
            | Expr::Param(_)
            | Expr::PartBound(_)
            | Expr::PartBoundInclusive(_)
            | Expr::PartBoundOpen(_)
            | Expr::PartDefault => {}
            Expr::Compare { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::And(items) | Expr::Or(items) => items.iter().for_each(|e| e.walk(f)),
            Expr::Not(inner) | Expr::IsNull(inner) | Expr::PartRuleContains(inner) => inner.walk(f),
            Expr::PartRuleMaySatisfy { value, .. } => value.walk(f),
            Expr::InList { expr, list, .. } => {
                expr.walk(f);
                list.iter().for_each(|e| e.walk(f));
            }
            Expr::Case {
                branches,
                else_expr,
            } => {
                for (cond, result) in branches {
                    cond.walk(f);
                    result.walk(f);
                }
                if let Some(e) = else_expr {
                    e.walk(f);
                }
            }
        }
    }

    /// Rebuild the tree with every column reference passed through `f`.
    /// The original expression is left untouched.
    pub fn try_map_columns(&self, f: &mut impl FnMut(ColumnRef) -> Result<ColumnRef>) -> Result<Expr> {
        let mapped = match self {
            Expr::Column(c) => Expr::Column(f(*c)?),
            Expr::Literal(_)
            | Expr::OuterColumn(_)
            | Expr::Param(_)
            | Expr::PartBound(_)
            | Expr::PartBoundInclusive(_)
            | Expr::PartBoundOpen(_)
            | Expr::PartDefault => self.clone(),
            Expr::Compare { op, left, right } => Expr::Compare {
                op: *op,
                left: Box::new(left.try_map_columns(f)?),
                right: Box::new(right.try_map_columns(f)?),
            },
            Expr::And(items) => Expr::And(map_all(items, f)?),
            Expr::Or(items) => Expr::Or(map_all(items, f)?),
            Expr::Not(inner) => Expr::Not(Box::new(inner.try_map_columns(f)?)),
            Expr::IsNull(inner) => Expr::IsNull(Box::new(inner.try_map_columns(f)?)),
            Expr::PartRuleContains(inner) => {
                Expr::PartRuleContains(Box::new(inner.try_map_columns(f)?))
            }
            Expr::PartRuleMaySatisfy { op, value } => Expr::PartRuleMaySatisfy {
                op: *op,
                value: Box::new(value.try_map_columns(f)?),
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => Expr::InList {
                expr: Box::new(expr.try_map_columns(f)?),
                list: map_all(list, f)?,
                negated: *negated,
            },
            Expr::Case {
                branches,
                else_expr,
            } => {
                let mut mapped = Vec::with_capacity(branches.len());
                for (cond, result) in branches {
                    mapped.push((cond.try_map_columns(f)?, result.try_map_columns(f)?));
                }
                let else_expr = match else_expr {
                    Some(e) => Some(Box::new(e.try_map_columns(f)?)),
                    None => None,
                };
                Expr::Case {
                    branches: mapped,
                    else_expr,
                }
            }
        };
        Ok(mapped)
    }

    /// Distinct user attributes of range-table entry `varno` referenced by
    /// this expression, in ascending order.
    pub fn referenced_attnos(&self, varno: Varno) -> Vec<AttrNumber> {
        let mut seen = FxHashSet::default();
        self.walk(&mut |e| {
            if let Expr::Column(c) = e
                && c.varno == varno
                && !c.is_system()
            {
                seen.insert(c.attno);
            }
        });
        let mut out: Vec<_> = seen.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// True when the expression reads the outer row.
    pub fn references_outer(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= matches!(e, Expr::OuterColumn(_)));
        found
    }

    /// True when the expression reads no input row. Partition-rule nodes
    /// and system columns are answered by the selection context and do not
    /// count as row reads.
    pub fn is_row_independent(&self) -> bool {
        let mut independent = true;
        self.walk(&mut |e| match e {
            Expr::Column(c) if !c.is_system() => independent = false,
            Expr::OuterColumn(_) => independent = false,
            _ => {}
        });
        independent
    }
}

fn map_all(items: &[Expr], f: &mut impl FnMut(ColumnRef) -> Result<ColumnRef>) -> Result<Vec<Expr>> {
    items.iter().map(|e| e.try_map_columns(f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_attnos_skips_system_and_other_varnos() {
        let e = Expr::and(vec![
            Expr::eq(Expr::col(1, 3), Expr::lit(5)),
            Expr::eq(Expr::col(1, 1), Expr::col(2, 4)),
            Expr::is_null(Expr::col(1, dynpart_types::TABLE_OID_ATTNO)),
            Expr::eq(Expr::col(1, 3), Expr::outer(1)),
        ]);
        assert_eq!(e.referenced_attnos(1), vec![1, 3]);
        assert_eq!(e.referenced_attnos(2), vec![4]);
        assert!(e.references_outer());
        assert!(!e.is_row_independent());
    }

    #[test]
    fn commute_swaps_direction() {
        assert_eq!(CompareOp::Lt.commute(), CompareOp::Gt);
        assert_eq!(CompareOp::GtEq.commute(), CompareOp::LtEq);
        assert!(CompareOp::LtEq.matches(Ordering::Equal));
        assert!(!CompareOp::Lt.matches(Ordering::Equal));
    }

    #[test]
    fn constants_are_row_independent() {
        let e = Expr::or(vec![Expr::lit(true), Expr::eq(Expr::param(0), Expr::lit(2))]);
        assert!(e.is_row_independent());
        assert!(Expr::part_contains(Expr::lit(3)).is_row_independent());
        assert!(Expr::col(1, dynpart_types::TABLE_OID_ATTNO).is_row_independent());
        assert!(!Expr::part_contains(Expr::col(1, 2)).is_row_independent());
    }
}
