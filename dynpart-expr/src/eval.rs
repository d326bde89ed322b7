//! Expression evaluation.
//!
//! Evaluation is a capability: selectors and scans hold an
//! [`ExprEvaluator`] trait object and never interpret expressions
//! themselves. [`Interpreter`] is the tree-walking reference implementation.

use std::cmp::Ordering;

use dynpart_result::{Error, Result};
use dynpart_types::{ROW_ID_ATTNO, RelationId, Row, RowId, TABLE_OID_ATTNO, Value};

use crate::{BoundSide, CompareOp, Expr};

/// Read access to the partition rule currently under test. Implemented by
/// the partition hierarchy so that general level predicates can inspect
/// rule bounds without this crate knowing the hierarchy types.
pub trait PartitionRuleView {
    fn is_default(&self) -> bool;
    /// Range bound value; `None` for open sides and for non-range rules.
    fn bound(&self, side: BoundSide) -> Option<&Value>;
    fn bound_inclusive(&self, side: BoundSide) -> bool;
    fn bound_open(&self, side: BoundSide) -> bool;
    /// True when the rule accepts `value`.
    fn contains(&self, value: &Value) -> Result<bool>;
    /// True when some value accepted by the rule could satisfy
    /// `key <op> value`. May over-approximate, never under-approximate.
    fn may_satisfy(&self, op: CompareOp, value: &Value) -> Result<bool>;
}

/// Everything an expression can read while being evaluated.
#[derive(Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub scan_row: Option<&'a Row>,
    pub outer_row: Option<&'a Row>,
    pub params: &'a [Value],
    /// Relation the scan row came from; answers `tableoid`.
    pub relation: Option<RelationId>,
    pub row_id: Option<RowId>,
    pub rule: Option<&'a dyn PartitionRuleView>,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_row(mut self, row: &'a Row) -> Self {
        self.scan_row = Some(row);
        self
    }

    pub fn with_outer_row(mut self, row: Option<&'a Row>) -> Self {
        self.outer_row = row;
        self
    }

    pub fn with_params(mut self, params: &'a [Value]) -> Self {
        self.params = params;
        self
    }

    pub fn with_relation(mut self, relation: RelationId) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn with_row_id(mut self, row_id: RowId) -> Self {
        self.row_id = Some(row_id);
        self
    }

    pub fn with_rule(mut self, rule: &'a dyn PartitionRuleView) -> Self {
        self.rule = Some(rule);
        self
    }

    fn rule(&self) -> Result<&'a dyn PartitionRuleView> {
        self.rule.ok_or_else(|| {
            Error::expr_eval("partition rule expression evaluated outside of a rule context")
        })
    }
}

/// Expression evaluation capability.
pub trait ExprEvaluator: Send + Sync {
    fn evaluate(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value>;

    /// Evaluate as a filter: NULL counts as false.
    fn evaluate_predicate(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<bool> {
        Ok(self.evaluate(expr, ctx)?.as_bool()?.unwrap_or(false))
    }
}

/// Tree-walking evaluator with SQL three-valued logic.
#[derive(Clone, Copy, Debug, Default)]
pub struct Interpreter;

impl ExprEvaluator for Interpreter {
    fn evaluate(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
        eval(expr, ctx)
    }
}

fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column(c) => match c.attno {
            TABLE_OID_ATTNO => ctx
                .relation
                .map(|r| Value::Int(r.get() as i64))
                .ok_or_else(|| Error::expr_eval("tableoid read without a current relation")),
            ROW_ID_ATTNO => ctx
                .row_id
                .map(|r| Value::Int(r as i64))
                .ok_or_else(|| Error::expr_eval("row id read without a physical row")),
            attno => {
                let row = ctx
                    .scan_row
                    .ok_or_else(|| Error::expr_eval(format!("column {attno} read without a row")))?;
                row.get(attno).cloned().ok_or_else(|| {
                    Error::expr_eval(format!("column {attno} is outside a row of {} values", row.len()))
                })
            }
        },
        Expr::OuterColumn(attno) => {
            let row = ctx.outer_row.ok_or_else(|| {
                Error::expr_eval(format!("outer column {attno} read without an outer row"))
            })?;
            row.get(*attno).cloned().ok_or_else(|| {
                Error::expr_eval(format!(
                    "outer column {attno} is outside a row of {} values",
                    row.len()
                ))
            })
        }
        Expr::Param(i) => ctx
            .params
            .get(*i)
            .cloned()
            .ok_or_else(|| Error::expr_eval(format!("parameter ${} is not bound", i + 1))),
        Expr::Compare { op, left, right } => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            Ok(compare_values(*op, &l, &r)?.map_or(Value::Null, Value::Bool))
        }
        Expr::And(items) => {
            let mut saw_null = false;
            for item in items {
                match eval(item, ctx)?.as_bool()? {
                    Some(false) => return Ok(Value::Bool(false)),
                    None => saw_null = true,
                    Some(true) => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Bool(true) })
        }
        Expr::Or(items) => {
            let mut saw_null = false;
            for item in items {
                match eval(item, ctx)?.as_bool()? {
                    Some(true) => return Ok(Value::Bool(true)),
                    None => saw_null = true,
                    Some(false) => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Bool(false) })
        }
        Expr::Not(inner) => Ok(eval(inner, ctx)?
            .as_bool()?
            .map_or(Value::Null, |b| Value::Bool(!b))),
        Expr::IsNull(inner) => Ok(Value::Bool(eval(inner, ctx)?.is_null())),
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval(expr, ctx)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for candidate in list {
                let candidate = eval(candidate, ctx)?;
                match needle.compare(&candidate)? {
                    Some(Ordering::Equal) => return Ok(Value::Bool(!negated)),
                    None => saw_null = true,
                    Some(_) => {}
                }
            }
            Ok(if saw_null {
                Value::Null
            } else {
                Value::Bool(*negated)
            })
        }
        Expr::Case {
            branches,
            else_expr,
        } => {
            for (cond, result) in branches {
                if eval(cond, ctx)?.as_bool()? == Some(true) {
                    return eval(result, ctx);
                }
            }
            match else_expr {
                Some(e) => eval(e, ctx),
                None => Ok(Value::Null),
            }
        }
        Expr::PartRuleContains(value) => {
            let rule = ctx.rule()?;
            let v = eval(value, ctx)?;
            Ok(Value::Bool(rule.contains(&v)?))
        }
        Expr::PartRuleMaySatisfy { op, value } => {
            let rule = ctx.rule()?;
            let v = eval(value, ctx)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Bool(rule.may_satisfy(*op, &v)?))
        }
        Expr::PartBound(side) => Ok(ctx.rule()?.bound(*side).cloned().unwrap_or(Value::Null)),
        Expr::PartBoundInclusive(side) => Ok(Value::Bool(ctx.rule()?.bound_inclusive(*side))),
        Expr::PartBoundOpen(side) => Ok(Value::Bool(ctx.rule()?.bound_open(*side))),
        Expr::PartDefault => Ok(Value::Bool(ctx.rule()?.is_default())),
    }
}

/// Apply `op` to two values. `None` when either side is NULL.
pub fn compare_values(op: CompareOp, left: &Value, right: &Value) -> Result<Option<bool>> {
    Ok(left.compare(right)?.map(|ord| op.matches(ord)))
}
