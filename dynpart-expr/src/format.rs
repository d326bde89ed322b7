//! Lightweight formatting helpers for expressions, used by explain output
//! and the selector's printable predicate.

use std::fmt;

use dynpart_types::{ROW_ID_ATTNO, TABLE_OID_ATTNO};

use crate::{BoundSide, CompareOp, Expr};

impl CompareOp {
    /// Render the operator as a human-readable symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

impl BoundSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundSide::Lower => "lower",
            BoundSide::Upper => "upper",
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => f.write_str(&v.format_display()),
            Expr::Column(c) => match c.attno {
                TABLE_OID_ATTNO => write!(f, "${}.tableoid", c.varno),
                ROW_ID_ATTNO => write!(f, "${}.ctid", c.varno),
                attno => write!(f, "${}.{}", c.varno, attno),
            },
            Expr::OuterColumn(attno) => write!(f, "outer.{attno}"),
            Expr::Param(i) => write!(f, "${}", i + 1),
            Expr::Compare { op, left, right } => write!(f, "({left} {} {right})", op.as_str()),
            Expr::And(items) => {
                f.write_str("(")?;
                join(f, items, " AND ")?;
                f.write_str(")")
            }
            Expr::Or(items) => {
                f.write_str("(")?;
                join(f, items, " OR ")?;
                f.write_str(")")
            }
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::IsNull(inner) => write!(f, "{inner} IS NULL"),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{expr} {}IN (", if *negated { "NOT " } else { "" })?;
                join(f, list, ", ")?;
                f.write_str(")")
            }
            Expr::Case {
                branches,
                else_expr,
            } => {
                f.write_str("CASE")?;
                for (cond, result) in branches {
                    write!(f, " WHEN {cond} THEN {result}")?;
                }
                if let Some(e) = else_expr {
                    write!(f, " ELSE {e}")?;
                }
                f.write_str(" END")
            }
            Expr::PartRuleContains(value) => write!(f, "partrule contains {value}"),
            Expr::PartRuleMaySatisfy { op, value } => {
                write!(f, "partrule may satisfy {} {value}", op.as_str())
            }
            Expr::PartBound(side) => write!(f, "partbound.{}", side.as_str()),
            Expr::PartBoundInclusive(side) => write!(f, "partbound.{}.inclusive", side.as_str()),
            Expr::PartBoundOpen(side) => write!(f, "partbound.{}.open", side.as_str()),
            Expr::PartDefault => f.write_str("partdefault"),
        }
    }
}
