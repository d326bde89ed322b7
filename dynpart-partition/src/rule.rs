//! Rule bounds and the rule view handed to general level predicates.

use std::cmp::Ordering;

use dynpart_expr::{BoundSide, CompareOp, PartitionRuleView, compare_values};
use dynpart_result::Result;
use dynpart_types::Value;

use crate::hierarchy::{PartitionLevel, PartitionRule};

/// One side of a range rule.
#[derive(Clone, Debug, PartialEq)]
pub enum RangeBound {
    Open,
    Inclusive(Value),
    Exclusive(Value),
}

impl RangeBound {
    pub fn value(&self) -> Option<&Value> {
        match self {
            RangeBound::Open => None,
            RangeBound::Inclusive(v) | RangeBound::Exclusive(v) => Some(v),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PartitionBound {
    Range { lower: RangeBound, upper: RangeBound },
    List(Vec<Value>),
    /// Catch-all for values no sibling rule accepts.
    Default,
}

impl PartitionBound {
    /// `[start, end)`, the usual shape of a range partition.
    pub fn range(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        PartitionBound::Range {
            lower: RangeBound::Inclusive(start.into()),
            upper: RangeBound::Exclusive(end.into()),
        }
    }

    pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        PartitionBound::List(values.into_iter().map(Into::into).collect())
    }

    /// Whether the bound explicitly accepts `value`. NULL is accepted only
    /// by list bounds that name NULL; the default bound accepts nothing
    /// explicitly.
    pub fn contains(&self, value: &Value) -> Result<bool> {
        match self {
            PartitionBound::Default => Ok(false),
            PartitionBound::List(items) => {
                if value.is_null() {
                    return Ok(items.iter().any(Value::is_null));
                }
                for item in items {
                    if value.equals(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            PartitionBound::Range { lower, upper } => {
                if value.is_null() {
                    return Ok(false);
                }
                let above = match lower {
                    RangeBound::Open => true,
                    RangeBound::Inclusive(lo) => value.compare(lo)? != Some(Ordering::Less),
                    RangeBound::Exclusive(lo) => value.compare(lo)? == Some(Ordering::Greater),
                };
                if !above {
                    return Ok(false);
                }
                Ok(match upper {
                    RangeBound::Open => true,
                    RangeBound::Inclusive(hi) => value.compare(hi)? != Some(Ordering::Greater),
                    RangeBound::Exclusive(hi) => value.compare(hi)? == Some(Ordering::Less),
                })
            }
        }
    }

    /// Whether some value accepted by this bound could satisfy
    /// `key <op> value`. Over-approximates for ranges of discrete types.
    pub fn may_satisfy(&self, op: CompareOp, value: &Value) -> Result<bool> {
        if value.is_null() {
            return Ok(false);
        }
        match self {
            PartitionBound::Default => Ok(true),
            PartitionBound::List(items) => {
                for item in items {
                    if compare_values(op, item, value)?.unwrap_or(false) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            PartitionBound::Range { lower, upper } => match op {
                CompareOp::Eq => self.contains(value),
                CompareOp::NotEq => Ok(true),
                CompareOp::Lt | CompareOp::LtEq => match lower {
                    RangeBound::Open => Ok(true),
                    RangeBound::Inclusive(lo) if op == CompareOp::LtEq => {
                        Ok(compare_values(CompareOp::LtEq, lo, value)?.unwrap_or(false))
                    }
                    RangeBound::Inclusive(lo) | RangeBound::Exclusive(lo) => {
                        Ok(compare_values(CompareOp::Lt, lo, value)?.unwrap_or(false))
                    }
                },
                CompareOp::Gt | CompareOp::GtEq => match upper {
                    RangeBound::Open => Ok(true),
                    RangeBound::Inclusive(hi) if op == CompareOp::GtEq => {
                        Ok(compare_values(CompareOp::GtEq, hi, value)?.unwrap_or(false))
                    }
                    RangeBound::Inclusive(hi) | RangeBound::Exclusive(hi) => {
                        Ok(compare_values(CompareOp::Gt, hi, value)?.unwrap_or(false))
                    }
                },
            },
        }
    }

    fn side(&self, side: BoundSide) -> Option<&RangeBound> {
        match (self, side) {
            (PartitionBound::Range { lower, .. }, BoundSide::Lower) => Some(lower),
            (PartitionBound::Range { upper, .. }, BoundSide::Upper) => Some(upper),
            _ => None,
        }
    }
}

/// A rule seen together with its level, so default rules can answer
/// containment relative to their siblings.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub level: &'a PartitionLevel,
    pub rule: &'a PartitionRule,
}

impl PartitionRuleView for RuleContext<'_> {
    fn is_default(&self) -> bool {
        self.rule.is_default()
    }

    fn bound(&self, side: BoundSide) -> Option<&Value> {
        self.rule.bound.side(side).and_then(RangeBound::value)
    }

    fn bound_inclusive(&self, side: BoundSide) -> bool {
        matches!(self.rule.bound.side(side), Some(RangeBound::Inclusive(_)))
    }

    fn bound_open(&self, side: BoundSide) -> bool {
        matches!(self.rule.bound.side(side), Some(RangeBound::Open))
    }

    fn contains(&self, value: &Value) -> Result<bool> {
        if self.rule.is_default() {
            return Ok(!self.level.explicit_contains(value)?);
        }
        self.rule.bound.contains(value)
    }

    fn may_satisfy(&self, op: CompareOp, value: &Value) -> Result<bool> {
        self.rule.bound.may_satisfy(op, value)
    }
}
