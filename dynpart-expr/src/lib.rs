//! Expression trees, evaluation and attribute remapping.
//!
//! Plans hand selectors and scans [`Expr`] trees written against the
//! partitioned root's layout. [`attmap`] rewrites them for partitions whose
//! layout differs and [`eval`] evaluates them against rows, parameters and
//! partition rules.

pub mod attmap;
pub mod eval;
pub mod expr;
mod format;

pub use attmap::{AttrMapping, AttributeMap, apply_map, apply_map_all, compute_map, remap_attnos};
pub use eval::{EvalContext, ExprEvaluator, Interpreter, PartitionRuleView, compare_values};
pub use expr::*;
