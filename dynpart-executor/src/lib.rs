//! Plan operators around dynamic partition scans: the partition selector,
//! the sequence and nested-loop glue that orders selectors before scans,
//! and the per-query execution context that owns the scan registry.

pub mod config;
pub mod diagnostics;
pub mod join;
pub mod node;
pub mod query;
pub mod selector;
pub mod sequence;

pub use config::{ExecutorConfig, INTERRUPT_CHECK_INTERVAL_ENV, LOG_SELECTION_ENV};
pub use diagnostics::{SelectionReport, SlotReport};
pub use join::NestedLoopJoinExec;
pub use node::{BoxedNode, PlanNode, ValuesExec, explain_plan};
pub use query::QueryExecution;
pub use selector::{PartitionSelectorExec, PartitionSelectorSpec, SelectorMode, SelectorStats};
pub use sequence::SequenceExec;
