//! Partition hierarchies and the runtime partition selection engine.

pub mod hierarchy;
pub mod provider;
pub mod rule;
pub mod selection;

pub use hierarchy::{PartitionHierarchy, PartitionKey, PartitionLevel, PartitionRule};
pub use provider::{HierarchyCache, PartitionCatalog, StaticPartitionCatalog};
pub use rule::{PartitionBound, RangeBound, RuleContext};
pub use selection::{
    PartitionSelection, SelectedPartition, SelectionInput, SelectionPredicates, select_partitions,
};
