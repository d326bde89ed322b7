//! dynpart: runtime partition pruning and dynamic partition scans.
//!
//! This crate is the entrypoint for the `dynpart-*` workspace. It re-exports
//! the pieces an executor needs to prune partitions while a query runs and
//! to scan only the partitions that survive.
//!
//! # Quick Start
//!
//! Select partitions statically and scan them:
//!
//! ```rust
//! use std::sync::Arc;
//! use dynpart::{
//!     DynamicScanSpec, ExecutorConfig, PartitionSelectorSpec, QueryExecution, SeqAccess,
//!     SequenceExec,
//! };
//! use dynpart::expr::Expr;
//! use dynpart::partition::{
//!     PartitionBound, PartitionHierarchy, PartitionKey, PartitionLevel, PartitionRule,
//!     SelectionPredicates, StaticPartitionCatalog,
//! };
//! use dynpart::storage::{MemStorage, StorageKind};
//! use dynpart::types::{
//!     ColumnDef, DataType, RelationId, RelationSchema, ScanSlotId, SelectorId, row,
//! };
//!
//! let (root, east, west) = (RelationId::new(1), RelationId::new(2), RelationId::new(3));
//! let schema = RelationSchema::new(vec![
//!     ColumnDef::new("region", DataType::Text),
//!     ColumnDef::new("amount", DataType::Int),
//! ]);
//! let storage = Arc::new(MemStorage::new());
//! for (id, name) in [(root, "orders"), (east, "orders_east"), (west, "orders_west")] {
//!     storage.create_relation(id, name, schema.clone(), StorageKind::Heap).unwrap();
//! }
//! storage.insert_rows(east, vec![row!["east", 10]]).unwrap();
//! storage.insert_rows(west, vec![row!["west", 20]]).unwrap();
//!
//! let catalog = Arc::new(StaticPartitionCatalog::new());
//! catalog
//!     .register(
//!         PartitionHierarchy::new(
//!             root,
//!             PartitionLevel::new(
//!                 PartitionKey::column(1, DataType::Text),
//!                 vec![
//!                     PartitionRule::leaf("east", east, PartitionBound::list(["east"])),
//!                     PartitionRule::leaf("west", west, PartitionBound::list(["west"])),
//!                 ],
//!             ),
//!         )
//!         .unwrap(),
//!     )
//!     .unwrap();
//!
//! let query = QueryExecution::new(storage, catalog, ExecutorConfig::default());
//! let slot = ScanSlotId::new(1);
//! let predicates = SelectionPredicates::new(1).with_equality(0, Expr::lit("west"));
//! let selector = query
//!     .partition_selector(
//!         PartitionSelectorSpec::static_selection(SelectorId::new(1), slot, root, predicates),
//!         None,
//!     )
//!     .unwrap();
//! let scan = query
//!     .dynamic_scan(DynamicScanSpec::partitions(root, slot), SeqAccess::new())
//!     .unwrap();
//! let mut plan = SequenceExec::new(vec![Box::new(selector), Box::new(scan)]).unwrap();
//! assert_eq!(query.run(&mut plan).unwrap(), vec![row!["west", 20]]);
//! ```
//!
//! # Architecture
//!
//! - **Types** (`dynpart-types`, `dynpart-result`): ids, values, layouts and errors.
//! - **Expressions** (`dynpart-expr`): expression trees, the evaluator seam and
//!   the attribute remapper that rewrites expressions between layouts.
//! - **Partitioning** (`dynpart-partition`): hierarchies and the selection engine.
//! - **Scanning** (`dynpart-scan`): the scan registry and dynamic scan drivers.
//! - **Execution** (`dynpart-executor`): the partition selector operator and
//!   per-query lifecycle.

pub use dynpart_result::{Error, Result};

pub use dynpart_executor::{
    BoxedNode, ExecutorConfig, NestedLoopJoinExec, PartitionSelectorExec, PartitionSelectorSpec,
    PlanNode, QueryExecution, SelectionReport, SelectorMode, SequenceExec, ValuesExec,
    explain_plan,
};
pub use dynpart_scan::{
    AccessMethod, BitmapHeapAccess, BitmapIndexAccess, DynamicBitmapHeapScan,
    DynamicBitmapIndexScan, DynamicIndexScan, DynamicScan, DynamicScanSpec, DynamicSeqScan,
    DynamicTableScan, ExecContext, IndexAccess, IndexQual, ScanOptions, ScanRegistry, SeqAccess,
    TableAccess,
};

pub mod types {
    //! Identifiers, values, layouts and rows.
    pub use dynpart_types::*;
}

pub mod expr {
    //! Expression trees, evaluation and attribute remapping.
    pub use dynpart_expr::*;
}

pub mod partition {
    //! Partition hierarchies and the selection engine.
    pub use dynpart_partition::*;
}

pub mod storage {
    //! Catalog and storage seams with the in-memory implementation.
    pub use dynpart_storage::*;
}

pub mod scan {
    //! Scan registry and dynamic scan drivers.
    pub use dynpart_scan::*;
}
