//! Dynamic partition scans.
//!
//! A [`ScanRegistry`] records, per scan slot, which leaf partitions the
//! partition selectors chose. A [`DynamicScan`] reads that set back and
//! scans each partition in turn with the access method it was planned
//! with, rewriting its expressions whenever a partition's physical layout
//! differs from the previous one.

pub mod access;
pub mod context;
pub mod driver;
pub mod exprs;
pub mod registry;
pub mod state;
mod subscan;

pub use access::{
    AccessKind, AccessMethod, BitmapHeapAccess, BitmapIndexAccess, Capabilities, IndexAccess,
    IndexQual, IndexQualArg, ScanCall, SeqAccess, TableAccess,
};
pub use context::{ExecContext, ScanOptions};
pub use driver::{DynamicScan, DynamicScanSpec, PartitionSource, ScanStats, ScanTarget};
pub use exprs::ScanExprs;
pub use registry::{
    PartitionCursor, ScanRegistry, ScanSlotState, SelectedPartitionEntry, SharedScanRegistry,
};
pub use state::ScanState;

pub type DynamicSeqScan = DynamicScan<SeqAccess>;
pub type DynamicTableScan = DynamicScan<TableAccess>;
pub type DynamicIndexScan = DynamicScan<IndexAccess>;
pub type DynamicBitmapIndexScan = DynamicScan<BitmapIndexAccess>;
pub type DynamicBitmapHeapScan = DynamicScan<BitmapHeapAccess>;
