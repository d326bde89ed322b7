//! Catalog and storage seams consumed by dynamic scans.
//!
//! [`Catalog`] answers layout and index questions, [`StorageAccess`] opens
//! relations and starts tuple cursors. [`MemStorage`] implements both in
//! memory.

pub mod access;
pub mod catalog;
pub mod mem;

pub use access::{ScanKey, ScanKeyArg, StorageAccess, StoredTuple, TupleCursor};
pub use catalog::{Catalog, LogicalIndexInfo, RelationHandle, RelationLease, StorageKind};
pub use mem::MemStorage;
