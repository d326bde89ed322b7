//! Tuple access seam used by the dynamic scan drivers.

use croaring::Treemap;
use dynpart_expr::{CompareOp, compare_values};
use dynpart_result::{Error, Result};
use dynpart_types::{AttrNumber, IndexId, RelationId, Row, RowId, Value};

use crate::catalog::{Catalog, RelationHandle};

/// A tuple as stored, with its physical row id.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredTuple {
    pub row_id: RowId,
    pub row: Row,
}

/// Argument of a scan key: a single value or, for access methods that
/// support it, an array matched with "any element" semantics.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanKeyArg {
    Value(Value),
    Array(Vec<Value>),
}

/// Index search condition `index_column <op> arg`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanKey {
    /// 1-based index column.
    pub index_column: usize,
    pub op: CompareOp,
    pub arg: ScanKeyArg,
}

impl ScanKey {
    pub fn new(index_column: usize, op: CompareOp, arg: ScanKeyArg) -> Self {
        Self {
            index_column,
            op,
            arg,
        }
    }

    /// Whether an index column value satisfies this key. NULL never does.
    pub fn matches(&self, value: &Value) -> Result<bool> {
        match &self.arg {
            ScanKeyArg::Value(arg) => Ok(compare_values(self.op, value, arg)?.unwrap_or(false)),
            ScanKeyArg::Array(items) => {
                for item in items {
                    if compare_values(self.op, value, item)?.unwrap_or(false) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Forward cursor over the tuples of one relation.
pub trait TupleCursor: Send {
    fn next_tuple(&mut self) -> Result<Option<StoredTuple>>;

    /// Restart from the beginning, with new keys for keyed cursors.
    fn rescan(&mut self, keys: &[ScanKey]) -> Result<()>;

    fn mark_pos(&mut self) -> Result<()> {
        Err(Error::Internal(
            "cursor does not support mark/restore".to_string(),
        ))
    }

    fn restore_pos(&mut self) -> Result<()> {
        Err(Error::Internal(
            "cursor does not support mark/restore".to_string(),
        ))
    }
}

/// Opening relations and starting scans over them.
pub trait StorageAccess: Catalog {
    fn open_relation(&self, relation: RelationId) -> Result<RelationHandle>;

    /// Full scan. `columns` lists the attributes the caller reads; columnar
    /// relations may leave the others NULL.
    fn heap_scan(
        &self,
        relation: &RelationHandle,
        columns: Option<&[AttrNumber]>,
    ) -> Result<Box<dyn TupleCursor>>;

    /// Ordered index scan returning matching tuples.
    fn index_scan(
        &self,
        relation: &RelationHandle,
        index: IndexId,
        keys: &[ScanKey],
    ) -> Result<Box<dyn TupleCursor>>;

    /// Row ids of tuples matching `keys` through `index`.
    fn index_bitmap(&self, relation: &RelationHandle, index: IndexId, keys: &[ScanKey]) -> Result<Treemap>;

    /// Fetch tuples whose row ids are set in `bitmap`, in row-id order.
    fn bitmap_fetch(&self, relation: &RelationHandle, bitmap: &Treemap) -> Result<Box<dyn TupleCursor>>;
}
