//! Access-method specializations of the dynamic scan.
//!
//! Every dynamic scan runs the same state machine ([`crate::DynamicScan`]);
//! what differs per access method is how one partition is opened and read
//! and which plan pieces follow a partition's layout. An
//! [`AccessMethod`] supplies exactly those pieces.

mod bitmap_heap;
mod bitmap_index;
mod index;
mod seq;
mod table;

pub use bitmap_heap::BitmapHeapAccess;
pub use bitmap_index::BitmapIndexAccess;
pub use index::{IndexAccess, IndexQual, IndexQualArg};
pub use seq::SeqAccess;
pub use table::TableAccess;

use dynpart_expr::AttributeMap;
use dynpart_result::{Error, Result};
use dynpart_types::{RelationId, Row, ScanSlotId, Varno};
use dynpart_storage::RelationHandle;

use crate::context::ExecContext;
use crate::exprs::ScanExprs;
use crate::registry::PartitionCursor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Seq,
    Table,
    Index,
    BitmapIndex,
    BitmapHeap,
}

impl AccessKind {
    /// Operator label used in explain output.
    pub fn label(&self) -> &'static str {
        match self {
            AccessKind::Seq => "Dynamic Seq Scan",
            AccessKind::Table => "Dynamic Table Scan",
            AccessKind::Index => "Dynamic Index Scan",
            AccessKind::BitmapIndex => "Dynamic Bitmap Index Scan",
            AccessKind::BitmapHeap => "Dynamic Bitmap Heap Scan",
        }
    }
}

/// What an access method needs from the shared state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Produces rows through a targetlist that must follow the layout.
    pub has_targetlist: bool,
    /// Carries a logical index description that must follow the layout.
    pub remaps_index: bool,
    pub supports_array_keys: bool,
    pub supports_mark_restore: bool,
}

/// Borrowed view of the driver handed to access-method calls.
pub struct ScanCall<'a> {
    pub ctx: &'a ExecContext,
    /// Quals and targetlist in the current partition's layout.
    pub exprs: &'a ScanExprs,
    pub outer: Option<&'a Row>,
    pub slot: Option<ScanSlotId>,
    pub varno: Varno,
}

pub trait AccessMethod {
    type Output;

    fn kind(&self) -> AccessKind;

    fn capabilities(&self) -> Capabilities;

    /// Pick the next partition to open. Most access methods walk the
    /// slot's cursor; paired drivers may ask their partner instead.
    fn next_partition(
        &mut self,
        cursor: &mut PartitionCursor,
        _call: &ScanCall<'_>,
    ) -> Result<Option<RelationId>> {
        Ok(cursor.next())
    }

    /// Rewrite access-method specific plan pieces into a new layout.
    fn remap(&mut self, _map: &AttributeMap, _varno: Varno) -> Result<()> {
        Ok(())
    }

    /// Start reading `relation`. `reuse` is set when the same relation was
    /// already open and its sub-scan may be restarted instead of rebuilt.
    fn open_partition(&mut self, relation: &RelationHandle, reuse: bool, call: &ScanCall<'_>) -> Result<()>;

    fn next(&mut self, call: &ScanCall<'_>) -> Result<Option<Self::Output>>;

    /// Drop the sub-scan of the current partition.
    fn close_partition(&mut self);

    /// Forget anything bound to the previous outer row or parameters.
    fn rescan(&mut self, _outer: Option<&Row>) -> Result<()> {
        Ok(())
    }

    /// Release everything. Called once when the driver ends.
    fn end(&mut self) -> Result<()> {
        self.close_partition();
        Ok(())
    }

    fn mark_pos(&mut self) -> Result<()> {
        Err(mark_restore_unsupported(self.kind()))
    }

    fn restore_pos(&mut self) -> Result<()> {
        Err(mark_restore_unsupported(self.kind()))
    }

    /// Extra explain detail, e.g. index conditions.
    fn describe(&self) -> Option<String> {
        None
    }
}

pub(crate) fn mark_restore_unsupported(kind: AccessKind) -> Error {
    Error::Internal(format!("{} does not support mark/restore", kind.label()))
}

pub(crate) fn no_open_partition(kind: AccessKind) -> Error {
    Error::Internal(format!("{} has no open partition", kind.label()))
}
