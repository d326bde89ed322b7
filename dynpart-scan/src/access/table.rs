use dynpart_result::Result;
use dynpart_types::Row;
use dynpart_storage::{RelationHandle, StorageKind};
use tracing::trace;

use super::{AccessKind, AccessMethod, Capabilities, ScanCall, no_open_partition};
use crate::subscan::SubScan;

/// Storage-agnostic table scan. Columnar partitions are asked for only the
/// columns the qual and targetlist read.
#[derive(Default)]
pub struct TableAccess {
    scan: Option<SubScan>,
}

impl TableAccess {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessMethod for TableAccess {
    type Output = Row;

    fn kind(&self) -> AccessKind {
        AccessKind::Table
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_targetlist: true,
            remaps_index: false,
            supports_array_keys: false,
            supports_mark_restore: false,
        }
    }

    fn open_partition(&mut self, relation: &RelationHandle, reuse: bool, call: &ScanCall<'_>) -> Result<()> {
        if reuse && let Some(scan) = self.scan.as_mut() {
            return scan.rescan(&[]);
        }
        let columns = match relation.kind() {
            StorageKind::Columnar => call.exprs.needed_columns(call.varno),
            StorageKind::Heap | StorageKind::AppendOptimized => None,
        };
        trace!(relation = %relation.id(), kind = ?relation.kind(), columns = ?columns, "opening table partition");
        let cursor = call.ctx.storage().heap_scan(relation, columns.as_deref())?;
        self.scan = Some(SubScan::new(cursor, relation.id()));
        Ok(())
    }

    fn next(&mut self, call: &ScanCall<'_>) -> Result<Option<Row>> {
        match self.scan.as_mut() {
            Some(scan) => scan.next_row(call),
            None => Err(no_open_partition(self.kind())),
        }
    }

    fn close_partition(&mut self) {
        self.scan = None;
    }
}
