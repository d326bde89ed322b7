use dynpart_result::Result;
use dynpart_types::Row;
use dynpart_storage::RelationHandle;

use super::{AccessKind, AccessMethod, Capabilities, ScanCall, no_open_partition};
use crate::subscan::SubScan;

/// Sequential heap scan of each partition.
#[derive(Default)]
pub struct SeqAccess {
    scan: Option<SubScan>,
}

impl SeqAccess {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessMethod for SeqAccess {
    type Output = Row;

    fn kind(&self) -> AccessKind {
        AccessKind::Seq
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_targetlist: true,
            remaps_index: false,
            supports_array_keys: false,
            supports_mark_restore: true,
        }
    }

    fn open_partition(&mut self, relation: &RelationHandle, reuse: bool, call: &ScanCall<'_>) -> Result<()> {
        if reuse && let Some(scan) = self.scan.as_mut() {
            return scan.rescan(&[]);
        }
        let cursor = call.ctx.storage().heap_scan(relation, None)?;
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

    fn mark_pos(&mut self) -> Result<()> {
        match self.scan.as_mut() {
            Some(scan) => scan.mark_pos(),
            None => Err(no_open_partition(AccessKind::Seq)),
        }
    }

    fn restore_pos(&mut self) -> Result<()> {
        match self.scan.as_mut() {
            Some(scan) => scan.restore_pos(),
            None => Err(no_open_partition(AccessKind::Seq)),
        }
    }
}
