use croaring::Treemap;
use dynpart_result::{Error, Result};
use dynpart_types::{RelationId, Row};
use dynpart_storage::RelationHandle;
use tracing::trace;

use super::{AccessKind, AccessMethod, BitmapIndexAccess, Capabilities, ScanCall, no_open_partition};
use crate::driver::DynamicScan;
use crate::registry::PartitionCursor;
use crate::subscan::SubScan;

/// Heap fetch driven by a paired dynamic bitmap index scan.
///
/// The heap side does not walk the selected set itself: every bitmap the
/// child yields belongs to whichever partition the child last published as
/// current, and that partition is the one opened next.
pub struct BitmapHeapAccess {
    child: DynamicScan<BitmapIndexAccess>,
    pending: Option<Treemap>,
    scan: Option<SubScan>,
}

impl BitmapHeapAccess {
    pub fn new(child: DynamicScan<BitmapIndexAccess>) -> Self {
        Self {
            child,
            pending: None,
            scan: None,
        }
    }

    pub fn child(&self) -> &DynamicScan<BitmapIndexAccess> {
        &self.child
    }
}

impl AccessMethod for BitmapHeapAccess {
    type Output = Row;

    fn kind(&self) -> AccessKind {
        AccessKind::BitmapHeap
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_targetlist: true,
            remaps_index: false,
            supports_array_keys: false,
            supports_mark_restore: false,
        }
    }

    fn next_partition(
        &mut self,
        _cursor: &mut PartitionCursor,
        call: &ScanCall<'_>,
    ) -> Result<Option<RelationId>> {
        let Some(bitmap) = self.child.next()? else {
            return Ok(None);
        };
        let slot = call
            .slot
            .ok_or_else(|| Error::Internal("bitmap heap scan requires a scan slot".to_string()))?;
        let relation = call.ctx.registry_read()?.current_relation_for(slot)?;
        trace!(relation = %relation, rows = bitmap.cardinality(), "bitmap heap scan picked up partition");
        self.pending = Some(bitmap);
        Ok(Some(relation))
    }

    fn open_partition(&mut self, relation: &RelationHandle, _reuse: bool, call: &ScanCall<'_>) -> Result<()> {
        let bitmap = self
            .pending
            .take()
            .ok_or_else(|| Error::Internal("bitmap heap scan opened a partition without a bitmap".to_string()))?;
        let cursor = call.ctx.storage().bitmap_fetch(relation, &bitmap)?;
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

    fn rescan(&mut self, outer: Option<&Row>) -> Result<()> {
        self.pending = None;
        self.child.rescan(outer)
    }

    fn end(&mut self) -> Result<()> {
        self.close_partition();
        self.pending = None;
        self.child.end()
    }

    fn describe(&self) -> Option<String> {
        Some(format!("bitmap from {}", self.child.explain()))
    }
}
