use croaring::Treemap;
use dynpart_expr::AttributeMap;
use dynpart_result::Result;
use dynpart_types::{Row, Varno};
use dynpart_storage::{LogicalIndexInfo, RelationHandle, ScanKey};
use tracing::trace;

use super::index::{IndexQual, build_scan_keys, describe_index};
use super::{AccessKind, AccessMethod, Capabilities, ScanCall};

/// Produces one row-id bitmap per partition and publishes the partition as
/// the slot's current relation, for a paired bitmap heap scan to consume.
pub struct BitmapIndexAccess {
    logical: LogicalIndexInfo,
    quals: Vec<IndexQual>,
    keys: Option<Vec<ScanKey>>,
    pending: Option<Treemap>,
}

impl BitmapIndexAccess {
    pub fn new(logical: LogicalIndexInfo, quals: Vec<IndexQual>) -> Self {
        Self {
            logical,
            quals,
            keys: None,
            pending: None,
        }
    }

    pub fn logical_index(&self) -> &LogicalIndexInfo {
        &self.logical
    }
}

impl AccessMethod for BitmapIndexAccess {
    type Output = Treemap;

    fn kind(&self) -> AccessKind {
        AccessKind::BitmapIndex
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_targetlist: false,
            remaps_index: true,
            supports_array_keys: true,
            supports_mark_restore: false,
        }
    }

    fn remap(&mut self, map: &AttributeMap, varno: Varno) -> Result<()> {
        self.logical = self.logical.remap(map, varno)?;
        self.quals = self
            .quals
            .iter()
            .map(|q| q.remap(map, varno))
            .collect::<Result<_>>()?;
        self.keys = None;
        Ok(())
    }

    fn open_partition(&mut self, relation: &RelationHandle, _reuse: bool, call: &ScanCall<'_>) -> Result<()> {
        let storage = call.ctx.storage();
        let index = storage.physical_index_for(relation.id(), &self.logical)?;
        if self.keys.is_none() {
            let allow_arrays = self.capabilities().supports_array_keys;
            self.keys = Some(build_scan_keys(&self.quals, allow_arrays, self.kind(), call)?);
        }
        let keys = self.keys.as_deref().unwrap_or(&[]);
        let bitmap = storage.index_bitmap(relation, index, keys)?;
        trace!(relation = %relation.id(), index = %index, rows = bitmap.cardinality(), "built partition bitmap");
        if let Some(slot) = call.slot {
            call.ctx.registry_write()?.set_current_relation(slot, relation.id());
        }
        self.pending = Some(bitmap);
        Ok(())
    }

    fn next(&mut self, _call: &ScanCall<'_>) -> Result<Option<Treemap>> {
        Ok(self.pending.take())
    }

    fn close_partition(&mut self) {
        self.pending = None;
    }

    fn rescan(&mut self, _outer: Option<&Row>) -> Result<()> {
        self.keys = None;
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(describe_index(&self.logical, &self.quals))
    }
}
