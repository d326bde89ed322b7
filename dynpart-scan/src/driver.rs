//! The dynamic scan state machine shared by every access method.
//!
//! A driver walks the partitions a selector recorded for its scan slot,
//! opening one partition at a time, and returns rows from a non-dynamic
//! sub-scan of that partition. When consecutive partitions have different
//! physical layouts the quals, targetlist and index description are
//! rewritten before the new partition is read.

use std::fmt;

use dynpart_expr::{Expr, compute_map};
use dynpart_result::{Error, Result};
use dynpart_types::{RelationId, Row, ScanSlotId, SchemaRef, Varno};
use dynpart_storage::RelationHandle;
use tracing::{debug, trace};

use crate::access::{AccessMethod, ScanCall};
use crate::context::ExecContext;
use crate::exprs::ScanExprs;
use crate::registry::PartitionCursor;
use crate::state::ScanState;

/// Where a dynamic scan takes its partitions from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionSource {
    /// Every partition recorded for the slot, in first-selection order.
    Selected,
    /// Only the slot's current relation, as published by a selector or a
    /// paired scan.
    Current,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanTarget {
    Partitions {
        root: RelationId,
        slot: ScanSlotId,
        source: PartitionSource,
    },
    /// A plain relation scanned through the same machinery.
    Relation(RelationId),
}

/// Plan-time description of a dynamic scan. Expressions are written against
/// the root's layout.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicScanSpec {
    pub target: ScanTarget,
    pub varno: Varno,
    /// Rescans come from a join feeding new outer rows, so the partition set
    /// must be re-read from scratch.
    pub join_driven: bool,
    pub exprs: ScanExprs,
}

impl DynamicScanSpec {
    pub fn partitions(root: RelationId, slot: ScanSlotId) -> Self {
        Self::with_target(ScanTarget::Partitions {
            root,
            slot,
            source: PartitionSource::Selected,
        })
    }

    pub fn current_partition(root: RelationId, slot: ScanSlotId) -> Self {
        Self::with_target(ScanTarget::Partitions {
            root,
            slot,
            source: PartitionSource::Current,
        })
    }

    pub fn relation(relation: RelationId) -> Self {
        Self::with_target(ScanTarget::Relation(relation))
    }

    fn with_target(target: ScanTarget) -> Self {
        Self {
            target,
            varno: 1,
            join_driven: false,
            exprs: ScanExprs::default(),
        }
    }

    pub fn with_varno(mut self, varno: Varno) -> Self {
        self.varno = varno;
        self
    }

    pub fn with_qual(mut self, qual: Expr) -> Self {
        self.exprs.qual = Some(qual);
        self
    }

    pub fn with_targetlist(mut self, targetlist: Vec<Expr>) -> Self {
        self.exprs.targetlist = Some(targetlist);
        self
    }

    pub fn join_driven(mut self, join_driven: bool) -> Self {
        self.join_driven = join_driven;
        self
    }

    /// Relation whose layout the plan expressions are written against.
    pub fn root(&self) -> RelationId {
        match self.target {
            ScanTarget::Partitions { root, .. } => root,
            ScanTarget::Relation(relation) => relation,
        }
    }

    pub fn slot(&self) -> Option<ScanSlotId> {
        match self.target {
            ScanTarget::Partitions { slot, .. } => Some(slot),
            ScanTarget::Relation(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub partitions_scanned: usize,
    pub remaps: usize,
    /// Layout pair of the most recent rewrite: `(from, to)`.
    pub last_remap: Option<(RelationId, RelationId)>,
    pub rows_returned: usize,
    pub rescans: usize,
}

/// Generic dynamic scan. See the module docs.
pub struct DynamicScan<A: AccessMethod> {
    spec: DynamicScanSpec,
    access: A,
    ctx: ExecContext,
    state: ScanState,
    /// Expressions in the layout of `layout`.
    exprs: ScanExprs,
    /// Relation the current expressions were last rewritten for.
    layout: Option<(RelationId, SchemaRef)>,
    cursor: PartitionCursor,
    open: Option<RelationHandle>,
    current: Option<RelationId>,
    outer: Option<Row>,
    stats: ScanStats,
}

impl<A: AccessMethod> fmt::Debug for DynamicScan<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicScan")
            .field("kind", &self.access.kind())
            .field("target", &self.spec.target)
            .field("state", &self.state)
            .field("current", &self.current)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<A: AccessMethod> DynamicScan<A> {
    pub fn new(spec: DynamicScanSpec, access: A, ctx: ExecContext) -> Result<Self> {
        let mut exprs = spec.exprs.clone();
        if exprs.targetlist.is_none() && access.capabilities().has_targetlist {
            let schema = ctx.storage().relation_schema(spec.root())?;
            exprs.targetlist = Some(ScanExprs::full_targetlist(&schema, spec.varno));
        }
        Ok(Self {
            spec,
            access,
            ctx,
            state: ScanState::Init,
            exprs,
            layout: None,
            cursor: PartitionCursor::default(),
            open: None,
            current: None,
            outer: None,
            stats: ScanStats::default(),
        })
    }

    pub fn spec(&self) -> &DynamicScanSpec {
        &self.spec
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Partition currently (or most recently) being read.
    pub fn current_relation(&self) -> Option<RelationId> {
        self.current
    }

    /// Relation whose layout the scan expressions currently follow.
    pub fn layout_relation(&self) -> Option<RelationId> {
        self.layout.as_ref().map(|(id, _)| *id)
    }

    /// Scan expressions in the current layout.
    pub fn exprs(&self) -> &ScanExprs {
        &self.exprs
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    /// Next output of the current partition, advancing through partitions
    /// as they run dry. `None` once every partition is exhausted.
    pub fn next(&mut self) -> Result<Option<A::Output>> {
        loop {
            match self.state {
                ScanState::Init => self.begin()?,
                ScanState::First | ScanState::Next => {
                    if self.advance()? {
                        self.state.transition(ScanState::Scan)?;
                    } else {
                        self.state.transition(ScanState::Done)?;
                        debug!(
                            target: "dynpart::scan",
                            kind = self.access.kind().label(),
                            partitions = self.stats.partitions_scanned,
                            rows = self.stats.rows_returned,
                            "dynamic scan exhausted"
                        );
                    }
                }
                ScanState::Scan => {
                    let call = ScanCall {
                        ctx: &self.ctx,
                        exprs: &self.exprs,
                        outer: self.outer.as_ref(),
                        slot: self.spec.slot(),
                        varno: self.spec.varno,
                    };
                    match self.access.next(&call)? {
                        Some(out) => {
                            self.stats.rows_returned += 1;
                            return Ok(Some(out));
                        }
                        None => {
                            self.close_partition();
                            self.state.transition(ScanState::Next)?;
                        }
                    }
                }
                ScanState::Done => return Ok(None),
                ScanState::End => {
                    return Err(Error::state_transition(
                        ScanState::End.name(),
                        ScanState::Scan.name(),
                    ));
                }
            }
        }
    }

    /// Restart the scan. Join-driven scans drop everything and re-read the
    /// partition set on the next call; others restart from the first
    /// partition and keep the open relation when it comes up again.
    pub fn rescan(&mut self, outer: Option<&Row>) -> Result<()> {
        if self.state == ScanState::End {
            return Err(Error::state_transition(
                ScanState::End.name(),
                ScanState::First.name(),
            ));
        }
        self.outer = outer.cloned();
        self.stats.rescans += 1;
        self.access.rescan(outer)?;
        trace!(
            target: "dynpart::scan",
            kind = self.access.kind().label(),
            state = %self.state,
            join_driven = self.spec.join_driven,
            "dynamic scan rescan"
        );
        match self.state {
            ScanState::Init => Ok(()),
            _ if self.spec.join_driven => {
                self.close_partition();
                self.current = None;
                self.state.transition(ScanState::Init)
            }
            _ => {
                self.cursor = self.snapshot_cursor()?;
                self.state.transition(ScanState::First)
            }
        }
    }

    /// Release the open partition and all sub-scans. Safe to call twice.
    pub fn end(&mut self) -> Result<()> {
        if self.state == ScanState::End {
            return Ok(());
        }
        let res = self.access.end();
        self.open = None;
        self.cursor = PartitionCursor::default();
        self.outer = None;
        self.state.transition(ScanState::End)?;
        debug!(
            target: "dynpart::scan",
            kind = self.access.kind().label(),
            partitions = self.stats.partitions_scanned,
            remaps = self.stats.remaps,
            rows = self.stats.rows_returned,
            "dynamic scan ended"
        );
        res
    }

    pub fn mark_pos(&mut self) -> Result<()> {
        self.check_mark_restore("SCAN_MARKPOS")?;
        self.access.mark_pos()
    }

    pub fn restore_pos(&mut self) -> Result<()> {
        self.check_mark_restore("SCAN_RESTRPOS")?;
        self.access.restore_pos()
    }

    /// One-line description for plan output.
    pub fn explain(&self) -> String {
        let kind = self.access.kind().label();
        let root = self.spec.root();
        let name = self
            .ctx
            .storage()
            .relation_name(root)
            .unwrap_or_else(|_| root.to_string());
        let mut out = match self.spec.target {
            ScanTarget::Partitions { slot, source, .. } => {
                let source = match source {
                    PartitionSource::Selected => "",
                    PartitionSource::Current => ", current partition",
                };
                format!("{kind} on {name} (scan slot {slot}{source})")
            }
            ScanTarget::Relation(_) => format!("{kind} on {name}"),
        };
        if let Some(detail) = self.access.describe() {
            out.push_str(&format!(" [{detail}]"));
        }
        if let Some(qual) = &self.spec.exprs.qual {
            out.push_str(&format!(" filter: {qual}"));
        }
        out
    }

    fn check_mark_restore(&self, op: &'static str) -> Result<()> {
        if !self.access.capabilities().supports_mark_restore {
            return Err(crate::access::mark_restore_unsupported(self.access.kind()));
        }
        if self.state != ScanState::Scan {
            return Err(Error::state_transition(self.state.name(), op));
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.layout.is_none() {
            let root = self.spec.root();
            self.layout = Some((root, self.ctx.storage().relation_schema(root)?));
        }
        self.cursor = self.snapshot_cursor()?;
        trace!(
            target: "dynpart::scan",
            kind = self.access.kind().label(),
            partitions = self.cursor.remaining(),
            "dynamic scan starting"
        );
        self.state.transition(ScanState::First)
    }

    fn snapshot_cursor(&self) -> Result<PartitionCursor> {
        match self.spec.target {
            ScanTarget::Relation(relation) => Ok(PartitionCursor::single(relation)),
            ScanTarget::Partitions {
                slot,
                source: PartitionSource::Selected,
                ..
            } => self.ctx.registry_read()?.cursor(slot),
            ScanTarget::Partitions {
                slot,
                source: PartitionSource::Current,
                ..
            } => Ok(PartitionCursor::single(
                self.ctx.registry_read()?.current_relation_for(slot)?,
            )),
        }
    }

    /// Open the next partition. `false` once there are none left.
    fn advance(&mut self) -> Result<bool> {
        self.ctx.check_interrupt()?;
        let next = {
            let call = ScanCall {
                ctx: &self.ctx,
                exprs: &self.exprs,
                outer: self.outer.as_ref(),
                slot: self.spec.slot(),
                varno: self.spec.varno,
            };
            self.access.next_partition(&mut self.cursor, &call)?
        };
        let Some(relation) = next else {
            return Ok(false);
        };
        self.prepare_layout(relation)?;

        let reuse = self.open.as_ref().is_some_and(|h| h.id() == relation);
        if !reuse {
            self.close_partition();
            self.open = Some(self.ctx.storage().open_relation(relation)?);
        }
        let handle = self
            .open
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("partition {relation} is not open")))?;
        let call = ScanCall {
            ctx: &self.ctx,
            exprs: &self.exprs,
            outer: self.outer.as_ref(),
            slot: self.spec.slot(),
            varno: self.spec.varno,
        };
        self.access.open_partition(handle, reuse, &call)?;
        self.current = Some(relation);
        self.stats.partitions_scanned += 1;
        trace!(
            target: "dynpart::scan",
            kind = self.access.kind().label(),
            relation = %relation,
            reuse,
            "opened partition"
        );
        Ok(true)
    }

    /// Rewrite the scan expressions when `relation` is laid out differently
    /// from the relation they currently follow.
    fn prepare_layout(&mut self, relation: RelationId) -> Result<()> {
        let Some((from, from_schema)) = self.layout.as_ref() else {
            return Err(Error::Internal("dynamic scan has no layout reference".to_string()));
        };
        let from = *from;
        if from == relation {
            return Ok(());
        }
        let schema = self.ctx.storage().relation_schema(relation)?;
        if let Some(map) = compute_map(from_schema, &schema) {
            let caps = self.access.capabilities();
            self.exprs = self.exprs.remap(&map, self.spec.varno, caps.has_targetlist)?;
            if caps.remaps_index {
                self.access.remap(&map, self.spec.varno)?;
            }
            self.stats.remaps += 1;
            self.stats.last_remap = Some((from, relation));
            debug!(
                target: "dynpart::scan",
                from = %from,
                to = %relation,
                "remapped scan expressions to partition layout"
            );
        }
        self.layout = Some((relation, schema));
        Ok(())
    }

    fn close_partition(&mut self) {
        self.access.close_partition();
        self.open = None;
    }
}
