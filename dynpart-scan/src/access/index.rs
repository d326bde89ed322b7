use dynpart_expr::{AttributeMap, CompareOp, EvalContext, Expr, apply_map, apply_map_all};
use dynpart_result::{Error, Result};
use dynpart_types::{IndexId, Row, Varno};
use dynpart_storage::{LogicalIndexInfo, RelationHandle, ScanKey, ScanKeyArg};
use tracing::trace;

use super::{AccessKind, AccessMethod, Capabilities, ScanCall, no_open_partition};
use crate::subscan::SubScan;

#[derive(Clone, Debug, PartialEq)]
pub enum IndexQualArg {
    Scalar(Expr),
    /// `= ANY (...)` style list; each element is evaluated separately.
    Array(Vec<Expr>),
}

/// Index condition `index_column <op> arg`. The argument is evaluated once
/// per (re)scan against the outer row and parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexQual {
    /// 1-based position in the index key.
    pub index_column: usize,
    pub op: CompareOp,
    pub arg: IndexQualArg,
}

impl IndexQual {
    pub fn new(index_column: usize, op: CompareOp, arg: Expr) -> Self {
        Self {
            index_column,
            op,
            arg: IndexQualArg::Scalar(arg),
        }
    }

    pub fn any(index_column: usize, op: CompareOp, items: Vec<Expr>) -> Self {
        Self {
            index_column,
            op,
            arg: IndexQualArg::Array(items),
        }
    }

    pub(crate) fn remap(&self, map: &AttributeMap, varno: Varno) -> Result<IndexQual> {
        let arg = match &self.arg {
            IndexQualArg::Scalar(e) => IndexQualArg::Scalar(apply_map(e, map, varno)?),
            IndexQualArg::Array(items) => IndexQualArg::Array(apply_map_all(items, map, varno)?),
        };
        Ok(IndexQual {
            index_column: self.index_column,
            op: self.op,
            arg,
        })
    }

    fn describe(&self) -> String {
        match &self.arg {
            IndexQualArg::Scalar(e) => format!("key{} {} {}", self.index_column, self.op.as_str(), e),
            IndexQualArg::Array(items) => {
                let items: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                format!(
                    "key{} {} ANY ({})",
                    self.index_column,
                    self.op.as_str(),
                    items.join(", ")
                )
            }
        }
    }
}

/// Evaluate index quals into scan keys for the current outer row.
pub(crate) fn build_scan_keys(
    quals: &[IndexQual],
    allow_arrays: bool,
    kind: AccessKind,
    call: &ScanCall<'_>,
) -> Result<Vec<ScanKey>> {
    let ctx = EvalContext::new()
        .with_outer_row(call.outer)
        .with_params(call.ctx.params());
    let evaluator = call.ctx.evaluator();
    quals
        .iter()
        .map(|qual| {
            let arg = match &qual.arg {
                IndexQualArg::Scalar(e) => ScanKeyArg::Value(evaluator.evaluate(e, &ctx)?),
                IndexQualArg::Array(_) if !allow_arrays => {
                    return Err(Error::Internal(format!(
                        "{} does not support array keys",
                        kind.label()
                    )));
                }
                IndexQualArg::Array(items) => ScanKeyArg::Array(
                    items
                        .iter()
                        .map(|e| evaluator.evaluate(e, &ctx))
                        .collect::<Result<_>>()?,
                ),
            };
            Ok(ScanKey::new(qual.index_column, qual.op, arg))
        })
        .collect()
}

pub(crate) fn describe_index(logical: &LogicalIndexInfo, quals: &[IndexQual]) -> String {
    let mut out = format!("index {}", logical.describe());
    if !quals.is_empty() {
        let conds: Vec<String> = quals.iter().map(IndexQual::describe).collect();
        out.push_str(&format!(" cond: {}", conds.join(" AND ")));
    }
    out
}

/// Ordered index scan. The logical index is resolved to each partition's
/// physical index, and the partition is published as the slot's current
/// relation.
pub struct IndexAccess {
    logical: LogicalIndexInfo,
    quals: Vec<IndexQual>,
    open_index: Option<IndexId>,
    keys: Option<Vec<ScanKey>>,
    scan: Option<SubScan>,
}

impl IndexAccess {
    pub fn new(logical: LogicalIndexInfo, quals: Vec<IndexQual>) -> Self {
        Self {
            logical,
            quals,
            open_index: None,
            keys: None,
            scan: None,
        }
    }

    /// Logical index in the current partition's layout.
    pub fn logical_index(&self) -> &LogicalIndexInfo {
        &self.logical
    }
}

impl AccessMethod for IndexAccess {
    type Output = Row;

    fn kind(&self) -> AccessKind {
        AccessKind::Index
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_targetlist: true,
            remaps_index: true,
            supports_array_keys: false,
            supports_mark_restore: true,
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

    fn open_partition(&mut self, relation: &RelationHandle, reuse: bool, call: &ScanCall<'_>) -> Result<()> {
        let storage = call.ctx.storage();
        let index = storage.physical_index_for(relation.id(), &self.logical)?;
        if let Some(slot) = call.slot {
            call.ctx.registry_write()?.set_current_relation(slot, relation.id());
        }
        if !reuse {
            self.keys = None;
        }
        if self.keys.is_none() {
            let allow_arrays = self.capabilities().supports_array_keys;
            self.keys = Some(build_scan_keys(&self.quals, allow_arrays, self.kind(), call)?);
        }
        let keys = self.keys.as_deref().unwrap_or(&[]);
        trace!(relation = %relation.id(), index = %index, keys = keys.len(), "opening index partition");

        let restart = reuse && self.open_index == Some(index);
        if restart && let Some(scan) = self.scan.as_mut() {
            scan.rescan(keys)?;
        } else {
            let cursor = storage.index_scan(relation, index, keys)?;
            self.scan = Some(SubScan::new(cursor, relation.id()));
        }
        self.open_index = Some(index);
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
        self.open_index = None;
    }

    fn rescan(&mut self, _outer: Option<&Row>) -> Result<()> {
        self.keys = None;
        Ok(())
    }

    fn mark_pos(&mut self) -> Result<()> {
        match self.scan.as_mut() {
            Some(scan) => scan.mark_pos(),
            None => Err(no_open_partition(AccessKind::Index)),
        }
    }

    fn restore_pos(&mut self) -> Result<()> {
        match self.scan.as_mut() {
            Some(scan) => scan.restore_pos(),
            None => Err(no_open_partition(AccessKind::Index)),
        }
    }

    fn describe(&self) -> Option<String> {
        Some(describe_index(&self.logical, &self.quals))
    }
}
