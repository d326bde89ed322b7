//! In-memory catalog and storage used for tests and benchmarks.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use croaring::Treemap;
use dynpart_expr::{EvalContext, ExprEvaluator, Interpreter};
use dynpart_result::{Error, Result};
use dynpart_types::{AttrNumber, IndexId, RelationId, RelationSchema, Row, RowId, SchemaRef, Value};
use rustc_hash::FxHashMap;

use crate::access::{ScanKey, StorageAccess, StoredTuple, TupleCursor};
use crate::catalog::{Catalog, LogicalIndexInfo, RelationHandle, RelationLease, StorageKind};

#[derive(Clone)]
struct MemIndex {
    id: IndexId,
    info: LogicalIndexInfo,
}

struct MemRelation {
    name: String,
    schema: SchemaRef,
    kind: StorageKind,
    tuples: Arc<Vec<Row>>,
    indexes: Vec<MemIndex>,
}

struct MemState {
    relations: FxHashMap<RelationId, MemRelation>,
    next_index_id: u32,
}

/// In-memory relations with name-addressed columns, simple indexes and
/// handle accounting.
pub struct MemStorage {
    state: RwLock<MemState>,
    live_handles: Arc<AtomicUsize>,
    total_opens: AtomicUsize,
    projections: Mutex<Vec<(RelationId, Vec<AttrNumber>)>>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemState {
                relations: FxHashMap::default(),
                next_index_id: 1,
            }),
            live_handles: Arc::new(AtomicUsize::new(0)),
            total_opens: AtomicUsize::new(0),
            projections: Mutex::new(Vec::new()),
        }
    }

    pub fn create_relation(
        &self,
        id: RelationId,
        name: impl Into<String>,
        schema: RelationSchema,
        kind: StorageKind,
    ) -> Result<()> {
        let mut state = self.state.write()?;
        if state.relations.contains_key(&id) {
            return Err(Error::InvalidArgumentError(format!(
                "relation {id} already exists"
            )));
        }
        state.relations.insert(
            id,
            MemRelation {
                name: name.into(),
                schema: Arc::new(schema),
                kind,
                tuples: Arc::new(Vec::new()),
                indexes: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append rows; each must have exactly one value per attribute,
    /// dropped ones included.
    pub fn insert_rows(&self, id: RelationId, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        let mut state = self.state.write()?;
        let rel = state
            .relations
            .get_mut(&id)
            .ok_or(Error::RelationNotFound(id.get()))?;
        let natts = rel.schema.natts();
        let tuples = Arc::make_mut(&mut rel.tuples);
        for row in rows {
            if row.len() != natts {
                return Err(Error::InvalidArgumentError(format!(
                    "row has {} values but relation {id} has {natts} attributes",
                    row.len()
                )));
            }
            tuples.push(row);
        }
        Ok(())
    }

    pub fn create_index(&self, id: RelationId, info: LogicalIndexInfo) -> Result<IndexId> {
        let mut state = self.state.write()?;
        let index_id = IndexId::new(state.next_index_id);
        state.next_index_id += 1;
        let rel = state
            .relations
            .get_mut(&id)
            .ok_or(Error::RelationNotFound(id.get()))?;
        let exprs = info.key_attnos.iter().filter(|a| **a == 0).count();
        if exprs != info.key_exprs.len() {
            return Err(Error::InvalidArgumentError(format!(
                "index has {exprs} expression columns but {} expressions",
                info.key_exprs.len()
            )));
        }
        rel.indexes.push(MemIndex { id: index_id, info });
        Ok(index_id)
    }

    /// Relation handles currently open.
    pub fn open_handle_count(&self) -> usize {
        self.live_handles.load(Ordering::Acquire)
    }

    /// Relation opens since creation.
    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::Acquire)
    }

    /// Column projections requested from columnar relations, in order.
    pub fn requested_projections(&self) -> Result<Vec<(RelationId, Vec<AttrNumber>)>> {
        Ok(self.projections.lock()?.clone())
    }

    fn with_relation<T>(&self, id: RelationId, f: impl FnOnce(&MemRelation) -> Result<T>) -> Result<T> {
        let state = self.state.read()?;
        let rel = state
            .relations
            .get(&id)
            .ok_or(Error::RelationNotFound(id.get()))?;
        f(rel)
    }

    fn find_index(&self, relation: RelationId, index: IndexId) -> Result<(Arc<Vec<Row>>, MemIndex)> {
        self.with_relation(relation, |rel| {
            let idx = rel
                .indexes
                .iter()
                .find(|i| i.id == index)
                .cloned()
                .ok_or_else(|| Error::IndexNotFound {
                    relation: relation.get(),
                    detail: format!("index {index} does not belong to relation"),
                })?;
            Ok((Arc::clone(&rel.tuples), idx))
        })
    }
}

impl Catalog for MemStorage {
    fn relation_schema(&self, relation: RelationId) -> Result<SchemaRef> {
        self.with_relation(relation, |rel| Ok(Arc::clone(&rel.schema)))
    }

    fn relation_name(&self, relation: RelationId) -> Result<String> {
        self.with_relation(relation, |rel| Ok(rel.name.clone()))
    }

    fn storage_kind(&self, relation: RelationId) -> Result<StorageKind> {
        self.with_relation(relation, |rel| Ok(rel.kind))
    }

    fn physical_index_for(&self, relation: RelationId, logical: &LogicalIndexInfo) -> Result<IndexId> {
        self.with_relation(relation, |rel| {
            rel.indexes
                .iter()
                .find(|i| i.info == *logical)
                .map(|i| i.id)
                .ok_or_else(|| Error::IndexNotFound {
                    relation: relation.get(),
                    detail: logical.describe(),
                })
        })
    }
}

impl StorageAccess for MemStorage {
    fn open_relation(&self, relation: RelationId) -> Result<RelationHandle> {
        let (schema, kind) = self.with_relation(relation, |rel| Ok((Arc::clone(&rel.schema), rel.kind)))?;
        self.total_opens.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(relation = %relation, ?kind, "opened relation");
        Ok(RelationHandle::new(
            relation,
            schema,
            kind,
            RelationLease::tracked(&self.live_handles),
        ))
    }

    fn heap_scan(
        &self,
        relation: &RelationHandle,
        columns: Option<&[AttrNumber]>,
    ) -> Result<Box<dyn TupleCursor>> {
        let tuples = self.with_relation(relation.id(), |rel| Ok(Arc::clone(&rel.tuples)))?;
        let keep = match (relation.kind(), columns) {
            (StorageKind::Columnar, Some(cols)) => {
                self.projections.lock()?.push((relation.id(), cols.to_vec()));
                let mut keep = vec![false; relation.schema().natts()];
                for &attno in cols {
                    if attno > 0 && (attno as usize) <= keep.len() {
                        keep[attno as usize - 1] = true;
                    }
                }
                Some(keep)
            }
            _ => None,
        };
        Ok(Box::new(HeapCursor {
            tuples,
            pos: 0,
            mark: None,
            keep,
        }))
    }

    fn index_scan(
        &self,
        relation: &RelationHandle,
        index: IndexId,
        keys: &[ScanKey],
    ) -> Result<Box<dyn TupleCursor>> {
        let (tuples, index) = self.find_index(relation.id(), index)?;
        let matches = matching_rows(&tuples, &index.info, keys)?;
        Ok(Box::new(IndexCursor {
            tuples,
            index,
            matches,
            pos: 0,
            mark: None,
        }))
    }

    fn index_bitmap(&self, relation: &RelationHandle, index: IndexId, keys: &[ScanKey]) -> Result<Treemap> {
        let (tuples, index) = self.find_index(relation.id(), index)?;
        Ok(matching_rows(&tuples, &index.info, keys)?.into_iter().collect())
    }

    fn bitmap_fetch(&self, relation: &RelationHandle, bitmap: &Treemap) -> Result<Box<dyn TupleCursor>> {
        let tuples = self.with_relation(relation.id(), |rel| Ok(Arc::clone(&rel.tuples)))?;
        Ok(Box::new(BitmapCursor {
            tuples,
            row_ids: bitmap.iter().collect(),
            pos: 0,
        }))
    }
}

fn index_key_values(info: &LogicalIndexInfo, row: &Row) -> Result<Vec<Value>> {
    let ctx = EvalContext::new().with_scan_row(row);
    let mut exprs = info.key_exprs.iter();
    info.key_attnos
        .iter()
        .map(|&attno| {
            if attno == 0 {
                let expr = exprs
                    .next()
                    .ok_or_else(|| Error::internal("index expression list too short"))?;
                Interpreter.evaluate(expr, &ctx)
            } else {
                Ok(row.get(attno).cloned().unwrap_or(Value::Null))
            }
        })
        .collect()
}

/// Row ids of tuples matching every key, in index order.
fn matching_rows(tuples: &[Row], info: &LogicalIndexInfo, keys: &[ScanKey]) -> Result<Vec<RowId>> {
    let mut hits: Vec<(Vec<Value>, RowId)> = Vec::new();
    'rows: for (row_id, row) in tuples.iter().enumerate() {
        if let Some(pred) = &info.predicate
            && !Interpreter.evaluate_predicate(pred, &EvalContext::new().with_scan_row(row))?
        {
            continue;
        }
        let values = index_key_values(info, row)?;
        for key in keys {
            let value = values.get(key.index_column.wrapping_sub(1)).ok_or_else(|| {
                Error::InvalidArgumentError(format!(
                    "scan key on index column {} but index has {} columns",
                    key.index_column,
                    values.len()
                ))
            })?;
            if !key.matches(value)? {
                continue 'rows;
            }
        }
        hits.push((values, row_id as RowId));
    }
    hits.sort_by(|(a, ra), (b, rb)| compare_keys(a, b).then(ra.cmp(rb)));
    Ok(hits.into_iter().map(|(_, id)| id).collect())
}

/// Lexicographic key order with NULLs last.
fn compare_keys(a: &[Value], b: &[Value]) -> CmpOrdering {
    for (x, y) in a.iter().zip(b) {
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => CmpOrdering::Equal,
            (true, false) => CmpOrdering::Greater,
            (false, true) => CmpOrdering::Less,
            (false, false) => x.compare(y).ok().flatten().unwrap_or(CmpOrdering::Equal),
        };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

struct HeapCursor {
    tuples: Arc<Vec<Row>>,
    pos: usize,
    mark: Option<usize>,
    keep: Option<Vec<bool>>,
}

impl TupleCursor for HeapCursor {
    fn next_tuple(&mut self) -> Result<Option<StoredTuple>> {
        let Some(row) = self.tuples.get(self.pos) else {
            return Ok(None);
        };
        let row_id = self.pos as RowId;
        self.pos += 1;
        let row = match &self.keep {
            Some(keep) => Row::new(
                row.values()
                    .iter()
                    .zip(keep)
                    .map(|(v, k)| if *k { v.clone() } else { Value::Null })
                    .collect(),
            ),
            None => row.clone(),
        };
        Ok(Some(StoredTuple { row_id, row }))
    }

    fn rescan(&mut self, _keys: &[ScanKey]) -> Result<()> {
        self.pos = 0;
        self.mark = None;
        Ok(())
    }

    fn mark_pos(&mut self) -> Result<()> {
        self.mark = Some(self.pos);
        Ok(())
    }

    fn restore_pos(&mut self) -> Result<()> {
        self.pos = self
            .mark
            .ok_or_else(|| Error::internal("restore without a marked position"))?;
        Ok(())
    }
}

struct IndexCursor {
    tuples: Arc<Vec<Row>>,
    index: MemIndex,
    matches: Vec<RowId>,
    pos: usize,
    mark: Option<usize>,
}

impl TupleCursor for IndexCursor {
    fn next_tuple(&mut self) -> Result<Option<StoredTuple>> {
        let Some(&row_id) = self.matches.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        let row = self
            .tuples
            .get(row_id as usize)
            .cloned()
            .ok_or_else(|| Error::internal(format!("index points at missing row {row_id}")))?;
        Ok(Some(StoredTuple { row_id, row }))
    }

    fn rescan(&mut self, keys: &[ScanKey]) -> Result<()> {
        self.matches = matching_rows(&self.tuples, &self.index.info, keys)?;
        self.pos = 0;
        self.mark = None;
        Ok(())
    }

    fn mark_pos(&mut self) -> Result<()> {
        self.mark = Some(self.pos);
        Ok(())
    }

    fn restore_pos(&mut self) -> Result<()> {
        self.pos = self
            .mark
            .ok_or_else(|| Error::internal("restore without a marked position"))?;
        Ok(())
    }
}

struct BitmapCursor {
    tuples: Arc<Vec<Row>>,
    row_ids: Vec<RowId>,
    pos: usize,
}

impl TupleCursor for BitmapCursor {
    fn next_tuple(&mut self) -> Result<Option<StoredTuple>> {
        while let Some(&row_id) = self.row_ids.get(self.pos) {
            self.pos += 1;
            // Bitmaps may be lossy or stale; skip ids past the end.
            if let Some(row) = self.tuples.get(row_id as usize) {
                return Ok(Some(StoredTuple {
                    row_id,
                    row: row.clone(),
                }));
            }
        }
        Ok(None)
    }

    fn rescan(&mut self, _keys: &[ScanKey]) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}
