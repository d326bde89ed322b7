//! Catalog seam: relation layouts, storage kinds and index resolution.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dynpart_expr::{AttributeMap, Expr, apply_map, remap_attnos};
use dynpart_result::Result;
use dynpart_types::{AttrNumber, IndexId, RelationId, SchemaRef, Varno};

/// Physical organisation of a relation's tuples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Heap,
    AppendOptimized,
    /// Column-oriented; scans can skip columns nobody reads.
    Columnar,
}

/// Plan-level description of an index on the partitioned root. Resolved to
/// a physical index of each partition at scan time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogicalIndexInfo {
    /// Heap attribute per index column; `0` marks an expression column.
    pub key_attnos: Vec<AttrNumber>,
    /// One expression per `0` entry in `key_attnos`, in order.
    pub key_exprs: Vec<Expr>,
    /// Partial-index predicate.
    pub predicate: Option<Expr>,
    pub unique: bool,
}

impl LogicalIndexInfo {
    pub fn on_columns(key_attnos: Vec<AttrNumber>) -> Self {
        Self {
            key_attnos,
            ..Self::default()
        }
    }

    /// Copy of this description rewritten into another relation's layout.
    pub fn remap(&self, map: &AttributeMap, varno: Varno) -> Result<LogicalIndexInfo> {
        Ok(LogicalIndexInfo {
            key_attnos: remap_attnos(&self.key_attnos, map)?,
            key_exprs: self
                .key_exprs
                .iter()
                .map(|e| apply_map(e, map, varno))
                .collect::<Result<_>>()?,
            predicate: self
                .predicate
                .as_ref()
                .map(|p| apply_map(p, map, varno))
                .transpose()?,
            unique: self.unique,
        })
    }

    pub fn describe(&self) -> String {
        let keys: Vec<String> = self.key_attnos.iter().map(|a| a.to_string()).collect();
        let mut out = format!("keys=({})", keys.join(", "));
        if let Some(pred) = &self.predicate {
            out.push_str(&format!(" where {pred}"));
        }
        out
    }
}

/// Read-only catalog lookups.
pub trait Catalog: Send + Sync {
    fn relation_schema(&self, relation: RelationId) -> Result<SchemaRef>;

    fn relation_name(&self, relation: RelationId) -> Result<String>;

    fn storage_kind(&self, relation: RelationId) -> Result<StorageKind>;

    /// Physical index of `relation` matching `logical`, which must already be
    /// expressed in `relation`'s layout.
    fn physical_index_for(&self, relation: RelationId, logical: &LogicalIndexInfo) -> Result<IndexId>;
}

/// Counts live relation handles. Each [`RelationHandle`] holds one lease and
/// gives it back on drop, so handles cannot leak on error paths.
pub struct RelationLease {
    counter: Option<Arc<AtomicUsize>>,
}

impl RelationLease {
    pub fn tracked(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter: Some(Arc::clone(counter)),
        }
    }

    pub fn untracked() -> Self {
        Self { counter: None }
    }
}

impl Drop for RelationLease {
    fn drop(&mut self) {
        if let Some(counter) = &self.counter {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// An open relation.
pub struct RelationHandle {
    id: RelationId,
    schema: SchemaRef,
    kind: StorageKind,
    _lease: RelationLease,
}

impl RelationHandle {
    pub fn new(id: RelationId, schema: SchemaRef, kind: StorageKind, lease: RelationLease) -> Self {
        Self {
            id,
            schema,
            kind,
            _lease: lease,
        }
    }

    #[inline]
    pub fn id(&self) -> RelationId {
        self.id
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }
}

impl fmt::Debug for RelationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("natts", &self.schema.natts())
            .finish()
    }
}
