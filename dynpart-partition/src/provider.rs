//! Hierarchy lookup.
//!
//! Hierarchies come from the catalog through [`PartitionCatalog`]. A query
//! loads each one at most once through a [`HierarchyCache`] and shares it by
//! `Arc` for the rest of its execution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use dynpart_result::{Error, Result};
use dynpart_types::RelationId;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::hierarchy::PartitionHierarchy;

pub trait PartitionCatalog: Send + Sync {
    /// Partition tree of the partitioned table `root`.
    fn load_hierarchy(&self, root: RelationId) -> Result<PartitionHierarchy>;
}

/// Catalog backed by hierarchies registered up front.
#[derive(Default)]
pub struct StaticPartitionCatalog {
    hierarchies: RwLock<FxHashMap<RelationId, PartitionHierarchy>>,
}

impl StaticPartitionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hierarchy: PartitionHierarchy) -> Result<()> {
        self.hierarchies
            .write()?
            .insert(hierarchy.root_relation(), hierarchy);
        Ok(())
    }
}

impl PartitionCatalog for StaticPartitionCatalog {
    fn load_hierarchy(&self, root: RelationId) -> Result<PartitionHierarchy> {
        self.hierarchies
            .read()?
            .get(&root)
            .cloned()
            .ok_or_else(|| Error::CatalogError(format!("relation {root} is not partitioned")))
    }
}

/// Per-query memo of loaded hierarchies.
pub struct HierarchyCache {
    catalog: Arc<dyn PartitionCatalog>,
    loaded: RwLock<FxHashMap<RelationId, Arc<PartitionHierarchy>>>,
    loads: AtomicUsize,
}

impl HierarchyCache {
    pub fn new(catalog: Arc<dyn PartitionCatalog>) -> Self {
        Self {
            catalog,
            loaded: RwLock::new(FxHashMap::default()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Hierarchy of `root`, loading and validating it on first use.
    pub fn get(&self, root: RelationId) -> Result<Arc<PartitionHierarchy>> {
        if let Some(h) = self.loaded.read()?.get(&root) {
            return Ok(Arc::clone(h));
        }
        let mut loaded = self.loaded.write()?;
        if let Some(h) = loaded.get(&root) {
            return Ok(Arc::clone(h));
        }
        let hierarchy = self.catalog.load_hierarchy(root)?;
        hierarchy.validate()?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!(root = %root, levels = hierarchy.levels(), "loaded partition hierarchy");
        let hierarchy = Arc::new(hierarchy);
        loaded.insert(root, Arc::clone(&hierarchy));
        Ok(hierarchy)
    }

    /// Catalog loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}
