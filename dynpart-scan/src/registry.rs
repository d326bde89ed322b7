//! Per-query registry connecting partition selectors to dynamic scans.
//!
//! Selectors record the leaf relations they choose under a scan slot;
//! drivers read the slot back through a [`PartitionCursor`]. The registry
//! lives exactly as long as one query execution and is passed explicitly to
//! every operator that needs it.

use std::fmt;
use std::sync::{Arc, RwLock};

use dynpart_result::{Error, Result};
use dynpart_types::{RelationId, ScanSlotId, SelectorId};
use rustc_hash::FxHashMap;

/// A selected partition and the selectors that chose it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedPartitionEntry {
    pub relation: RelationId,
    /// Provenance only, in first-seen order. Never affects which partitions
    /// are scanned.
    pub selectors: Vec<SelectorId>,
}

/// Selections recorded under one scan slot.
#[derive(Clone, Default)]
pub struct ScanSlotState {
    partitions: Vec<SelectedPartitionEntry>,
    positions: FxHashMap<RelationId, usize>,
    current: Option<RelationId>,
}

impl fmt::Debug for ScanSlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSlotState")
            .field("partitions", &self.relations().collect::<Vec<_>>())
            .field("current", &self.current)
            .finish()
    }
}

impl ScanSlotState {
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn contains(&self, relation: RelationId) -> bool {
        self.positions.contains_key(&relation)
    }

    /// Selected relations in first-selection order.
    pub fn relations(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.partitions.iter().map(|e| e.relation)
    }

    pub fn entries(&self) -> &[SelectedPartitionEntry] {
        &self.partitions
    }

    pub fn entry(&self, relation: RelationId) -> Option<&SelectedPartitionEntry> {
        self.positions.get(&relation).map(|&i| &self.partitions[i])
    }

    pub fn current_relation(&self) -> Option<RelationId> {
        self.current
    }

    fn record(&mut self, relation: RelationId, selector: SelectorId) -> bool {
        match self.positions.get(&relation) {
            Some(&i) => {
                let selectors = &mut self.partitions[i].selectors;
                if !selectors.contains(&selector) {
                    selectors.push(selector);
                }
                false
            }
            None => {
                self.positions.insert(relation, self.partitions.len());
                self.partitions.push(SelectedPartitionEntry {
                    relation,
                    selectors: vec![selector],
                });
                true
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanRegistry {
    slots: FxHashMap<ScanSlotId, ScanSlotState>,
}

/// Registry handle shared by the operators of one plan instance.
pub type SharedScanRegistry = Arc<RwLock<ScanRegistry>>;

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedScanRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Make sure `slot` exists, possibly empty, so consumers can tell
    /// "selected nothing" from "never ran".
    pub fn ensure_slot(&mut self, slot: ScanSlotId) -> &mut ScanSlotState {
        self.slots.entry(slot).or_default()
    }

    /// Add `relation` to `slot`'s set. Returns `true` when the relation was
    /// not selected before; repeats only extend the provenance list.
    pub fn record_selection(&mut self, slot: ScanSlotId, relation: RelationId, selector: SelectorId) -> bool {
        self.ensure_slot(slot).record(relation, selector)
    }

    /// Relation most recently designated for `slot`.
    pub fn current_relation_for(&self, slot: ScanSlotId) -> Result<RelationId> {
        let state = self.slot(slot).ok_or(Error::MissingScanSlot(slot.get()))?;
        state.current.ok_or(Error::NoCurrentRelation(slot.get()))
    }

    pub fn set_current_relation(&mut self, slot: ScanSlotId, relation: RelationId) {
        self.ensure_slot(slot).current = Some(relation);
    }

    pub fn slot(&self, slot: ScanSlotId) -> Option<&ScanSlotState> {
        self.slots.get(&slot)
    }

    /// Snapshot of `slot`'s selections for one pass of a driver.
    pub fn cursor(&self, slot: ScanSlotId) -> Result<PartitionCursor> {
        let state = self.slot(slot).ok_or(Error::MissingScanSlot(slot.get()))?;
        Ok(PartitionCursor::new(state.relations().collect()))
    }

    /// Registered slot ids in ascending order.
    pub fn slot_ids(&self) -> Vec<ScanSlotId> {
        let mut ids: Vec<_> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Iteration state over one snapshot of a slot's partitions. Each relation
/// is returned once per pass, in snapshot order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionCursor {
    relations: Vec<RelationId>,
    pos: usize,
}

impl PartitionCursor {
    pub fn new(relations: Vec<RelationId>) -> Self {
        Self { relations, pos: 0 }
    }

    pub fn single(relation: RelationId) -> Self {
        Self::new(vec![relation])
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Relations not yet returned in this pass.
    pub fn remaining(&self) -> usize {
        self.relations.len() - self.pos
    }

    pub fn relations(&self) -> &[RelationId] {
        &self.relations
    }
}

impl Iterator for PartitionCursor {
    type Item = RelationId;

    fn next(&mut self) -> Option<RelationId> {
        let rel = self.relations.get(self.pos).copied()?;
        self.pos += 1;
        Some(rel)
    }
}
