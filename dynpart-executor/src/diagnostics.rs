//! Per-query report of which partitions each scan slot selected, and by
//! which selectors. Observability only.

use std::fmt;

use dynpart_scan::{ScanRegistry, SelectedPartitionEntry};
use dynpart_types::{RelationId, ScanSlotId};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotReport {
    pub scan_slot: ScanSlotId,
    pub partitions: Vec<SelectedPartitionEntry>,
    pub current: Option<RelationId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionReport {
    /// Ordered by scan slot id.
    pub slots: Vec<SlotReport>,
}

impl SelectionReport {
    pub fn from_registry(registry: &ScanRegistry) -> Self {
        let slots = registry
            .slot_ids()
            .into_iter()
            .filter_map(|id| {
                registry.slot(id).map(|state| SlotReport {
                    scan_slot: id,
                    partitions: state.entries().to_vec(),
                    current: state.current_relation(),
                })
            })
            .collect();
        Self { slots }
    }

    pub fn slot(&self, scan_slot: ScanSlotId) -> Option<&SlotReport> {
        self.slots.iter().find(|s| s.scan_slot == scan_slot)
    }

    /// Selected partitions summed over all slots.
    pub fn total_partitions(&self) -> usize {
        self.slots.iter().map(|s| s.partitions.len()).sum()
    }

    pub fn log(&self) {
        for slot in &self.slots {
            info!(
                target: "dynpart::selection",
                scan_slot = %slot.scan_slot,
                count = slot.partitions.len(),
                partitions = %format_entries(&slot.partitions),
                "selected partitions"
            );
        }
    }
}

fn format_entries(entries: &[SelectedPartitionEntry]) -> String {
    if entries.is_empty() {
        return "(none)".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let selectors: Vec<String> = entry.selectors.iter().map(|s| s.to_string()).collect();
            format!("{} (selectors {})", entry.relation, selectors.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for SelectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for slot in &self.slots {
            writeln!(
                f,
                "scan slot {}: {}",
                slot.scan_slot,
                format_entries(&slot.partitions)
            )?;
        }
        Ok(())
    }
}
