//! Partition selector operator.
//!
//! A selector runs the selection engine and records the leaves it picks in
//! the scan registry under their scan slots. In static mode that happens
//! once, when the selector is first pulled; in dynamic mode it happens for
//! every row of the child, which is passed through unchanged. Selections
//! accumulate: a partition chosen for one outer row stays chosen.

use std::sync::Arc;

use dynpart_expr::{EvalContext, Expr};
use dynpart_partition::{PartitionHierarchy, PartitionSelection, SelectedPartition, SelectionInput, SelectionPredicates};
use dynpart_result::{Error, Result};
use dynpart_scan::ExecContext;
use dynpart_types::{RelationId, Row, ScanSlotId, SelectorId};
use tracing::{debug, trace};

use crate::node::{BoxedNode, PlanNode, write_line};

#[derive(Clone, Debug, PartialEq)]
pub enum SelectorMode {
    /// Predicates are constants. `precomputed` replaces the engine run with
    /// a plan-time list.
    Static { precomputed: Option<Vec<SelectedPartition>> },
    /// Predicates read each input row. `projection` first maps the row into
    /// the partitioned table's column layout.
    Dynamic { projection: Option<Vec<Expr>> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionSelectorSpec {
    pub selector_id: SelectorId,
    /// Slot used when no propagation expression is configured. Always
    /// created, even when nothing is selected.
    pub scan_slot: ScanSlotId,
    pub root: RelationId,
    pub predicates: SelectionPredicates,
    /// Slots the propagation expression may route leaves to. Created at
    /// init alongside `scan_slot`, so their drivers see an empty set rather
    /// than a missing slot when no leaf is routed there.
    pub target_slots: Vec<ScanSlotId>,
    pub mode: SelectorMode,
    /// Also publish every selected leaf as its slot's current relation.
    pub publish_current: bool,
}

impl PartitionSelectorSpec {
    pub fn static_selection(
        selector_id: SelectorId,
        scan_slot: ScanSlotId,
        root: RelationId,
        predicates: SelectionPredicates,
    ) -> Self {
        Self {
            selector_id,
            scan_slot,
            root,
            predicates,
            target_slots: Vec::new(),
            mode: SelectorMode::Static { precomputed: None },
            publish_current: false,
        }
    }

    pub fn dynamic_selection(
        selector_id: SelectorId,
        scan_slot: ScanSlotId,
        root: RelationId,
        predicates: SelectionPredicates,
    ) -> Self {
        Self {
            mode: SelectorMode::Dynamic { projection: None },
            ..Self::static_selection(selector_id, scan_slot, root, predicates)
        }
    }

    pub fn with_precomputed(mut self, selected: Vec<SelectedPartition>) -> Self {
        self.mode = SelectorMode::Static {
            precomputed: Some(selected),
        };
        self
    }

    pub fn with_projection(mut self, projection: Vec<Expr>) -> Self {
        self.mode = SelectorMode::Dynamic {
            projection: Some(projection),
        };
        self
    }

    pub fn with_target_slots(mut self, slots: impl IntoIterator<Item = ScanSlotId>) -> Self {
        self.target_slots.extend(slots);
        self
    }

    pub fn publish_current(mut self, publish: bool) -> Self {
        self.publish_current = publish;
        self
    }

    pub fn is_static(&self) -> bool {
        matches!(self.mode, SelectorMode::Static { .. })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectorStats {
    /// Engine runs (or precomputed lists applied).
    pub invocations: usize,
    /// Selections that added a partition to a slot for the first time.
    pub new_partitions: usize,
}

pub struct PartitionSelectorExec {
    spec: PartitionSelectorSpec,
    hierarchy: Arc<PartitionHierarchy>,
    ctx: ExecContext,
    child: Option<BoxedNode>,
    initialized: bool,
    stats: SelectorStats,
}

impl PartitionSelectorExec {
    pub fn new(
        spec: PartitionSelectorSpec,
        hierarchy: Arc<PartitionHierarchy>,
        ctx: ExecContext,
        child: Option<BoxedNode>,
    ) -> Result<Self> {
        if hierarchy.root_relation() != spec.root {
            return Err(Error::InvalidArgumentError(format!(
                "selector {} targets {} but hierarchy is rooted at {}",
                spec.selector_id,
                spec.root,
                hierarchy.root_relation()
            )));
        }
        if let SelectorMode::Static { precomputed } = &spec.mode {
            if child.is_some() {
                return Err(Error::InvalidArgumentError(format!(
                    "static selector {} cannot have a child",
                    spec.selector_id
                )));
            }
            if precomputed.is_none() && !spec.predicates.is_row_independent() {
                return Err(Error::InvalidArgumentError(format!(
                    "static selector {} has predicates that read input rows",
                    spec.selector_id
                )));
            }
        }
        Ok(Self {
            spec,
            hierarchy,
            ctx,
            child,
            initialized: false,
            stats: SelectorStats::default(),
        })
    }

    pub fn spec(&self) -> &PartitionSelectorSpec {
        &self.spec
    }

    pub fn stats(&self) -> &SelectorStats {
        &self.stats
    }

    /// Create the slots and, in static mode, record the static selection.
    /// Runs once; later calls do nothing.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        {
            let mut registry = self.ctx.registry_write()?;
            registry.ensure_slot(self.spec.scan_slot);
            for slot in &self.spec.target_slots {
                registry.ensure_slot(*slot);
            }
        }
        self.initialized = true;
        if let SelectorMode::Static { precomputed } = &self.spec.mode {
            let selected = match precomputed {
                Some(list) => list.clone(),
                None => {
                    let input = SelectionInput::constant(self.ctx.params());
                    self.engine().select(&input)?
                }
            };
            self.record(&selected)?;
            debug!(
                selector = %self.spec.selector_id,
                scan_slot = %self.spec.scan_slot,
                partitions = selected.len(),
                "static partition selection"
            );
        }
        Ok(())
    }

    /// Run dynamic selection for one input row and record the result.
    pub fn select_for_row(&mut self, row: &Row) -> Result<Vec<SelectedPartition>> {
        self.init()?;
        let projection = match &self.spec.mode {
            SelectorMode::Dynamic { projection } => projection.as_deref(),
            SelectorMode::Static { .. } => {
                return Err(Error::Internal(format!(
                    "static selector {} asked to select for a row",
                    self.spec.selector_id
                )));
            }
        };
        let projected = match projection {
            Some(exprs) => Some(self.project(exprs, row)?),
            None => None,
        };
        let input = SelectionInput {
            row: Some(projected.as_ref().unwrap_or(row)),
            outer: Some(row),
            params: self.ctx.params(),
        };
        let selected = self.engine().select(&input)?;
        self.record(&selected)?;
        trace!(
            selector = %self.spec.selector_id,
            partitions = selected.len(),
            "dynamic partition selection"
        );
        Ok(selected)
    }

    fn engine(&self) -> PartitionSelection<'_> {
        PartitionSelection::new(
            &self.hierarchy,
            &self.spec.predicates,
            self.ctx.evaluator(),
            self.spec.scan_slot,
        )
        .with_interrupt(self.ctx.interrupt())
    }

    fn project(&self, exprs: &[Expr], row: &Row) -> Result<Row> {
        let eval_ctx = EvalContext::new()
            .with_scan_row(row)
            .with_outer_row(Some(row))
            .with_params(self.ctx.params());
        let evaluator = self.ctx.evaluator();
        let values = exprs
            .iter()
            .map(|e| evaluator.evaluate(e, &eval_ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row::new(values))
    }

    fn record(&mut self, selected: &[SelectedPartition]) -> Result<()> {
        self.stats.invocations += 1;
        let mut registry = self.ctx.registry_write()?;
        for part in selected {
            if registry.record_selection(part.scan_slot, part.relation, self.spec.selector_id) {
                self.stats.new_partitions += 1;
            }
            if self.spec.publish_current {
                registry.set_current_relation(part.scan_slot, part.relation);
            }
        }
        Ok(())
    }
}

impl PlanNode for PartitionSelectorExec {
    fn next(&mut self) -> Result<Option<Row>> {
        self.init()?;
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let Some(row) = child.next()? else {
            return Ok(None);
        };
        self.select_for_row(&row)?;
        Ok(Some(row))
    }

    fn rescan(&mut self, outer: Option<&Row>) -> Result<()> {
        match self.child.as_mut() {
            Some(child) => child.rescan(outer),
            None => Ok(()),
        }
    }

    fn end(&mut self) -> Result<()> {
        match self.child.as_mut() {
            Some(child) => child.end(),
            None => Ok(()),
        }
    }

    fn explain(&self, depth: usize, out: &mut String) {
        let name = self
            .ctx
            .storage()
            .relation_name(self.spec.root)
            .unwrap_or_else(|_| self.spec.root.to_string());
        let mode = match &self.spec.mode {
            SelectorMode::Static { precomputed: Some(list) } => {
                format!("static, {} precomputed", list.len())
            }
            SelectorMode::Static { precomputed: None } => "static".to_string(),
            SelectorMode::Dynamic { .. } => "dynamic".to_string(),
        };
        write_line(
            out,
            depth,
            &format!(
                "Partition Selector {} for {name} (scan slot {}, {mode}) predicate: {}",
                self.spec.selector_id, self.spec.scan_slot, self.spec.predicates
            ),
        );
        if let Some(child) = &self.child {
            child.explain(depth + 1, out);
        }
    }
}
