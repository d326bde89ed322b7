//! Runtime partition selection.
//!
//! Walks a [`PartitionHierarchy`] top-down. At each level the rules to
//! descend into are chosen by, in order of preference, an equality predicate
//! (evaluated to a key value and routed to at most one rule), a general
//! predicate (evaluated once per rule with that rule in context), or
//! nothing (every rule). Leaves that survive the residual predicate are
//! emitted with the scan slot produced by the propagation expression.

use std::fmt;

use dynpart_expr::{EvalContext, Expr, ExprEvaluator};
use dynpart_result::{Error, Result};
use dynpart_types::{InterruptFlag, RelationId, Row, ScanSlotId, Value};
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::hierarchy::{PartitionHierarchy, PartitionLevel, PartitionRule};
use crate::rule::RuleContext;

/// Predicates a selector evaluates against the hierarchy. Level vectors are
/// indexed by depth; missing entries mean "no predicate at this level".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionPredicates {
    pub level_equality: Vec<Option<Expr>>,
    pub level_general: Vec<Option<Expr>>,
    /// Checked per leaf, with the leaf as the current relation.
    pub residual: Option<Expr>,
    /// Evaluates to the scan slot a leaf is registered under.
    pub propagation: Option<Expr>,
}

impl SelectionPredicates {
    pub fn new(levels: usize) -> Self {
        Self {
            level_equality: vec![None; levels],
            level_general: vec![None; levels],
            residual: None,
            propagation: None,
        }
    }

    pub fn with_equality(mut self, level: usize, expr: Expr) -> Self {
        set_level(&mut self.level_equality, level, expr);
        self
    }

    pub fn with_general(mut self, level: usize, expr: Expr) -> Self {
        set_level(&mut self.level_general, level, expr);
        self
    }

    pub fn with_residual(mut self, expr: Expr) -> Self {
        self.residual = Some(expr);
        self
    }

    pub fn with_propagation(mut self, expr: Expr) -> Self {
        self.propagation = Some(expr);
        self
    }

    pub fn equality(&self, level: usize) -> Option<&Expr> {
        self.level_equality.get(level).and_then(Option::as_ref)
    }

    pub fn general(&self, level: usize) -> Option<&Expr> {
        self.level_general.get(level).and_then(Option::as_ref)
    }

    /// True when every predicate can be evaluated without an input row.
    pub fn is_row_independent(&self) -> bool {
        self.level_equality
            .iter()
            .chain(&self.level_general)
            .flatten()
            .chain(&self.residual)
            .chain(&self.propagation)
            .all(Expr::is_row_independent)
    }
}

fn set_level(levels: &mut Vec<Option<Expr>>, level: usize, expr: Expr) {
    if levels.len() <= level {
        levels.resize(level + 1, None);
    }
    levels[level] = Some(expr);
}

/// Human-readable predicate summary shown in explain output.
impl fmt::Display for SelectionPredicates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (level, expr) in self.level_equality.iter().enumerate() {
            if let Some(e) = expr {
                parts.push(format!("level {level}: key = {e}"));
            }
        }
        for (level, expr) in self.level_general.iter().enumerate() {
            if let Some(e) = expr {
                parts.push(format!("level {level}: {e}"));
            }
        }
        if let Some(e) = &self.residual {
            parts.push(format!("residual: {e}"));
        }
        if parts.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}

/// One selected leaf and the scan slot it is destined for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SelectedPartition {
    pub relation: RelationId,
    pub scan_slot: ScanSlotId,
}

/// Rows and parameters a selection run evaluates against.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectionInput<'a> {
    /// Input row in the partitioned table's layout (read by `Column`).
    pub row: Option<&'a Row>,
    /// Unprojected input row (read by `OuterColumn`).
    pub outer: Option<&'a Row>,
    pub params: &'a [Value],
}

impl<'a> SelectionInput<'a> {
    /// No row: static selection.
    pub fn constant(params: &'a [Value]) -> Self {
        Self {
            row: None,
            outer: None,
            params,
        }
    }

    /// A single row visible both as scan columns and as outer columns.
    pub fn row(row: &'a Row, params: &'a [Value]) -> Self {
        Self {
            row: Some(row),
            outer: Some(row),
            params,
        }
    }

    fn eval_context(&self) -> EvalContext<'a> {
        EvalContext {
            scan_row: self.row,
            outer_row: self.outer,
            params: self.params,
            ..EvalContext::default()
        }
    }
}

/// The selection engine bound to one hierarchy and predicate set.
pub struct PartitionSelection<'a> {
    hierarchy: &'a PartitionHierarchy,
    predicates: &'a SelectionPredicates,
    evaluator: &'a dyn ExprEvaluator,
    default_slot: ScanSlotId,
    interrupt: Option<&'a InterruptFlag>,
}

impl<'a> PartitionSelection<'a> {
    pub fn new(
        hierarchy: &'a PartitionHierarchy,
        predicates: &'a SelectionPredicates,
        evaluator: &'a dyn ExprEvaluator,
        default_slot: ScanSlotId,
    ) -> Self {
        Self {
            hierarchy,
            predicates,
            evaluator,
            default_slot,
            interrupt: None,
        }
    }

    pub fn with_interrupt(mut self, interrupt: &'a InterruptFlag) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Run selection once. Leaves are deduplicated within the run and
    /// returned in hierarchy order.
    pub fn select(&self, input: &SelectionInput<'_>) -> Result<Vec<SelectedPartition>> {
        let mut run = SelectionRun {
            seen: FxHashSet::default(),
            out: Vec::new(),
        };
        self.walk_level(self.hierarchy.top_level(), 0, input, &mut run)?;
        Ok(run.out)
    }

    fn check_interrupt(&self) -> Result<()> {
        match self.interrupt {
            Some(flag) => flag.check(),
            None => Ok(()),
        }
    }

    fn walk_level(
        &self,
        level: &PartitionLevel,
        depth: usize,
        input: &SelectionInput<'_>,
        run: &mut SelectionRun,
    ) -> Result<()> {
        if level.key.columns.len() != 1 {
            return Err(Error::UnsupportedPartitionKey {
                level: depth,
                columns: level.key.columns.len(),
            });
        }
        let ctx = input.eval_context();

        if let Some(eq) = self.predicates.equality(depth) {
            let value = self
                .evaluator
                .evaluate(eq, &ctx)?
                .coerce_to(level.key.data_type)?;
            return match level.route(&value)? {
                Some(rule) => {
                    trace!(level = depth, rule = %rule.name, value = %value, "equality routed");
                    self.descend(rule, depth, input, run)
                }
                None => {
                    trace!(level = depth, value = %value, "equality matched no rule");
                    Ok(())
                }
            };
        }

        if let Some(general) = self.predicates.general(depth) {
            for rule in &level.rules {
                self.check_interrupt()?;
                let view = RuleContext { level, rule };
                if self.evaluator.evaluate_predicate(general, &ctx.with_rule(&view))? {
                    self.descend(rule, depth, input, run)?;
                }
            }
            return Ok(());
        }

        for rule in &level.rules {
            self.descend(rule, depth, input, run)?;
        }
        Ok(())
    }

    fn descend(
        &self,
        rule: &PartitionRule,
        depth: usize,
        input: &SelectionInput<'_>,
        run: &mut SelectionRun,
    ) -> Result<()> {
        self.check_interrupt()?;
        let last = depth + 1 == self.hierarchy.levels();
        match (&rule.children, last) {
            (Some(child), false) => self.walk_level(child, depth + 1, input, run),
            (None, true) => self.emit(rule.relation, input, run),
            (None, false) => Err(Error::MalformedHierarchy(format!(
                "non-leaf rule '{}' at level {depth} has no child level",
                rule.name
            ))),
            (Some(_), true) => Err(Error::MalformedHierarchy(format!(
                "rule '{}' has children below the last level {depth}",
                rule.name
            ))),
        }
    }

    fn emit(&self, leaf: RelationId, input: &SelectionInput<'_>, run: &mut SelectionRun) -> Result<()> {
        if run.seen.contains(&leaf) {
            return Ok(());
        }
        let ctx = input.eval_context().with_relation(leaf);
        if let Some(residual) = &self.predicates.residual
            && !self.evaluator.evaluate_predicate(residual, &ctx)?
        {
            trace!(relation = %leaf, "residual rejected leaf");
            return Ok(());
        }
        let scan_slot = match &self.predicates.propagation {
            Some(expr) => slot_from_value(&self.evaluator.evaluate(expr, &ctx)?)?,
            None => self.default_slot,
        };
        run.seen.insert(leaf);
        trace!(relation = %leaf, scan_slot = %scan_slot, "leaf selected");
        run.out.push(SelectedPartition {
            relation: leaf,
            scan_slot,
        });
        Ok(())
    }
}

struct SelectionRun {
    seen: FxHashSet<RelationId>,
    out: Vec<SelectedPartition>,
}

fn slot_from_value(value: &Value) -> Result<ScanSlotId> {
    let raw = value
        .as_i64()?
        .ok_or_else(|| Error::expr_eval("propagation expression produced NULL"))?;
    u32::try_from(raw)
        .map(ScanSlotId::new)
        .map_err(|_| Error::expr_eval(format!("{raw} is not a valid scan slot")))
}

/// One-shot convenience over [`PartitionSelection`].
pub fn select_partitions(
    hierarchy: &PartitionHierarchy,
    predicates: &SelectionPredicates,
    evaluator: &dyn ExprEvaluator,
    default_slot: ScanSlotId,
    row: Option<&Row>,
) -> Result<Vec<SelectedPartition>> {
    let input = SelectionInput {
        row,
        outer: row,
        params: &[],
    };
    PartitionSelection::new(hierarchy, predicates, evaluator, default_slot).select(&input)
}
