//! Lifetime of one query execution.
//!
//! A [`QueryExecution`] owns everything that must live exactly as long as
//! one run of a plan: the scan registry, the hierarchy cache and the
//! interrupt flag. Operators are built through it so they all share the
//! same [`ExecContext`].

use std::sync::Arc;

use dynpart_expr::ExprEvaluator;
use dynpart_partition::{HierarchyCache, PartitionCatalog, PartitionHierarchy};
use dynpart_result::Result;
use dynpart_scan::{AccessMethod, DynamicScan, DynamicScanSpec, ExecContext, ScanRegistry, SharedScanRegistry};
use dynpart_storage::StorageAccess;
use dynpart_types::{InterruptFlag, RelationId, Row, Value};
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::diagnostics::SelectionReport;
use crate::node::{BoxedNode, PlanNode};
use crate::selector::{PartitionSelectorExec, PartitionSelectorSpec};

pub struct QueryExecution {
    config: ExecutorConfig,
    registry: SharedScanRegistry,
    hierarchies: HierarchyCache,
    interrupt: InterruptFlag,
    ctx: ExecContext,
}

impl QueryExecution {
    pub fn new(
        storage: Arc<dyn StorageAccess>,
        catalog: Arc<dyn PartitionCatalog>,
        config: ExecutorConfig,
    ) -> Self {
        let registry = ScanRegistry::shared();
        let interrupt = InterruptFlag::default();
        let ctx = ExecContext::new(storage, Arc::clone(&registry))
            .with_interrupt(interrupt.clone())
            .with_options(config.scan.clone());
        Self {
            config,
            registry,
            hierarchies: HierarchyCache::new(catalog),
            interrupt,
            ctx,
        }
    }

    /// Query parameters visible to every operator built afterwards.
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.ctx = self.ctx.with_params(params);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExprEvaluator>) -> Self {
        self.ctx = self.ctx.with_evaluator(evaluator);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn registry(&self) -> &SharedScanRegistry {
        &self.registry
    }

    /// Flag that cancels the query when raised.
    pub fn interrupt(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    pub fn hierarchy(&self, root: RelationId) -> Result<Arc<PartitionHierarchy>> {
        self.hierarchies.get(root)
    }

    pub fn hierarchy_cache(&self) -> &HierarchyCache {
        &self.hierarchies
    }

    pub fn partition_selector(
        &self,
        spec: PartitionSelectorSpec,
        child: Option<BoxedNode>,
    ) -> Result<PartitionSelectorExec> {
        let hierarchy = self.hierarchy(spec.root)?;
        PartitionSelectorExec::new(spec, hierarchy, self.ctx.clone(), child)
    }

    pub fn dynamic_scan<A: AccessMethod>(&self, spec: DynamicScanSpec, access: A) -> Result<DynamicScan<A>> {
        DynamicScan::new(spec, access, self.ctx.clone())
    }

    /// Pull every row from `root`, then end it. The plan is ended on the
    /// error path too, so open partitions are released before the error is
    /// returned.
    pub fn run(&self, root: &mut dyn PlanNode) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let pulled = loop {
            match root.next() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        let ended = root.end();
        if let Err(err) = &pulled {
            if let Err(end_err) = &ended {
                warn!(error = %end_err, "failed to end plan after query error");
            }
            debug!(error = %err, "query aborted");
        }
        pulled?;
        ended?;
        Ok(rows)
    }

    pub fn selection_report(&self) -> Result<SelectionReport> {
        let registry = self.ctx.registry_read()?;
        Ok(SelectionReport::from_registry(&registry))
    }

    /// Tear the query down, logging the selection report when configured.
    pub fn finish(self) -> Result<SelectionReport> {
        let report = self.selection_report()?;
        if self.config.log_selected_partitions {
            report.log();
        }
        debug!(
            slots = report.slots.len(),
            partitions = report.total_partitions(),
            hierarchies_loaded = self.hierarchies.load_count(),
            "query execution finished"
        );
        Ok(report)
    }
}
