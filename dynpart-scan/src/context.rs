//! Execution context shared by the operators of one plan instance.

use std::fmt;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use dynpart_expr::{ExprEvaluator, Interpreter};
use dynpart_result::Result;
use dynpart_types::{InterruptFlag, Value};
use dynpart_storage::StorageAccess;

use crate::registry::{ScanRegistry, SharedScanRegistry};

/// Tuning knobs for dynamic scans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    /// Tuples read between interrupt polls inside one partition. Opening a
    /// partition always polls.
    pub interrupt_check_interval: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            interrupt_check_interval: 1024,
        }
    }
}

impl ScanOptions {
    pub fn with_interrupt_check_interval(mut self, interval: usize) -> Self {
        self.interrupt_check_interval = interval.max(1);
        self
    }
}

/// Collaborators every selector and scan needs: storage, the scan
/// registry, the expression evaluator, query parameters and the interrupt
/// flag. Cloning is cheap and shares all of them.
#[derive(Clone)]
pub struct ExecContext {
    storage: Arc<dyn StorageAccess>,
    registry: SharedScanRegistry,
    evaluator: Arc<dyn ExprEvaluator>,
    params: Arc<[Value]>,
    interrupt: InterruptFlag,
    options: ScanOptions,
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("params", &self.params)
            .field("interrupted", &self.interrupt.is_raised())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ExecContext {
    pub fn new(storage: Arc<dyn StorageAccess>, registry: SharedScanRegistry) -> Self {
        Self {
            storage,
            registry,
            evaluator: Arc::new(Interpreter),
            params: Arc::from(Vec::new()),
            interrupt: InterruptFlag::new(),
            options: ScanOptions::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExprEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = Arc::from(params);
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn storage(&self) -> &dyn StorageAccess {
        self.storage.as_ref()
    }

    pub fn evaluator(&self) -> &dyn ExprEvaluator {
        self.evaluator.as_ref()
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn registry(&self) -> &SharedScanRegistry {
        &self.registry
    }

    pub fn registry_read(&self) -> Result<RwLockReadGuard<'_, ScanRegistry>> {
        Ok(self.registry.read()?)
    }

    pub fn registry_write(&self) -> Result<RwLockWriteGuard<'_, ScanRegistry>> {
        Ok(self.registry.write()?)
    }

    #[inline]
    pub fn check_interrupt(&self) -> Result<()> {
        self.interrupt.check()
    }
}
