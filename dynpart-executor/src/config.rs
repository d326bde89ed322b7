//! Executor configuration.

use dynpart_scan::ScanOptions;
use tracing::warn;

/// Emit the per-query selection report at `info` level.
pub const LOG_SELECTION_ENV: &str = "DYNPART_LOG_SELECTION";
/// Override [`ScanOptions::interrupt_check_interval`].
pub const INTERRUPT_CHECK_INTERVAL_ENV: &str = "DYNPART_INTERRUPT_CHECK_INTERVAL";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub scan: ScanOptions,
    /// Log which partitions every scan slot selected when the query finishes.
    pub log_selected_partitions: bool,
}

impl ExecutorConfig {
    /// Defaults overridden by the `DYNPART_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ExecutorConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(LOG_SELECTION_ENV) {
            config.log_selected_partitions = parse_flag(&raw);
        }
        if let Some(raw) = lookup(INTERRUPT_CHECK_INTERVAL_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(interval) if interval > 0 => {
                    config.scan = config.scan.with_interrupt_check_interval(interval);
                }
                _ => warn!(
                    variable = INTERRUPT_CHECK_INTERVAL_ENV,
                    value = %raw,
                    "ignoring invalid interrupt check interval"
                ),
            }
        }
        config
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_log_selected_partitions(mut self, enabled: bool) -> Self {
        self.log_selected_partitions = enabled;
        self
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
