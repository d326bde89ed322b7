//! Cooperative cancellation.
//!
//! Long-running loops (hierarchy walks, partition iteration, row scans) poll
//! an [`InterruptFlag`] and bail out with [`Error::Cancelled`] once it is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dynpart_result::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Visible to every clone of this flag.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Poll point: fails with [`Error::Cancelled`] once raised.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
