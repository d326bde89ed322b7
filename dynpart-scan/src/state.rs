//! Dynamic scan states.

use std::fmt;

use dynpart_result::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanState {
    /// Nothing opened yet; the partition set has not been read.
    Init,
    /// Partition cursor positioned before the first partition.
    First,
    /// Pulling rows from the open partition.
    Scan,
    /// Current partition exhausted; the next one has not been opened.
    Next,
    /// Every partition has been scanned.
    Done,
    /// Resources released. Terminal.
    End,
}

impl ScanState {
    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Init => "SCAN_INIT",
            ScanState::First => "SCAN_FIRST",
            ScanState::Scan => "SCAN_SCAN",
            ScanState::Next => "SCAN_NEXT",
            ScanState::Done => "SCAN_DONE",
            ScanState::End => "SCAN_END",
        }
    }

    fn allows(self, to: ScanState) -> bool {
        use ScanState::*;
        match (self, to) {
            (End, _) => false,
            (_, End) => true,
            (Init, First) => true,
            (First | Next, Scan | Done) => true,
            (Scan, Next) => true,
            // rescans
            (First | Scan | Next | Done, First | Init) => true,
            (Init, Init) => true,
            _ => false,
        }
    }

    /// Move to `to`, failing on edges the state machine does not have.
    pub fn transition(&mut self, to: ScanState) -> Result<()> {
        if !self.allows(to) {
            return Err(Error::state_transition(self.name(), to.name()));
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
