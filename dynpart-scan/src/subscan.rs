//! Non-dynamic scan over one open partition.

use dynpart_result::Result;
use dynpart_types::{RelationId, Row};
use dynpart_storage::{ScanKey, TupleCursor};

use crate::access::ScanCall;

/// Storage cursor plus qual/targetlist evaluation and periodic interrupt
/// polling.
pub struct SubScan {
    cursor: Box<dyn TupleCursor>,
    relation: RelationId,
    since_poll: usize,
}

impl SubScan {
    pub fn new(cursor: Box<dyn TupleCursor>, relation: RelationId) -> Self {
        Self {
            cursor,
            relation,
            since_poll: 0,
        }
    }

    /// Next tuple passing the qual, projected through the targetlist.
    pub fn next_row(&mut self, call: &ScanCall<'_>) -> Result<Option<Row>> {
        let interval = call.ctx.options().interrupt_check_interval.max(1);
        loop {
            self.since_poll += 1;
            if self.since_poll >= interval {
                self.since_poll = 0;
                call.ctx.check_interrupt()?;
            }
            let Some(tuple) = self.cursor.next_tuple()? else {
                return Ok(None);
            };
            if let Some(row) = call.exprs.project(&tuple, self.relation, call.outer, call.ctx)? {
                return Ok(Some(row));
            }
        }
    }

    pub fn rescan(&mut self, keys: &[ScanKey]) -> Result<()> {
        self.cursor.rescan(keys)
    }

    pub fn mark_pos(&mut self) -> Result<()> {
        self.cursor.mark_pos()
    }

    pub fn restore_pos(&mut self) -> Result<()> {
        self.cursor.restore_pos()
    }
}
