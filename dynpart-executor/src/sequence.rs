use dynpart_result::{Error, Result};
use dynpart_types::Row;

use crate::node::{BoxedNode, PlanNode, write_line};

/// Runs every child but the last to exhaustion, then streams the last one.
/// Used to put a static selector in front of the scan it feeds.
pub struct SequenceExec {
    children: Vec<BoxedNode>,
    prefix_done: bool,
}

impl SequenceExec {
    pub fn new(children: Vec<BoxedNode>) -> Result<Self> {
        if children.is_empty() {
            return Err(Error::InvalidArgumentError(
                "sequence needs at least one child".to_string(),
            ));
        }
        Ok(Self {
            children,
            prefix_done: false,
        })
    }
}

impl PlanNode for SequenceExec {
    fn next(&mut self) -> Result<Option<Row>> {
        let Some((last, prefix)) = self.children.split_last_mut() else {
            return Ok(None);
        };
        if !self.prefix_done {
            for child in prefix {
                while child.next()?.is_some() {}
            }
            self.prefix_done = true;
        }
        last.next()
    }

    fn rescan(&mut self, outer: Option<&Row>) -> Result<()> {
        self.prefix_done = false;
        for child in &mut self.children {
            child.rescan(outer)?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let mut first_err = None;
        for child in &mut self.children {
            if let Err(err) = child.end() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn explain(&self, depth: usize, out: &mut String) {
        write_line(out, depth, "Sequence");
        for child in &self.children {
            child.explain(depth + 1, out);
        }
    }
}
