//! Pull-based plan node interface.

use dynpart_result::{Error, Result};
use dynpart_scan::{AccessMethod, DynamicScan};
use dynpart_types::Row;

/// A volcano-style operator. Each `next` returns one row or `None` at end of
/// data; `rescan` restarts the node, optionally with a new outer row.
pub trait PlanNode {
    fn next(&mut self) -> Result<Option<Row>>;

    fn rescan(&mut self, outer: Option<&Row>) -> Result<()>;

    /// Release resources. Must be safe to call more than once.
    fn end(&mut self) -> Result<()>;

    /// Append this node's explain lines, indented by `depth`.
    fn explain(&self, depth: usize, out: &mut String);
}

pub type BoxedNode = Box<dyn PlanNode>;

impl<A> PlanNode for DynamicScan<A>
where
    A: AccessMethod<Output = Row>,
{
    fn next(&mut self) -> Result<Option<Row>> {
        DynamicScan::next(self)
    }

    fn rescan(&mut self, outer: Option<&Row>) -> Result<()> {
        DynamicScan::rescan(self, outer)
    }

    fn end(&mut self) -> Result<()> {
        DynamicScan::end(self)
    }

    fn explain(&self, depth: usize, out: &mut String) {
        write_line(out, depth, &DynamicScan::explain(self));
    }
}

/// Full explain text of a plan tree.
pub fn explain_plan(node: &dyn PlanNode) -> String {
    let mut out = String::new();
    node.explain(0, &mut out);
    out
}

pub(crate) fn write_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    if depth > 0 {
        out.push_str("-> ");
    }
    out.push_str(line);
    out.push('\n');
}

/// Constant rows, e.g. the outer side of a join in tests and demos.
#[derive(Clone, Debug, Default)]
pub struct ValuesExec {
    rows: Vec<Row>,
    pos: usize,
    ended: bool,
}

impl ValuesExec {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            pos: 0,
            ended: false,
        }
    }
}

impl PlanNode for ValuesExec {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.ended {
            return Err(Error::Internal("values scan used after end".to_string()));
        }
        let row = self.rows.get(self.pos).cloned();
        if row.is_some() {
            self.pos += 1;
        }
        Ok(row)
    }

    fn rescan(&mut self, _outer: Option<&Row>) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.ended = true;
        Ok(())
    }

    fn explain(&self, depth: usize, out: &mut String) {
        write_line(out, depth, &format!("Values ({} rows)", self.rows.len()));
    }
}
