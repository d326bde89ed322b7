use dynpart_expr::{EvalContext, Expr};
use dynpart_result::Result;
use dynpart_scan::ExecContext;
use dynpart_types::Row;

use crate::node::{BoxedNode, PlanNode, write_line};

/// Nested-loop join. The inner side is rescanned with every outer row, so
/// join-driven dynamic scans re-read their partition set and runtime keys.
/// Output rows are the outer row followed by the inner row.
pub struct NestedLoopJoinExec {
    outer: BoxedNode,
    inner: BoxedNode,
    /// Evaluated with the inner row as scan row and the outer row as outer.
    qual: Option<Expr>,
    ctx: ExecContext,
    current_outer: Option<Row>,
}

impl NestedLoopJoinExec {
    pub fn new(outer: BoxedNode, inner: BoxedNode, qual: Option<Expr>, ctx: ExecContext) -> Self {
        Self {
            outer,
            inner,
            qual,
            ctx,
            current_outer: None,
        }
    }

    fn passes(&self, outer: &Row, inner: &Row) -> Result<bool> {
        let Some(qual) = &self.qual else {
            return Ok(true);
        };
        let eval_ctx = EvalContext::new()
            .with_scan_row(inner)
            .with_outer_row(Some(outer))
            .with_params(self.ctx.params());
        self.ctx.evaluator().evaluate_predicate(qual, &eval_ctx)
    }
}

impl PlanNode for NestedLoopJoinExec {
    fn next(&mut self) -> Result<Option<Row>> {
        loop {
            self.ctx.check_interrupt()?;
            let outer = match self.current_outer.take() {
                Some(row) => row,
                None => {
                    let Some(row) = self.outer.next()? else {
                        return Ok(None);
                    };
                    self.inner.rescan(Some(&row))?;
                    row
                }
            };
            match self.inner.next()? {
                Some(inner) => {
                    let keep = self.passes(&outer, &inner)?;
                    let joined = keep.then(|| outer.concat(&inner));
                    self.current_outer = Some(outer);
                    if joined.is_some() {
                        return Ok(joined);
                    }
                }
                None => self.current_outer = None,
            }
        }
    }

    fn rescan(&mut self, outer: Option<&Row>) -> Result<()> {
        self.current_outer = None;
        self.outer.rescan(outer)
    }

    fn end(&mut self) -> Result<()> {
        let outer = self.outer.end();
        let inner = self.inner.end();
        outer.and(inner)
    }

    fn explain(&self, depth: usize, out: &mut String) {
        let line = match &self.qual {
            Some(qual) => format!("Nested Loop join: {qual}"),
            None => "Nested Loop".to_string(),
        };
        write_line(out, depth, &line);
        self.outer.explain(depth + 1, out);
        self.inner.explain(depth + 1, out);
    }
}
