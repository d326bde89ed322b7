//! Quals and targetlist of a scan, in the layout of the partition currently
//! being read.

use dynpart_expr::{AttributeMap, EvalContext, Expr, apply_map, apply_map_all};
use dynpart_result::Result;
use dynpart_types::{AttrNumber, RelationId, RelationSchema, Row, Varno};
use dynpart_storage::StoredTuple;

use crate::context::ExecContext;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanExprs {
    /// Filter applied to every tuple.
    pub qual: Option<Expr>,
    /// Output projection. `None` returns stored tuples as they are.
    pub targetlist: Option<Vec<Expr>>,
}

impl ScanExprs {
    pub fn new(qual: Option<Expr>, targetlist: Option<Vec<Expr>>) -> Self {
        Self { qual, targetlist }
    }

    /// Targetlist reading every live column of `schema` in order. Dropped
    /// positions produce no output column.
    pub fn full_targetlist(schema: &RelationSchema, varno: Varno) -> Vec<Expr> {
        schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.dropped)
            .map(|(idx, _)| Expr::col(varno, (idx + 1) as AttrNumber))
            .collect()
    }

    /// Rewritten copy for another layout.
    pub fn remap(&self, map: &AttributeMap, varno: Varno, with_targetlist: bool) -> Result<ScanExprs> {
        Ok(ScanExprs {
            qual: self.qual.as_ref().map(|q| apply_map(q, map, varno)).transpose()?,
            targetlist: match &self.targetlist {
                Some(tl) if with_targetlist => Some(apply_map_all(tl, map, varno)?),
                other => other.clone(),
            },
        })
    }

    /// Columns of `varno` read by the qual or the targetlist. `None` when
    /// the whole tuple is returned.
    pub fn needed_columns(&self, varno: Varno) -> Option<Vec<AttrNumber>> {
        let tl = self.targetlist.as_ref()?;
        let mut cols: Vec<AttrNumber> = tl.iter().flat_map(|e| e.referenced_attnos(varno)).collect();
        if let Some(q) = &self.qual {
            cols.extend(q.referenced_attnos(varno));
        }
        cols.sort_unstable();
        cols.dedup();
        Some(cols)
    }

    /// Filter and project one stored tuple of `relation`.
    pub fn project(
        &self,
        tuple: &StoredTuple,
        relation: RelationId,
        outer: Option<&Row>,
        ctx: &ExecContext,
    ) -> Result<Option<Row>> {
        let eval_ctx = EvalContext::new()
            .with_scan_row(&tuple.row)
            .with_outer_row(outer)
            .with_params(ctx.params())
            .with_relation(relation)
            .with_row_id(tuple.row_id);
        let evaluator = ctx.evaluator();
        if let Some(qual) = &self.qual
            && !evaluator.evaluate_predicate(qual, &eval_ctx)?
        {
            return Ok(None);
        }
        match &self.targetlist {
            Some(tl) => {
                let values = tl
                    .iter()
                    .map(|e| evaluator.evaluate(e, &eval_ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Row::new(values)))
            }
            None => Ok(Some(tuple.row.clone())),
        }
    }
}
