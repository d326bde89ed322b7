//! Attribute remapping between relation layouts.
//!
//! Expressions are planned against one layout (usually the partitioned
//! root). Before they can be evaluated against a partition whose physical
//! layout differs, every column reference must be rewritten to the
//! partition's positions. [`compute_map`] derives the position map by
//! column name and [`apply_map`] produces a rewritten copy of an expression.

use std::fmt;

use dynpart_result::{Error, Result};
use dynpart_types::{AttrNumber, RelationSchema, Varno};

use crate::{ColumnRef, Expr};

/// Where an attribute of the old layout lives in the new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrMapping {
    Mapped(AttrNumber),
    /// The old column was dropped; references are left alone.
    Dropped,
    /// The old column has no live counterpart of the same name and type.
    Absent,
}

/// Position map from one relation layout to another, indexed by 1-based
/// attribute numbers of the old layout.
#[derive(Clone, PartialEq, Eq)]
pub struct AttributeMap {
    entries: Vec<AttrMapping>,
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for (idx, entry) in self.entries.iter().enumerate() {
            list.entry(&(idx + 1), entry);
        }
        list.finish()
    }
}

impl AttributeMap {
    pub fn from_entries(entries: Vec<AttrMapping>) -> Self {
        Self { entries }
    }

    /// Number of attributes in the old layout.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, attno: AttrNumber) -> Option<AttrMapping> {
        if attno <= 0 {
            return None;
        }
        self.entries.get(attno as usize - 1).copied()
    }

    /// Translate one attribute number. System attributes pass through.
    pub fn map_attno(&self, attno: AttrNumber) -> Result<AttrNumber> {
        if attno <= 0 {
            return Ok(attno);
        }
        match self.get(attno) {
            Some(AttrMapping::Mapped(new)) => Ok(new),
            Some(AttrMapping::Dropped) => Ok(attno),
            Some(AttrMapping::Absent) | None => Err(Error::UnmappedAttribute { attno }),
        }
    }

    fn is_noop(&self) -> bool {
        self.entries.iter().enumerate().all(|(idx, m)| match m {
            AttrMapping::Mapped(new) => *new as usize == idx + 1,
            AttrMapping::Dropped => true,
            AttrMapping::Absent => false,
        })
    }
}

/// Build the position map from `old` to `new`, matching live columns by
/// name and type. Returns `None` when applying the map would change nothing.
pub fn compute_map(old: &RelationSchema, new: &RelationSchema) -> Option<AttributeMap> {
    let entries = old
        .columns()
        .iter()
        .map(|col| {
            if col.dropped {
                return AttrMapping::Dropped;
            }
            match new.attno_of(&col.name) {
                Some(attno)
                    if new
                        .column(attno)
                        .is_some_and(|c| c.data_type == col.data_type) =>
                {
                    AttrMapping::Mapped(attno)
                }
                _ => AttrMapping::Absent,
            }
        })
        .collect();
    let map = AttributeMap { entries };
    if map.is_noop() { None } else { Some(map) }
}

/// Rewrite every user column reference of range-table entry `varno` through
/// `map`, returning a new tree. References to other range-table entries and
/// system columns are left unchanged.
pub fn apply_map(expr: &Expr, map: &AttributeMap, varno: Varno) -> Result<Expr> {
    expr.try_map_columns(&mut |c: ColumnRef| {
        if c.varno != varno || c.is_system() {
            return Ok(c);
        }
        Ok(ColumnRef::new(c.varno, map.map_attno(c.attno)?))
    })
}

/// [`apply_map`] over a list of expressions.
pub fn apply_map_all(exprs: &[Expr], map: &AttributeMap, varno: Varno) -> Result<Vec<Expr>> {
    exprs.iter().map(|e| apply_map(e, map, varno)).collect()
}

/// Remap index key attribute numbers. Entry `0` marks an expression column
/// and is kept as is.
pub fn remap_attnos(attnos: &[AttrNumber], map: &AttributeMap) -> Result<Vec<AttrNumber>> {
    attnos
        .iter()
        .map(|&attno| if attno == 0 { Ok(0) } else { map.map_attno(attno) })
        .collect()
}
