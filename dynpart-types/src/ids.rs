//! Identifiers shared across dynpart crates.
//!
//! Relation, scan-slot, selector and index ids are distinct newtypes so a
//! slot id can never be passed where a relation id is expected. Attribute
//! numbers and range-table positions stay plain integer aliases because they
//! are used in arithmetic.

use std::fmt;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Catalog identifier of a relation: a partitioned root, an intermediate
    /// partition or a leaf partition.
    RelationId
);

id_newtype!(
    /// Plan-assigned key connecting partition selectors to the dynamic scans
    /// that consume their output.
    ScanSlotId
);

id_newtype!(
    /// Identifies one partition selector within a plan. Used only for
    /// provenance in diagnostics.
    SelectorId
);

id_newtype!(
    /// Catalog identifier of a physical index on one relation.
    IndexId
);

/// 1-based column position within a relation's layout. Values `<= 0` denote
/// system columns and are never remapped.
pub type AttrNumber = i16;

/// Range-table position identifying which relation a column reference
/// belongs to within a plan node.
pub type Varno = u32;

/// Physical row identifier inside one relation.
pub type RowId = u64;

/// System attribute carrying the physical row id.
pub const ROW_ID_ATTNO: AttrNumber = -1;

/// System attribute carrying the id of the relation a row was read from.
pub const TABLE_OID_ATTNO: AttrNumber = -7;

/// True for attribute numbers that denote system columns.
#[inline]
pub fn is_system_attno(attno: AttrNumber) -> bool {
    attno <= 0
}
