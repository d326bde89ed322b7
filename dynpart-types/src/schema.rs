//! Relation layouts.
//!
//! Partitions of one table may have physically different layouts: columns
//! dropped before a partition was created leave holes in the parent but not
//! in the child, so the same logical column can sit at different positions.

use std::sync::Arc;

use crate::ids::AttrNumber;
use crate::value::DataType;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    /// Dropped columns keep their position but never match anything.
    pub dropped: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            dropped: false,
        }
    }

    /// Placeholder for a column that has been dropped from the relation.
    pub fn dropped(data_type: DataType) -> Self {
        Self {
            name: String::new(),
            data_type,
            dropped: true,
        }
    }
}

/// Ordered column definitions of one relation. Attribute numbers are 1-based
/// positions into `columns`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationSchema {
    columns: Vec<ColumnDef>,
}

pub type SchemaRef = Arc<RelationSchema>;

impl RelationSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Number of attributes including dropped ones.
    pub fn natts(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, attno: AttrNumber) -> Option<&ColumnDef> {
        if attno <= 0 {
            return None;
        }
        self.columns.get(attno as usize - 1)
    }

    /// Position of the live column called `name`.
    pub fn attno_of(&self, name: &str) -> Option<AttrNumber> {
        self.columns
            .iter()
            .position(|c| !c.dropped && c.name == name)
            .map(|idx| (idx + 1) as AttrNumber)
    }

    /// Names of the live columns in layout order.
    pub fn live_column_names(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| !c.dropped)
            .map(|c| c.name.as_str())
    }
}
