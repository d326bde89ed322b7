//! Core types shared by every dynpart crate: identifiers, scalar values,
//! relation layouts, rows and the cooperative interrupt flag.

pub mod ids;
pub mod interrupt;
pub mod row;
pub mod schema;
pub mod value;

pub use ids::{
    AttrNumber, IndexId, ROW_ID_ATTNO, RelationId, RowId, ScanSlotId, SelectorId,
    TABLE_OID_ATTNO, Varno, is_system_attno,
};
pub use interrupt::InterruptFlag;
pub use row::Row;
pub use schema::{ColumnDef, RelationSchema, SchemaRef};
pub use value::{DataType, Value};
