//! Scalar values flowing through rows, expressions and partition bounds.
//!
//! Comparison follows the partitioning operator class of the value's type:
//! integers and floats compare numerically with each other, text compares
//! bytewise, and NULL compares as unknown.

use std::cmp::Ordering;
use std::fmt;

use dynpart_result::{Error, Result};

/// Logical column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Float,
    Text,
    Bool,
    /// Days since 1970-01-01.
    Date,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "integer",
            DataType::Float => "float",
            DataType::Text => "text",
            DataType::Bool => "boolean",
            DataType::Date => "date",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Date(i32),
}

macro_rules! impl_from_for_value {
    ($variant:ident, $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_value!(Int, i8, i16, i32, i64, u8, u16, u32);
impl_from_for_value!(Float, f32, f64);
impl_from_for_value!(Text, String);
impl_from_for_value!(Bool, bool);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bool(_) => "boolean",
            Value::Date(_) => "date",
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(DataType::Int),
            Value::Float(_) => Some(DataType::Float),
            Value::Text(_) => Some(DataType::Text),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Date(_) => Some(DataType::Date),
        }
    }

    /// Compare two values under the partitioning operator class.
    ///
    /// Returns `Ok(None)` when either side is NULL. Values of unrelated types
    /// are an evaluation error.
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>> {
        use Value::*;
        let ord = match (self, other) {
            (Null, _) | (_, Null) => return Ok(None),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (a, b) => {
                return Err(Error::expr_eval(format!(
                    "cannot compare {} with {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        };
        Ok(Some(ord))
    }

    /// Equality under [`Value::compare`]; NULL is never equal to anything.
    pub fn equals(&self, other: &Value) -> Result<bool> {
        Ok(self.compare(other)? == Some(Ordering::Equal))
    }

    /// Coerce into `target`, widening integers to floats where needed.
    pub fn coerce_to(&self, target: DataType) -> Result<Value> {
        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Int(v), DataType::Float) => Ok(Value::Float(*v as f64)),
            (Value::Int(v), DataType::Date) => i32::try_from(*v)
                .map(Value::Date)
                .map_err(|_| Error::expr_eval(format!("{v} is out of range for date"))),
            (v, t) if v.data_type() == Some(t) => Ok(v.clone()),
            (v, t) => Err(Error::expr_eval(format!(
                "cannot coerce {} to {}",
                v.type_name(),
                t
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(Error::expr_eval(format!(
                "expected boolean, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_i64(&self) -> Result<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            other => Err(Error::expr_eval(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        }
    }

    /// Human-friendly rendering used in explain and debug output.
    pub fn format_display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => format!("DATE {d}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_display())
    }
}
