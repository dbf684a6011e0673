//! Scalar value and data-type vocabulary used in filter predicates, literals
//! in column expressions, and partition values.
//!
//! Trimmed, relative to the teacher's `value::Value`/`value::DataType`, to
//! the scalar types the spec's kernels actually need — no vector/temporal
//! types, those belong to a different engine.

use std::cmp::Ordering;
use std::fmt;

/// A data type for a table column or a literal scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int64,
    Float64,
    Utf8,
    Bool,
    Null,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int64 => write!(f, "int64"),
            DataType::Float64 => write!(f, "float64"),
            DataType::Utf8 => write!(f, "utf8"),
            DataType::Bool => write!(f, "bool"),
            DataType::Null => write!(f, "null"),
        }
    }
}

impl From<&arrow::datatypes::DataType> for DataType {
    fn from(dt: &arrow::datatypes::DataType) -> Self {
        use arrow::datatypes::DataType as Arrow;
        match dt {
            Arrow::Int8 | Arrow::Int16 | Arrow::Int32 | Arrow::Int64 => DataType::Int64,
            Arrow::UInt8 | Arrow::UInt16 | Arrow::UInt32 | Arrow::UInt64 => DataType::Int64,
            Arrow::Float16 | Arrow::Float32 | Arrow::Float64 => DataType::Float64,
            Arrow::Utf8 | Arrow::LargeUtf8 => DataType::Utf8,
            Arrow::Boolean => DataType::Bool,
            Arrow::Null => DataType::Null,
            _ => DataType::Null,
        }
    }
}

/// A scalar literal: a filter value, a partition value cast target, or a
/// literal argument to a column expression.
#[derive(Debug, Clone)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Bool(bool),
    Null,
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::Utf8(_) => DataType::Utf8,
            Value::Bool(_) => DataType::Bool,
            Value::Null => DataType::Null,
        }
    }

    /// Cast a partition value (always read from a directory name as text)
    /// to the type of `self`, the filter literal it is being compared
    /// against. Mirrors `part_check`'s `type(value)(part)` in the Python
    /// source: the partition string is downcast to the predicate's type,
    /// not the other way around.
    pub fn cast_partition_str(&self, raw: &str) -> Result<Value, String> {
        match self {
            Value::Int64(_) => raw
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| e.to_string()),
            Value::Float64(_) => raw
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|e| e.to_string()),
            Value::Bool(_) => raw
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|e| e.to_string()),
            Value::Utf8(_) => Ok(Value::Utf8(raw.to_string())),
            Value::Null => Ok(Value::Null),
        }
    }

    pub fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int64(a), Value::Int64(b)) => a.partial_cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Utf8(a), Value::Utf8(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp_value(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Utf8(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
        }
    }
}

/// Extract a single scalar from an Arrow array at `row`, downcasting to the
/// handful of types this crate's `Value` vocabulary covers.
pub(crate) fn scalar_at(array: &arrow::array::ArrayRef, row: usize) -> Value {
    use arrow::array::{Array, BooleanArray, Float64Array, Int64Array, StringArray};

    if array.is_null(row) {
        return Value::Null;
    }
    if let Some(a) = array.as_any().downcast_ref::<Int64Array>() {
        return Value::Int64(a.value(row));
    }
    if let Some(a) = array.as_any().downcast_ref::<Float64Array>() {
        return Value::Float64(a.value(row));
    }
    if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
        return Value::Utf8(a.value(row).to_string());
    }
    if let Some(a) = array.as_any().downcast_ref::<BooleanArray>() {
        return Value::Bool(a.value(row));
    }
    Value::Null
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_cast_matches_filter_literal_type() {
        let lit = Value::Int64(0);
        let cast = lit.cast_partition_str("0").unwrap();
        assert_eq!(cast, Value::Int64(0));
    }

    #[test]
    fn partition_cast_failure_reports_reason() {
        let lit = Value::Int64(0);
        assert!(lit.cast_partition_str("not-a-number").is_err());
    }

    #[test]
    fn cross_numeric_equality_coerces() {
        assert_eq!(Value::Int64(3).partial_cmp_value(&Value::Float64(3.0)), Some(Ordering::Equal));
    }
}
