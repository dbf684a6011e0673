//! Evaluating a `Predicate` list against a materialised table into a
//! combined boolean mask, used by every node that applies filters locally
//! (sources, and the Aggregate/Calculation barriers).

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray};
use arrow::compute;
use arrow::compute::kernels::{boolean, cmp};

use crate::error::ExecError;
use crate::plan::{FilterOp, FilterValue, Predicate};
use crate::table::{Table, Value};

fn literal_array(value: &Value, len: usize) -> ArrayRef {
    use arrow::array::{Float64Array, Int64Array, StringArray};
    match value {
        Value::Int64(v) => Arc::new(Int64Array::from(vec![*v; len])),
        Value::Float64(v) => Arc::new(Float64Array::from(vec![*v; len])),
        Value::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
        Value::Bool(v) => Arc::new(BooleanArray::from(vec![*v; len])),
        Value::Null => Arc::new(BooleanArray::from(vec![None; len])),
    }
}

/// `cmp` kernels require both operands to share a `DataType`; a predicate
/// literal built from its own `Value` variant (e.g. an `Int64` literal
/// compared against a `Float64` aggregate column) would otherwise fail with
/// an `InvalidArgumentError`. Cast the literal to the column's type rather
/// than the other way around, so the column's native precision is kept.
fn literal_array_as(value: &Value, len: usize, dtype: &arrow::datatypes::DataType) -> Result<ArrayRef, ExecError> {
    let lit = literal_array(value, len);
    if lit.data_type() == dtype {
        return Ok(lit);
    }
    compute::cast(&lit, dtype).map_err(|e| ExecError::Kernel(e.to_string()))
}

fn predicate_mask(table: &Table, predicate: &Predicate) -> Result<BooleanArray, ExecError> {
    let column = table.column(&predicate.column)?.clone();
    let len = column.len();
    let dtype = column.data_type().clone();

    let mask = match (&predicate.op, &predicate.value) {
        (FilterOp::In, FilterValue::Set(values)) | (FilterOp::NotIn, FilterValue::Set(values)) => {
            let mut any = BooleanArray::from(vec![false; len]);
            for v in values {
                let lit = literal_array_as(v, len, &dtype)?;
                let eq = cmp::eq(&column, &lit).map_err(|e| ExecError::Kernel(e.to_string()))?;
                any = boolean::or(&any, &eq).map_err(|e| ExecError::Kernel(e.to_string()))?;
            }
            if matches!(predicate.op, FilterOp::NotIn) {
                boolean::not(&any).map_err(|e| ExecError::Kernel(e.to_string()))?
            } else {
                any
            }
        }
        (op, FilterValue::Scalar(v)) => {
            let lit = literal_array_as(v, len, &dtype)?;
            let result = match op {
                FilterOp::Eq => cmp::eq(&column, &lit),
                FilterOp::Ne => cmp::neq(&column, &lit),
                FilterOp::Lt => cmp::lt(&column, &lit),
                FilterOp::Le => cmp::lt_eq(&column, &lit),
                FilterOp::Gt => cmp::gt(&column, &lit),
                FilterOp::Ge => cmp::gt_eq(&column, &lit),
                FilterOp::In | FilterOp::NotIn => {
                    return Err(ExecError::Kernel(format!("operator {op} requires a set value")))
                }
            };
            result.map_err(|e| ExecError::Kernel(e.to_string()))?
        }
        _ => return Err(ExecError::Kernel(format!("unsupported predicate {}", predicate.canonical()))),
    };
    Ok(mask)
}

/// Apply every predicate (ANDed) to `table`, returning the filtered result.
/// An empty predicate list is a no-op.
pub fn apply(table: &Table, predicates: &[Predicate]) -> Result<Table, ExecError> {
    if predicates.is_empty() {
        return Ok(table.clone());
    }
    let mut combined = predicate_mask(table, &predicates[0])?;
    for predicate in &predicates[1..] {
        let next = predicate_mask(table, predicate)?;
        combined = boolean::and(&combined, &next).map_err(|e| ExecError::Kernel(e.to_string()))?;
    }
    Ok(table.filter_mask(&combined)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Float64Array;
    use arrow::record_batch::RecordBatch;

    #[test]
    fn int_literal_against_float_column_is_coerced() {
        let array: ArrayRef = Arc::new(Float64Array::from(vec![30.0, 205.0]));
        let batch = RecordBatch::try_from_iter(vec![("s", array)]).unwrap();
        let table = Table::from_batch(batch);

        let predicate = Predicate::new("s", FilterOp::Gt, FilterValue::Scalar(Value::Int64(100)));
        let result = apply(&table, &[predicate]).unwrap();
        assert_eq!(result.num_rows(), 1);
    }
}
