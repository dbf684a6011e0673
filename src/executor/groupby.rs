//! Group-by aggregation kernel (spec.md §4.2/§4.4 `Aggregate`).
//!
//! Implemented directly over `Value` extraction rather than delegating to
//! an Arrow compute grouping kernel — the spec treats this kernel's scalar
//! implementation as a well-understood collaborator specified at the
//! contract level only (spec.md §1), so a straightforward, correct
//! implementation is the point, not a high-throughput one.

use std::collections::BTreeMap;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use std::sync::Arc;

use crate::error::ExecError;
use crate::plan::{AggMethod, AggSpec};
use crate::table::{DataType, Table, Value};

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int64(n) => Some(*n as f64),
        Value::Float64(n) => Some(*n),
        _ => None,
    }
}

fn aggregate_group(values: &[Value], method: AggMethod) -> Result<Value, ExecError> {
    match method {
        AggMethod::Count => Ok(Value::Int64(values.iter().filter(|v| !matches!(v, Value::Null)).count() as i64)),
        AggMethod::DistinctCount => {
            let mut seen: Vec<String> = values
                .iter()
                .filter(|v| !matches!(v, Value::Null))
                .map(ToString::to_string)
                .collect();
            seen.sort();
            seen.dedup();
            Ok(Value::Int64(seen.len() as i64))
        }
        _ => {
            let nums: Vec<f64> = values.iter().filter_map(numeric).collect();
            if nums.is_empty() {
                return Ok(Value::Null);
            }
            let result = match method {
                AggMethod::Sum => nums.iter().sum(),
                AggMethod::Prod => nums.iter().product(),
                AggMethod::Max => nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                AggMethod::Min => nums.iter().cloned().fold(f64::INFINITY, f64::min),
                AggMethod::Mean => nums.iter().sum::<f64>() / nums.len() as f64,
                AggMethod::Median => {
                    let mut sorted = nums.clone();
                    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                    let mid = sorted.len() / 2;
                    if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] }
                }
                AggMethod::Var | AggMethod::Std => {
                    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                    let var = nums.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nums.len() as f64;
                    if matches!(method, AggMethod::Std) { var.sqrt() } else { var }
                }
                AggMethod::Count | AggMethod::DistinctCount => unreachable!(),
            };
            Ok(Value::Float64(result))
        }
    }
}

fn column_from_values(values: &[Value], dtype_hint: DataType) -> ArrayRef {
    match dtype_hint {
        DataType::Int64 => Arc::new(Int64Array::from(
            values.iter().map(|v| if let Value::Int64(n) = v { Some(*n) } else { None }).collect::<Vec<_>>(),
        )),
        DataType::Utf8 => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| if let Value::Utf8(s) = v { Some(s.clone()) } else { None })
                .collect::<Vec<_>>(),
        )),
        DataType::Bool => Arc::new(BooleanArray::from(
            values.iter().map(|v| if let Value::Bool(b) = v { Some(*b) } else { None }).collect::<Vec<_>>(),
        )),
        DataType::Float64 | DataType::Null => Arc::new(Float64Array::from(
            values.iter().map(numeric).collect::<Vec<_>>(),
        )),
    }
}

/// `table.group_by(by).aggregate(methods)`. `methods` maps an output column
/// name to `(input column, method)`.
pub fn group_by_aggregate(
    table: &Table,
    by: &[String],
    methods: &BTreeMap<String, AggSpec>,
) -> Result<Table, ExecError> {
    let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for row in 0..table.num_rows() {
        let mut key = Vec::with_capacity(by.len());
        for col in by {
            key.push(table.value_at(col, row)?.to_string());
        }
        groups.entry(key).or_default().push(row);
    }

    // Each group's aggregates are independent of every other group, so the
    // per-group reduction runs across threads; only the final transpose into
    // column vectors is sequential.
    let group_rows: Vec<&Vec<usize>> = groups.values().collect();
    let per_group: Result<Vec<(Vec<Value>, Vec<Value>)>, ExecError> = group_rows
        .into_par_iter()
        .map(|rows| {
            let mut by_values = Vec::with_capacity(by.len());
            for col in by {
                by_values.push(table.value_at(col, rows[0])?);
            }
            let mut method_values = Vec::with_capacity(methods.len());
            for spec in methods.values() {
                let values: Vec<Value> =
                    rows.iter().map(|&r| table.value_at(&spec.input, r)).collect::<Result<_, _>>()?;
                method_values.push(aggregate_group(&values, spec.method)?);
            }
            Ok((by_values, method_values))
        })
        .collect();
    let per_group = per_group?;

    let mut by_columns: Vec<Vec<Value>> = vec![Vec::with_capacity(per_group.len()); by.len()];
    let mut method_columns: BTreeMap<String, Vec<Value>> =
        methods.keys().map(|k| (k.clone(), Vec::with_capacity(per_group.len()))).collect();

    for (by_values, method_values) in per_group {
        for (i, v) in by_values.into_iter().enumerate() {
            by_columns[i].push(v);
        }
        for (v, output) in method_values.into_iter().zip(methods.keys()) {
            method_columns.get_mut(output).unwrap().push(v);
        }
    }

    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    for (i, name) in by.iter().enumerate() {
        let dtype = DataType::from(table.column(name)?.data_type());
        let array = column_from_values(&by_columns[i], dtype);
        fields.push(arrow::datatypes::Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }
    for (output, values) in &method_columns {
        let method = methods[output].method;
        let dtype = if matches!(method, AggMethod::Count | AggMethod::DistinctCount) {
            DataType::Int64
        } else {
            DataType::Float64
        };
        let array = column_from_values(values, dtype);
        fields.push(arrow::datatypes::Field::new(output, array.data_type().clone(), true));
        arrays.push(array);
    }

    let schema = Arc::new(arrow::datatypes::Schema::new(fields));
    let batch = RecordBatch::try_new(schema, arrays)?;
    Ok(Table::from_batch(batch))
}
