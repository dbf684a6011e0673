//! Inner equi-join kernel with redundant-key elimination (spec.md §4.2,
//! §4.4; grounded on `JoinNode.fetch`/`column_min_max` in
//! `original_source/wombat_db/engine/nodes.py`).

use std::collections::HashMap;

use arrow::array::UInt32Array;
use rayon::prelude::*;

use crate::error::ExecError;
use crate::table::{Table, Value};

fn column_min_max(table: &Table, column: &str) -> Result<(Value, Value), ExecError> {
    let n = table.num_rows();
    if n == 0 {
        return Ok((Value::Null, Value::Null));
    }
    let mut min = table.value_at(column, 0)?;
    let mut max = min.clone();
    for row in 1..n {
        let v = table.value_at(column, row)?;
        if let Some(std::cmp::Ordering::Less) = v.partial_cmp_value(&min) {
            min = v.clone();
        }
        if let Some(std::cmp::Ordering::Greater) = v.partial_cmp_value(&max) {
            max = v.clone();
        }
    }
    Ok((min, max))
}

/// For each candidate key: if both sides carry exactly one, identical
/// value, it contributes nothing to the join condition and is dropped.
fn redundant_keys(left: &Table, right: &Table, on: &[String]) -> Result<Vec<String>, ExecError> {
    let mut effective = Vec::new();
    for key in on {
        let (l_min, l_max) = column_min_max(left, key)?;
        let (r_min, r_max) = column_min_max(right, key)?;
        let single_valued = l_min == l_max && r_min == r_max;
        let identical = l_min == r_min;
        if single_valued && identical {
            continue;
        }
        effective.push(key.clone());
    }
    Ok(effective)
}

fn key_signature(table: &Table, keys: &[String], row: usize) -> Result<String, ExecError> {
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        parts.push(table.value_at(key, row)?.to_string());
    }
    Ok(parts.join("\u{1f}"))
}

/// Materialise the inner equi-join of `left` and `right` on `on`, dropping
/// any key both sides carry a single identical value for. An empty
/// effective key list degenerates to the full cross product (correct,
/// since with no discriminating key every row pair already "matches").
pub fn equi_join(left: &Table, right: &Table, on: &[String]) -> Result<Table, ExecError> {
    let keys = redundant_keys(left, right, on)?;

    let mut left_idx = Vec::new();
    let mut right_idx = Vec::new();

    if keys.is_empty() {
        for l in 0..left.num_rows() {
            for r in 0..right.num_rows() {
                left_idx.push(l as u32);
                right_idx.push(r as u32);
            }
        }
    } else {
        let mut right_index: HashMap<String, Vec<u32>> = HashMap::new();
        for r in 0..right.num_rows() {
            let sig = key_signature(right, &keys, r)?;
            right_index.entry(sig).or_default().push(r as u32);
        }

        // Probing is independent per left row, so the signature lookup is
        // free to run across threads; the per-row match lists are joined
        // back into a single pair of index vectors afterward.
        let matches: Result<Vec<Vec<(u32, u32)>>, ExecError> = (0..left.num_rows())
            .into_par_iter()
            .map(|l| {
                let sig = key_signature(left, &keys, l)?;
                Ok(right_index.get(&sig).map_or_else(Vec::new, |rows| {
                    rows.iter().map(|&r| (l as u32, r)).collect()
                }))
            })
            .collect();
        for (l, r) in matches?.into_iter().flatten() {
            left_idx.push(l);
            right_idx.push(r);
        }
    }

    let left_idx = UInt32Array::from(left_idx);
    let right_idx = UInt32Array::from(right_idx);

    let right_columns: Vec<String> = right
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| !keys.contains(name) || !left_columns_contains(left, name))
        .collect();

    Ok(Table::join_combine(left, &left_idx, right, &right_idx, &right_columns)?)
}

fn left_columns_contains(left: &Table, name: &str) -> bool {
    left.schema().index_of(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn table(cols: Vec<(&str, Vec<i64>)>) -> Table {
        let arrays: Vec<(&str, ArrayRef)> =
            cols.into_iter().map(|(name, values)| (name, Arc::new(Int64Array::from(values)) as ArrayRef)).collect();
        Table::from_batch(RecordBatch::try_from_iter(arrays).unwrap())
    }

    #[test]
    fn drops_single_valued_identical_key() {
        let a = table(vec![("org", vec![0, 0, 0]), ("k", vec![1, 2, 3]), ("v", vec![10, 20, 30])]);
        let b = table(vec![("org", vec![0, 0, 0, 0]), ("k", vec![1, 2, 3, 4]), ("w", vec![100, 200, 300, 400])]);

        let joined = equi_join(&a, &b, &["org".to_string(), "k".to_string()]).unwrap();
        assert_eq!(joined.num_rows(), 3);
    }

    #[test]
    fn keeps_key_when_values_differ() {
        let a = table(vec![("k", vec![1, 2])]);
        let b = table(vec![("k", vec![1, 1])]);
        let joined = equi_join(&a, &b, &["k".to_string()]).unwrap();
        assert_eq!(joined.num_rows(), 1);
    }
}
