//! The `Dataset`/`Piece` trait boundary consumed by `DatasetSource`
//! (spec.md §1, §3: an external collaborator — file reading is out of
//! scope for the core). A dataset is a lazy view over files partitioned by
//! directory-encoded key columns.

use crate::error::TableError;
use crate::plan::Predicate;
use crate::table::Table;

/// One physical piece of a dataset: a single partition directory/file with
/// a fixed, known partition-value mapping and non-partition schema.
pub trait Piece: Send + Sync {
    /// The value of each partition key for this piece, as the raw string
    /// encoded in its directory name (spec.md §4.2: partition values are
    /// cast to the predicate's type at filter time, not stored pre-typed).
    fn partition_values(&self) -> &std::collections::HashMap<String, String>;

    /// Column names available in this piece, excluding partition keys.
    fn schema_columns(&self) -> &[String];

    /// Read the requested non-partition columns, already filtered by any
    /// value predicates the caller chooses to pass (value filters are
    /// applied by the core after concatenation per spec.md §4.4, so most
    /// callers pass an empty slice here and let the source apply them).
    fn read(&self, columns: &[String]) -> Result<Table, TableError>;
}

/// A partitioned on-disk table (spec.md GLOSSARY). Partition keys must be
/// discoverable before any file is opened.
pub trait Dataset: Send + Sync {
    fn partition_keys(&self) -> &[String];
    fn pieces(&self) -> &[Box<dyn Piece>];

    /// Non-partition schema, assumed uniform across pieces (mirrors the
    /// source reading `pieces[0]`'s metadata to stand in for the whole set).
    fn schema_columns(&self) -> &[String] {
        self.pieces().first().map_or(&[], |p| p.schema_columns())
    }
}

/// Whether a piece's partition values satisfy every partition predicate.
pub fn partition_matches(piece: &dyn Piece, partition_filters: &[Predicate]) -> Result<bool, crate::error::PlanError> {
    use crate::plan::{FilterOp, FilterValue};
    use crate::table::Value;

    for predicate in partition_filters {
        let raw = piece.partition_values().get(&predicate.column).ok_or_else(|| {
            crate::error::PlanError::ColumnMissing(predicate.column.clone())
        })?;

        let matches = match (&predicate.op, &predicate.value) {
            (FilterOp::In, FilterValue::Set(values)) => {
                let mut any = false;
                for v in values {
                    let cast = v.cast_partition_str(raw).map_err(|reason| {
                        crate::error::PlanError::PartitionCastError { value: raw.clone(), reason }
                    })?;
                    if &cast == v {
                        any = true;
                        break;
                    }
                }
                any
            }
            (FilterOp::NotIn, FilterValue::Set(values)) => {
                let mut any = false;
                for v in values {
                    let cast = v.cast_partition_str(raw).map_err(|reason| {
                        crate::error::PlanError::PartitionCastError { value: raw.clone(), reason }
                    })?;
                    if &cast == v {
                        any = true;
                        break;
                    }
                }
                !any
            }
            (op, FilterValue::Scalar(v)) => {
                let cast = v
                    .cast_partition_str(raw)
                    .map_err(|reason| crate::error::PlanError::PartitionCastError { value: raw.clone(), reason })?;
                let ord = cast.partial_cmp_value(v);
                match op {
                    FilterOp::Eq => ord == Some(std::cmp::Ordering::Equal),
                    FilterOp::Ne => ord != Some(std::cmp::Ordering::Equal),
                    FilterOp::Lt => ord == Some(std::cmp::Ordering::Less),
                    FilterOp::Le => matches!(ord, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
                    FilterOp::Gt => ord == Some(std::cmp::Ordering::Greater),
                    FilterOp::Ge => matches!(ord, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
                    FilterOp::In | FilterOp::NotIn => {
                        return Err(crate::error::PlanError::UnsupportedOp(op.to_string()))
                    }
                }
            }
            _ => return Err(crate::error::PlanError::UnsupportedOp(predicate.op.to_string())),
        };

        if !matches {
            return Ok(false);
        }
    }
    Ok(true)
}

/// An in-memory `Dataset`/`Piece` test double, used by integration tests in
/// place of real file I/O (spec.md §3's `Dataset` is an external type; this
/// is the in-workspace stand-in SPEC_FULL.md's ambient test tooling calls
/// for).
pub mod memory {
    use super::{Dataset, Piece};
    use crate::error::TableError;
    use crate::table::Table;
    use std::collections::HashMap;

    pub struct MemoryPiece {
        pub partition_values: HashMap<String, String>,
        pub schema_columns: Vec<String>,
        pub table: Table,
    }

    impl Piece for MemoryPiece {
        fn partition_values(&self) -> &HashMap<String, String> {
            &self.partition_values
        }

        fn schema_columns(&self) -> &[String] {
            &self.schema_columns
        }

        fn read(&self, columns: &[String]) -> Result<Table, TableError> {
            let names: Vec<String> = if columns.is_empty() { self.schema_columns.clone() } else { columns.to_vec() };
            self.table.select(&names)
        }
    }

    pub struct MemoryDataset {
        pub partition_keys: Vec<String>,
        pub pieces: Vec<Box<dyn Piece>>,
    }

    impl Dataset for MemoryDataset {
        fn partition_keys(&self) -> &[String] {
            &self.partition_keys
        }

        fn pieces(&self) -> &[Box<dyn Piece>] {
            &self.pieces
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{MemoryDataset, MemoryPiece};
    use super::*;
    use crate::plan::{FilterOp, FilterValue};
    use crate::table::Value;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::record_batch::RecordBatch;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn piece(p_value: &str, v: i64) -> MemoryPiece {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![v]));
        let batch = RecordBatch::try_from_iter(vec![("v", array)]).unwrap();
        MemoryPiece {
            partition_values: HashMap::from([("p".to_string(), p_value.to_string())]),
            schema_columns: vec!["v".to_string()],
            table: Table::from_batch(batch),
        }
    }

    #[test]
    fn partition_predicate_casts_string_to_literal_type() {
        let p = piece("1", 10);
        let pred = Predicate::eq("p", 1i64);
        assert!(partition_matches(&p, std::slice::from_ref(&pred)).unwrap());

        let pred_ne = Predicate::eq("p", 2i64);
        assert!(!partition_matches(&p, std::slice::from_ref(&pred_ne)).unwrap());
    }

    #[test]
    fn dataset_exposes_partition_keys_and_pieces() {
        let ds = MemoryDataset { partition_keys: vec!["p".to_string()], pieces: vec![Box::new(piece("0", 1))] };
        assert_eq!(ds.partition_keys(), &["p".to_string()]);
        assert_eq!(ds.pieces().len(), 1);
    }

    #[test]
    fn in_predicate_matches_against_set() {
        let p = piece("2", 10);
        let pred = Predicate::new("p", FilterOp::In, FilterValue::Set(vec![Value::Int64(1), Value::Int64(2)]));
        assert!(partition_matches(&p, std::slice::from_ref(&pred)).unwrap());
    }
}
