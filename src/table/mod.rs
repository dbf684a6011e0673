//! The in-memory columnar data model.
//!
//! `Table` is treated as an external type by the rest of the crate (see
//! spec.md §3): the plan graph, optimiser, and executor only ever call the
//! handful of operations listed there — column names, per-column access,
//! projection, row-mask filtering, row count, byte footprint, and `take`.
//! It is backed by an Arrow `RecordBatch` because the teacher this crate
//! grew out of already depends on `arrow`/`parquet` for exactly this
//! purpose (`value::arrow_convert`).

mod value;

pub use value::{DataType, Value};

use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array};
use arrow::compute;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::error::TableError;

/// An ordered list of named, typed columns.
///
/// Column names containing a `.` (e.g. `addr.city`) denote a field nested
/// inside a struct column named by the prefix (`addr`); [`Table::columns`]
/// additionally exposes the struct root so `TableSource`/`DatasetSource`
/// can make it visible without materialising the dotted path.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    pub fn from_batch(batch: RecordBatch) -> Self {
        Table { batch }
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// All column names, plus the root name of any struct column that has
    /// a dotted child (`a.b` exposes `a` too). Matches the Python source's
    /// `self.columns += list(set([c.split('.')[0] for c in self.columns if '.' in c]))`.
    pub fn columns(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let roots: Vec<String> = names
            .iter()
            .filter(|n| n.contains('.'))
            .map(|n| n.split('.').next().unwrap().to_string())
            .collect();
        for r in roots {
            if !names.contains(&r) {
                names.push(r);
            }
        }
        names
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn byte_footprint(&self) -> usize {
        self.batch
            .columns()
            .iter()
            .map(|c| c.get_array_memory_size())
            .sum()
    }

    pub fn column(&self, name: &str) -> Result<&ArrayRef, TableError> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| TableError::ColumnMissing(name.to_string()))
    }

    /// A single scalar at `(column, row)`. Used by join-key extraction and
    /// min/max comparison; not a bulk-access path.
    pub fn value_at(&self, column: &str, row: usize) -> Result<Value, TableError> {
        let array = self.column(column)?;
        Ok(value::scalar_at(array, row))
    }

    pub fn select(&self, columns: &[String]) -> Result<Table, TableError> {
        let indices: Vec<usize> = columns
            .iter()
            .map(|name| {
                self.schema()
                    .index_of(name)
                    .map_err(|_| TableError::ColumnMissing(name.clone()))
            })
            .collect::<Result<_, _>>()?;
        let fields: Vec<Field> = indices
            .iter()
            .map(|&i| self.schema().field(i).clone())
            .collect();
        let arrays: Vec<ArrayRef> = indices.iter().map(|&i| self.batch.column(i).clone()).collect();
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema, arrays)?;
        Ok(Table::from_batch(batch))
    }

    pub fn filter_mask(&self, mask: &BooleanArray) -> Result<Table, TableError> {
        let filtered = arrow::compute::filter_record_batch(&self.batch, mask)?;
        Ok(Table::from_batch(filtered))
    }

    pub fn take(&self, indices: &UInt32Array) -> Result<Table, TableError> {
        let columns = self
            .batch
            .columns()
            .iter()
            .map(|c| compute::take(c.as_ref(), indices, None))
            .collect::<Result<Vec<_>, _>>()?;
        let batch = RecordBatch::try_new(self.schema(), columns)?;
        Ok(Table::from_batch(batch))
    }

    pub fn append_column(&self, name: &str, array: ArrayRef) -> Result<Table, TableError> {
        let mut fields: Vec<Field> = self.schema().fields().iter().map(|f| (**f).clone()).collect();
        fields.push(Field::new(name, array.data_type().clone(), array.is_nullable()));
        let mut columns: Vec<ArrayRef> = self.batch.columns().to_vec();
        columns.push(array);
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema, columns)?;
        Ok(Table::from_batch(batch))
    }

    pub fn replace_column(&self, name: &str, array: ArrayRef) -> Result<Table, TableError> {
        let idx = self
            .schema()
            .index_of(name)
            .map_err(|_| TableError::ColumnMissing(name.to_string()))?;
        let mut columns: Vec<ArrayRef> = self.batch.columns().to_vec();
        columns[idx] = array;
        let batch = RecordBatch::try_new(self.schema(), columns)?;
        Ok(Table::from_batch(batch))
    }

    pub fn drop_columns(&self, names: &[String]) -> Result<Table, TableError> {
        let keep: Vec<String> = self
            .columns()
            .into_iter()
            .filter(|c| !names.contains(c) && self.schema().index_of(c).is_ok())
            .collect();
        self.select(&keep)
    }

    pub fn rename_columns(&self, mapping: &std::collections::HashMap<String, String>) -> Table {
        let fields: Vec<Field> = self
            .schema()
            .fields()
            .iter()
            .map(|f| {
                let new_name = mapping.get(f.name()).cloned().unwrap_or_else(|| f.name().clone());
                Field::new(new_name, f.data_type().clone(), f.is_nullable())
            })
            .collect();
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema, self.batch.columns().to_vec())
            .expect("renaming columns preserves arity and types");
        Table::from_batch(batch)
    }

    pub fn concat(tables: &[Table]) -> Result<Table, TableError> {
        if tables.is_empty() {
            return Err(TableError::SchemaMismatch);
        }
        let schema = tables[0].schema();
        let batches: Vec<&RecordBatch> = tables.iter().map(|t| &t.batch).collect();
        let batch = arrow::compute::concat_batches(&schema, batches)?;
        Ok(Table::from_batch(batch))
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Build a joined table: every column of `left` taken at `left_idx`,
    /// plus `right_columns` of `right` taken at `right_idx`. A `right`
    /// column whose name collides with one already in `left` is suffixed
    /// `_right` — the kernel contract leaves disambiguation
    /// implementation-defined (spec.md §4.2).
    pub fn join_combine(
        left: &Table,
        left_idx: &UInt32Array,
        right: &Table,
        right_idx: &UInt32Array,
        right_columns: &[String],
    ) -> Result<Table, TableError> {
        let mut fields: Vec<Field> = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for field in left.schema().fields() {
            let array = compute::take(left.column(field.name())?.as_ref(), left_idx, None)?;
            fields.push(Field::new(field.name(), array.data_type().clone(), true));
            columns.push(array);
        }

        let left_names: std::collections::HashSet<String> =
            left.schema().fields().iter().map(|f| f.name().clone()).collect();

        for name in right_columns {
            let array = compute::take(right.column(name)?.as_ref(), right_idx, None)?;
            let out_name = if left_names.contains(name) { format!("{name}_right") } else { name.clone() };
            fields.push(Field::new(&out_name, array.data_type().clone(), true));
            columns.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema, columns)?;
        Ok(Table::from_batch(batch))
    }
}
