//! `RecordBatch`/`RowProxy`: schema-carrying row/column views over a set of
//! named columns, with coercing builders from rows, columns, or per-column
//! arrays.
//!
//! Grounded on [`crate::block::Block`]'s column storage (same named-column
//! vector, same same-row-count invariant enforced on append) plus
//! [`crate::column::column_value`]'s `get_value`/`append_value` for the
//! per-cell materialization and coercion `RecordBatch`'s builders need that
//! `Block` itself never required.

use crate::column::column_value::{
    append_value,
    get_value,
};
use crate::column::ColumnRef;
use crate::io::block_stream::create_column;
use crate::types::Type;
use crate::value::Value;
use crate::{
    Error,
    Result,
};
use std::sync::Arc;

#[derive(Clone)]
struct NamedColumn {
    name: String,
    column: ColumnRef,
}

/// A set of named, same-length columns, with coercing constructors from
/// rows or per-column value arrays in addition to the direct
/// already-typed-column path.
#[derive(Clone)]
pub struct RecordBatch {
    columns: Vec<NamedColumn>,
    rows: usize,
}

impl RecordBatch {
    /// Build a batch directly from already-constructed, same-length
    /// columns. Fails if any two columns disagree on row count.
    pub fn from_columns(columns: Vec<(String, ColumnRef)>) -> Result<Self> {
        let rows = columns.first().map(|(_, c)| c.size()).unwrap_or(0);
        for (name, column) in &columns {
            if column.size() != rows {
                return Err(Error::Validation(format!(
                    "all columns in a RecordBatch must have the same row count; '{}' has {}, expected {}",
                    name,
                    column.size(),
                    rows
                )));
            }
        }
        Ok(Self {
            columns: columns
                .into_iter()
                .map(|(name, column)| NamedColumn { name, column })
                .collect(),
            rows,
        })
    }

    /// Build a batch by coercing each named `Value` array into a freshly
    /// built column of `schema`'s declared type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Coercion`] for any value that can't be represented
    /// in its column's declared type (wrong shape, or out of range), naming
    /// the offending column and row.
    pub fn from_arrays(
        schema: Vec<(String, Type)>,
        arrays: Vec<(String, Vec<Value>)>,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(schema.len());
        for (name, type_) in schema {
            let values = arrays
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v)
                .ok_or_else(|| {
                    Error::Validation(format!("no array provided for column '{}'", name))
                })?;

            let mut column = create_column(&type_)?;
            {
                let col_mut = Arc::get_mut(&mut column)
                    .expect("freshly created column is uniquely owned");
                for (row, value) in values.iter().enumerate() {
                    append_value(col_mut, value).map_err(|e| annotate(e, &name, row))?;
                }
            }
            columns.push((name, column));
        }
        Self::from_columns(columns)
    }

    /// Build a batch by coercing row-major `Value` tuples against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a row doesn't have exactly
    /// `schema.len()` values, or [`Error::Coercion`] if a value doesn't fit
    /// its column's declared type.
    pub fn from_rows(schema: Vec<(String, Type)>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<ColumnRef> = schema
            .iter()
            .map(|(_, type_)| create_column(type_))
            .collect::<Result<Vec<_>>>()?;

        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(Error::Validation(format!(
                    "row {} has {} values, expected {} (schema width)",
                    row_index,
                    row.len(),
                    schema.len()
                )));
            }
            for (col_index, value) in row.iter().enumerate() {
                let col_mut = Arc::get_mut(&mut columns[col_index])
                    .expect("freshly created column is uniquely owned");
                append_value(col_mut, value)
                    .map_err(|e| annotate(e, &schema[col_index].0, row_index))?;
            }
        }

        Self::from_columns(
            schema.into_iter().map(|(name, _)| name).zip(columns).collect(),
        )
    }

    /// Number of columns in this batch.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows in this batch.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// `true` if this batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names, in declared order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The column at `index`, if any.
    pub fn column(&self, index: usize) -> Option<ColumnRef> {
        self.columns.get(index).map(|c| c.column.clone())
    }

    /// The column named `name`, if any.
    pub fn column_by_name(&self, name: &str) -> Option<ColumnRef> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.column.clone())
    }

    /// A row-oriented view of row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.row_count()`, matching
    /// [`crate::column::Column::slice`]'s bounds-checking convention of
    /// raising on the column side rather than returning `Option` for what
    /// is, for an in-bounds batch, always a programmer error.
    pub fn row(&self, index: usize) -> RowProxy<'_> {
        assert!(index < self.rows, "row index {} out of bounds ({})", index, self.rows);
        RowProxy { batch: self, index }
    }

    /// Iterate over every row in the batch, in order.
    pub fn rows(&self) -> impl Iterator<Item = RowProxy<'_>> {
        (0..self.rows).map(move |i| self.row(i))
    }
}

fn annotate(err: Error, column: &str, row: usize) -> Error {
    match err {
        Error::Coercion { column: None, row: _, type_name, value } => {
            Error::Coercion { column: Some(column.to_string()), row, type_name, value }
        }
        other => other,
    }
}

/// A single row of a [`RecordBatch`], addressable by column index or name.
#[derive(Clone, Copy)]
pub struct RowProxy<'a> {
    batch: &'a RecordBatch,
    index: usize,
}

impl<'a> RowProxy<'a> {
    /// The row's position within its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The value at `column_index`.
    ///
    /// # Panics
    ///
    /// Panics if `column_index` is out of bounds.
    pub fn get(&self, column_index: usize) -> Result<Value> {
        let column = &self.batch.columns[column_index].column;
        get_value(column.as_ref(), self.index)
    }

    /// The value in the column named `name`, if that column exists.
    pub fn get_by_name(&self, name: &str) -> Option<Result<Value>> {
        self.batch
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| get_value(c.column.as_ref(), self.index))
    }

    /// Materialize the full row as a `(column name, value)` list, in
    /// declared column order.
    pub fn values(&self) -> Result<Vec<(String, Value)>> {
        self.batch
            .columns
            .iter()
            .map(|c| Ok((c.name.clone(), get_value(c.column.as_ref(), self.index)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::numeric::ColumnUInt64;
    use crate::types::Type;

    #[test]
    fn from_columns_tracks_row_count() {
        let mut col = ColumnUInt64::new();
        col.append(1);
        col.append(2);
        let batch =
            RecordBatch::from_columns(vec![("id".to_string(), Arc::new(col))]).unwrap();
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.column_count(), 1);
    }

    #[test]
    fn from_columns_rejects_mismatched_row_counts() {
        let mut a = ColumnUInt64::new();
        a.append(1);
        let mut b = ColumnUInt64::new();
        b.append(1);
        b.append(2);
        let err = RecordBatch::from_columns(vec![
            ("a".to_string(), Arc::new(a)),
            ("b".to_string(), Arc::new(b)),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn from_rows_coerces_and_builds_row_proxies() {
        let schema = vec![
            ("id".to_string(), Type::uint32()),
            ("name".to_string(), Type::string()),
        ];
        let rows = vec![
            vec![Value::Int32(1), Value::String("a".to_string())],
            vec![Value::Int32(2), Value::String("b".to_string())],
        ];
        let batch = RecordBatch::from_rows(schema, rows).unwrap();
        assert_eq!(batch.row_count(), 2);

        let row0 = batch.row(0);
        assert_eq!(row0.get(0).unwrap(), Value::UInt32(1));
        assert_eq!(row0.get(1).unwrap(), Value::String("a".to_string()));

        let names: Vec<String> = batch.rows().map(|r| format!("{:?}", r.values().unwrap())).collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn from_rows_reports_coercion_with_column_and_row() {
        let schema = vec![("small".to_string(), Type::uint8())];
        let rows = vec![vec![Value::Int32(300)]];
        let err = RecordBatch::from_rows(schema, rows).unwrap_err();
        match err {
            Error::Coercion { column, row, .. } => {
                assert_eq!(column.as_deref(), Some("small"));
                assert_eq!(row, 0);
            }
            other => panic!("expected Error::Coercion, got {:?}", other),
        }
    }

    #[test]
    fn from_rows_rejects_wrong_row_width() {
        let schema = vec![("id".to_string(), Type::uint32())];
        let rows = vec![vec![Value::UInt32(1), Value::UInt32(2)]];
        let err = RecordBatch::from_rows(schema, rows).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
