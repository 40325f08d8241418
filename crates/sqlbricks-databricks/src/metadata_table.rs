//! In-memory metadata tables
//!
//! Metadata results come back from the driver as Arrow batches. The indexer
//! only needs a handful of columns from them, sorted and filtered by
//! equality, so they are copied into a small row-oriented table of typed
//! cells first.

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_schema::DataType;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Errors while reading a metadata batch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata result has no column named {0}")]
    MissingColumn(String),

    #[error("Metadata column {column} has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: String },
}

/// A single metadata value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cell {
    Null,
    Int(i64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// String form of the value; NULL renders as an empty string
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Null => Cow::Borrowed(""),
            Self::Int(i) => Cow::Owned(i.to_string()),
            Self::Text(s) => Cow::Borrowed(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Rows of typed cells under named columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl MetadataTable {
    pub fn new(columns: &[&str], rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    /// Copy the `wanted` columns out of a batch
    ///
    /// Column lookup is case-insensitive, since drivers disagree on the case
    /// of information-schema column names.
    pub fn from_batch(batch: &RecordBatch, wanted: &[&str]) -> Result<Self, MetadataError> {
        let schema = batch.schema();
        let mut arrays = Vec::with_capacity(wanted.len());

        for name in wanted {
            let index = schema
                .fields()
                .iter()
                .position(|f| f.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| MetadataError::MissingColumn(name.to_string()))?;
            arrays.push((name, batch.column(index)));
        }

        let mut rows = vec![Vec::with_capacity(wanted.len()); batch.num_rows()];
        for (name, array) in arrays {
            for (row, cell) in rows.iter_mut().zip(read_cells(name, array)?) {
                row.push(cell);
            }
        }

        Ok(Self::new(wanted, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn index_of(&self, column: &str) -> Result<usize, MetadataError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| MetadataError::MissingColumn(column.to_string()))
    }

    fn indices_of(&self, columns: &[&str]) -> Result<Vec<usize>, MetadataError> {
        columns.iter().map(|c| self.index_of(c)).collect()
    }

    /// Stable ascending sort on the given keys, first key most significant
    pub fn sort_by(mut self, keys: &[&str]) -> Result<Self, MetadataError> {
        let indices = self.indices_of(keys)?;
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| a[i].cmp(&b[i]))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(self)
    }

    /// Rows where every `(column, value)` condition holds, in original order
    pub fn filter_eq(&self, conditions: &[(&str, &Cell)]) -> Result<Self, MetadataError> {
        let mut checks = Vec::with_capacity(conditions.len());
        for (column, value) in conditions {
            checks.push((self.index_of(column)?, *value));
        }

        let rows = self
            .rows
            .iter()
            .filter(|row| checks.iter().all(|(i, value)| &row[*i] == *value))
            .cloned()
            .collect();

        Ok(Self {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Partition rows by the values of the key columns
    ///
    /// Row order inside each group is preserved.
    pub fn group_by(&self, keys: &[&str]) -> Result<BTreeMap<Vec<Cell>, Self>, MetadataError> {
        let indices = self.indices_of(keys)?;
        let mut groups: BTreeMap<Vec<Cell>, Self> = BTreeMap::new();

        for row in &self.rows {
            let key = indices.iter().map(|&i| row[i].clone()).collect();
            groups
                .entry(key)
                .or_insert_with(|| Self {
                    columns: self.columns.clone(),
                    rows: Vec::new(),
                })
                .rows
                .push(row.clone());
        }

        Ok(groups)
    }

    /// Values of one column, in row order
    pub fn column(&self, name: &str) -> Result<Vec<&Cell>, MetadataError> {
        let index = self.index_of(name)?;
        Ok(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// Distinct values of one column in first-appearance order
    pub fn unique(&self, name: &str) -> Result<Vec<Cell>, MetadataError> {
        let mut seen = HashSet::new();
        Ok(self
            .column(name)?
            .into_iter()
            .filter(|cell| seen.insert(*cell))
            .cloned()
            .collect())
    }
}

fn read_cells(column: &str, array: &ArrayRef) -> Result<Vec<Cell>, MetadataError> {
    macro_rules! ints {
        ($ty:ty) => {{
            let values = array.as_primitive::<$ty>();
            (0..array.len())
                .map(|i| {
                    if values.is_null(i) {
                        Cell::Null
                    } else {
                        Cell::Int(values.value(i) as i64)
                    }
                })
                .collect()
        }};
    }

    let cells = match array.data_type() {
        DataType::Null => vec![Cell::Null; array.len()],
        DataType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map_or(Cell::Null, Cell::from))
            .collect(),
        DataType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| v.map_or(Cell::Null, Cell::from))
            .collect(),
        DataType::Utf8View => array
            .as_string_view()
            .iter()
            .map(|v| v.map_or(Cell::Null, Cell::from))
            .collect(),
        DataType::Int8 => ints!(Int8Type),
        DataType::Int16 => ints!(Int16Type),
        DataType::Int32 => ints!(Int32Type),
        DataType::Int64 => ints!(Int64Type),
        DataType::UInt8 => ints!(UInt8Type),
        DataType::UInt16 => ints!(UInt16Type),
        DataType::UInt32 => ints!(UInt32Type),
        DataType::UInt64 => ints!(UInt64Type),
        other => {
            return Err(MetadataError::UnsupportedType {
                column: column.to_string(),
                data_type: other.to_string(),
            })
        }
    };

    Ok(cells)
}
