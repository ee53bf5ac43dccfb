//! In-memory tabular dataset.
//!
//! Cells are kept as raw strings (`None` for empty cells) together with a
//! declared column type, mirroring what a dataframe loader would hand over.
//! Interpretation (dates, numbers) happens downstream in `prepare`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Text,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub cells: Vec<Option<String>>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType, cells: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            dtype,
            cells,
        }
    }

    /// Build a column and infer its type from the cells.
    ///
    /// `Int` if every non-empty cell parses as `i64`, `Float` if every
    /// non-empty cell parses as `f64`, `Text` otherwise (including a column
    /// with no values at all).
    pub fn infer(name: impl Into<String>, cells: Vec<Option<String>>) -> Self {
        let dtype = infer_type(&cells);
        Self::new(name, dtype, cells)
    }

    /// Text column from string slices; empty strings become missing cells.
    pub fn text<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        let cells = values.iter().map(|v| non_empty(v.as_ref())).collect();
        Self::new(name, ColumnType::Text, cells)
    }

    /// Float column from values.
    pub fn float(name: impl Into<String>, values: &[f64]) -> Self {
        let cells = values.iter().map(|v| Some(v.to_string())).collect();
        Self::new(name, ColumnType::Float, cells)
    }

    /// Integer column from values.
    pub fn int(name: impl Into<String>, values: &[i64]) -> Self {
        let cells = values.iter().map(|v| Some(v.to_string())).collect();
        Self::new(name, ColumnType::Int, cells)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        self.cells.get(row).and_then(|c| c.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("column `{column}` has {got} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        got: usize,
    },
    #[error("duplicate column name `{0}`")]
    DuplicateColumn(String),
}

/// Rows × named columns, columns kept in their natural order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            for col in &columns {
                if col.len() != expected {
                    return Err(TableError::RaggedColumn {
                        column: col.name.clone(),
                        expected,
                        got: col.len(),
                    });
                }
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn infer_type(cells: &[Option<String>]) -> ColumnType {
    let mut values = cells.iter().flatten().peekable();
    if values.peek().is_none() {
        return ColumnType::Text;
    }
    let values: Vec<&String> = values.collect();
    if values.iter().all(|v| v.parse::<i64>().is_ok()) {
        ColumnType::Int
    } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    #[test]
    fn infers_column_types() {
        assert_eq!(Column::infer("a", cells(&["1", "2", ""])).dtype, ColumnType::Int);
        assert_eq!(Column::infer("b", cells(&["1", "2.5"])).dtype, ColumnType::Float);
        assert_eq!(Column::infer("c", cells(&["1", "x"])).dtype, ColumnType::Text);
        assert_eq!(Column::infer("d", cells(&["", ""])).dtype, ColumnType::Text);
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Dataset::new(vec![
            Column::float("a", &[1.0, 2.0]),
            Column::float("b", &[1.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::RaggedColumn { got: 1, .. }));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Dataset::new(vec![Column::float("a", &[1.0]), Column::int("a", &[1])]).unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".to_string()));
    }
}
