//! Tabular results returned by Cypher statements.
//!
//! The HTTP transaction endpoint returns rows as JSON arrays ordered by the
//! statement's RETURN columns. `RowSet` keeps that shape and layers typed
//! accessors on top so callers never index into raw JSON.

use magpie_types::error::{GraphError, GraphResult};
use serde::Serialize;
use serde_json::Value;

/// One tabular result: column names plus rows of JSON values.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowSet {
    /// Column names in RETURN order.
    pub columns: Vec<String>,
    /// Row values, one `Vec<Value>` per row, aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create an empty result with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. The caller is responsible for column alignment.
    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows came back.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, column: &str) -> GraphResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| GraphError::Decode(format!("missing column '{column}'")))
    }

    /// Raw value at (row, column).
    pub fn value(&self, row: usize, column: &str) -> GraphResult<&Value> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.get(idx))
            .ok_or_else(|| GraphError::Decode(format!("missing row {row}")))
    }

    /// String value; errors on null or non-string.
    pub fn str_val(&self, row: usize, column: &str) -> GraphResult<String> {
        match self.value(row, column)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(GraphError::Decode(format!(
                "column '{column}' is not a string: {other}"
            ))),
        }
    }

    /// String value, with null mapped to `None`.
    pub fn opt_str_val(&self, row: usize, column: &str) -> GraphResult<Option<String>> {
        match self.value(row, column)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(GraphError::Decode(format!(
                "column '{column}' is not a string: {other}"
            ))),
        }
    }

    /// Integer value.
    pub fn i64_val(&self, row: usize, column: &str) -> GraphResult<i64> {
        self.value(row, column)?
            .as_i64()
            .ok_or_else(|| GraphError::Decode(format!("column '{column}' is not an integer")))
    }

    /// Float value; integers widen.
    pub fn f64_val(&self, row: usize, column: &str) -> GraphResult<f64> {
        self.value(row, column)?
            .as_f64()
            .ok_or_else(|| GraphError::Decode(format!("column '{column}' is not a number")))
    }

    /// Boolean value.
    pub fn bool_val(&self, row: usize, column: &str) -> GraphResult<bool> {
        self.value(row, column)?
            .as_bool()
            .ok_or_else(|| GraphError::Decode(format!("column '{column}' is not a boolean")))
    }

    /// Embedding vector stored as a JSON number array.
    pub fn vec_f32_val(&self, row: usize, column: &str) -> GraphResult<Vec<f32>> {
        let value = self.value(row, column)?;
        let array = value
            .as_array()
            .ok_or_else(|| GraphError::Decode(format!("column '{column}' is not an array")))?;
        array
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    GraphError::Decode(format!("column '{column}' has a non-numeric element"))
                })
            })
            .collect()
    }

    /// First-row integer, for `RETURN count(..) AS name` statements.
    pub fn single_i64(&self, column: &str) -> GraphResult<i64> {
        self.i64_val(0, column)
    }
}
