use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SqlMapperError;
use crate::types::RowValues;

/// A row from a database query result
///
/// Column names and the name-to-index lookup are shared by every row of one result set,
/// so cloning a row only copies its values.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a new database row, building the column lookup for it.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            rows,
            column_index_cache: cache,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        rows: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            rows,
            column_index_cache,
        }
    }

    /// Get the index of a column by name. Falls back to a case-insensitive match, since
    /// drivers disagree on the case they report column labels in.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    /// Get a value by column name, failing with a message naming the missing column.
    ///
    /// # Errors
    /// Returns `SqlMapperError::ExecutionError` if the row has no such column.
    pub fn try_get(&self, column_name: &str) -> Result<&RowValues, SqlMapperError> {
        self.get(column_name).ok_or_else(|| {
            SqlMapperError::ExecutionError(format!(
                "column '{column_name}' not found; available columns are {:?}",
                self.column_names
            ))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

/// Conversion from a result row into a caller-defined type.
///
/// ```rust
/// use sql_mapper::prelude::*;
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &CustomDbRow) -> Result<Self, SqlMapperError> {
///         Ok(User {
///             id: *row.try_get("id")?.as_int().unwrap_or(&0),
///             name: row.try_get("name")?.as_text().unwrap_or_default().to_string(),
///         })
///     }
/// }
/// # let _ = User { id: 1, name: String::new() };
/// ```
pub trait FromRow: Sized {
    /// # Errors
    /// Returns `SqlMapperError` if the row cannot be converted.
    fn from_row(row: &CustomDbRow) -> Result<Self, SqlMapperError>;
}

impl FromRow for CustomDbRow {
    fn from_row(row: &CustomDbRow) -> Result<Self, SqlMapperError> {
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> CustomDbRow {
        CustomDbRow::new(
            Arc::new(vec!["ID".to_string(), "name".to_string()]),
            vec![RowValues::Int(7), RowValues::Text("ada".into())],
        )
    }

    #[test]
    fn lookup_is_case_insensitive_fallback() {
        let row = row();
        assert_eq!(row.get("ID"), Some(&RowValues::Int(7)));
        assert_eq!(row.get("id"), Some(&RowValues::Int(7)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn try_get_names_the_missing_column() {
        let err = row().try_get("age").unwrap_err();
        assert!(err.to_string().contains("'age'"));
    }
}
