use crate::error::SqlMapperError;
use crate::executor::BatchResult;
use crate::results::{CustomDbRow, FromRow, KeyedRows};
use crate::types::RowValues;

/// Result of one mapper call, shaped by the method's declared return type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MapperValue {
    #[default]
    Null,
    Int(i32),
    Long(i64),
    Bool(bool),
    /// Single column value for `Double`/`Text` returns.
    Scalar(RowValues),
    Row(CustomDbRow),
    List(Vec<CustomDbRow>),
    Array(Box<[CustomDbRow]>),
    Map(KeyedRows),
    BatchResults(Vec<BatchResult>),
}

impl MapperValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, MapperValue::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            MapperValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            MapperValue::Long(v) => Some(*v),
            MapperValue::Int(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MapperValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&RowValues> {
        match self {
            MapperValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_row(self) -> Option<CustomDbRow> {
        match self {
            MapperValue::Row(row) => Some(row),
            _ => None,
        }
    }

    /// Rows of a `List` or `Array` result; a null result is an empty list.
    ///
    /// # Errors
    /// Returns `SqlMapperError::BindingError` for any other shape.
    pub fn into_list(self) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        match self {
            MapperValue::List(rows) => Ok(rows),
            MapperValue::Array(rows) => Ok(rows.into_vec()),
            MapperValue::Null => Ok(Vec::new()),
            other => Err(shape_error("a list", &other)),
        }
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` unless the value is a keyed map.
    pub fn into_map(self) -> Result<KeyedRows, SqlMapperError> {
        match self {
            MapperValue::Map(map) => Ok(map),
            other => Err(shape_error("a keyed map", &other)),
        }
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` unless the value holds batch results.
    pub fn into_batch_results(self) -> Result<Vec<BatchResult>, SqlMapperError> {
        match self {
            MapperValue::BatchResults(results) => Ok(results),
            other => Err(shape_error("batch results", &other)),
        }
    }

    /// Convert a single-row result; `None` when the call returned nothing.
    ///
    /// # Errors
    /// Propagates conversion errors and rejects non-row shapes.
    pub fn into_typed<T: FromRow>(self) -> Result<Option<T>, SqlMapperError> {
        match self {
            MapperValue::Null => Ok(None),
            MapperValue::Row(row) => T::from_row(&row).map(Some),
            other => Err(shape_error("a row", &other)),
        }
    }

    /// # Errors
    /// Propagates conversion errors and rejects non-list shapes.
    pub fn into_typed_list<T: FromRow>(self) -> Result<Vec<T>, SqlMapperError> {
        self.into_list()?.iter().map(T::from_row).collect()
    }

    fn kind(&self) -> &'static str {
        match self {
            MapperValue::Null => "null",
            MapperValue::Int(_) => "i32",
            MapperValue::Long(_) => "i64",
            MapperValue::Bool(_) => "bool",
            MapperValue::Scalar(_) => "scalar",
            MapperValue::Row(_) => "row",
            MapperValue::List(_) => "list",
            MapperValue::Array(_) => "array",
            MapperValue::Map(_) => "map",
            MapperValue::BatchResults(_) => "batch results",
        }
    }
}

fn shape_error(expected: &str, actual: &MapperValue) -> SqlMapperError {
    SqlMapperError::BindingError(format!(
        "Expected {expected} but the mapper call returned {}",
        actual.kind()
    ))
}
