use std::collections::BTreeMap;

use crate::error::SqlMapperError;
use crate::types::RowValues;

use super::property::PropertyTokenizer;

/// A parameter object handed to a statement.
///
/// `Record` stands in for a structured argument (a user, an order) whose properties are
/// addressed by name; `Map` is the strict name-to-value mapping built when a mapper call
/// has several arguments or named ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParamValue {
    #[default]
    Null,
    Value(RowValues),
    Record(BTreeMap<String, ParamValue>),
    List(Vec<ParamValue>),
    Map(ParamMap),
}

impl ParamValue {
    /// Build a record from `(property, value)` pairs.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<ParamValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        ParamValue::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null | ParamValue::Value(RowValues::Null))
    }

    /// True when the value binds directly to a single slot rather than through properties.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        matches!(self, ParamValue::Value(_))
    }

    /// Resolve a property path like `user.address.city` or `ids[1]` against this value.
    ///
    /// # Errors
    /// Returns `SqlMapperError::ParameterNotFound` when a mapping lacks the key and
    /// `SqlMapperError::BindingError` when the path does not fit the value's shape.
    pub fn resolve(&self, path: &str) -> Result<&ParamValue, SqlMapperError> {
        let tok = PropertyTokenizer::new(path);
        let mut current = self.property(tok.name())?;
        if let Some(index) = tok.index() {
            current = current.indexed(index, tok.indexed_name())?;
        }
        match tok.children() {
            Some(rest) if !current.is_null() => current.resolve(rest),
            _ => Ok(current),
        }
    }

    fn property(&self, name: &str) -> Result<&ParamValue, SqlMapperError> {
        match self {
            ParamValue::Map(map) => map.get(name),
            ParamValue::Record(fields) => fields.get(name).ok_or_else(|| {
                SqlMapperError::BindingError(format!(
                    "There is no property named '{name}' in record with properties {:?}",
                    fields.keys().collect::<Vec<_>>()
                ))
            }),
            ParamValue::Null => Ok(&ParamValue::Null),
            other => Err(SqlMapperError::BindingError(format!(
                "Cannot read property '{name}' of {}",
                other.kind()
            ))),
        }
    }

    fn indexed(&self, index: &str, indexed_name: &str) -> Result<&ParamValue, SqlMapperError> {
        match self {
            ParamValue::List(items) => {
                let pos: usize = index.parse().map_err(|_| {
                    SqlMapperError::BindingError(format!(
                        "The index '{index}' of '{indexed_name}' is not a list position"
                    ))
                })?;
                items.get(pos).ok_or_else(|| {
                    SqlMapperError::BindingError(format!(
                        "Index {pos} out of range for '{indexed_name}' (len {})",
                        items.len()
                    ))
                })
            }
            ParamValue::Map(_) | ParamValue::Record(_) => self.property(index),
            ParamValue::Null => Ok(&ParamValue::Null),
            other => Err(SqlMapperError::BindingError(format!(
                "The '{indexed_name}' property of {} is not a list or mapping",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Value(_) => "a scalar value",
            ParamValue::Record(_) => "a record",
            ParamValue::List(_) => "a list",
            ParamValue::Map(_) => "a parameter mapping",
        }
    }

    /// Collapse to a bindable value; structured values are not bindable.
    ///
    /// # Errors
    /// Returns `SqlMapperError::BindingError` for records, lists and mappings.
    pub fn to_row_value(&self) -> Result<RowValues, SqlMapperError> {
        match self {
            ParamValue::Null => Ok(RowValues::Null),
            ParamValue::Value(v) => Ok(v.clone()),
            other => Err(SqlMapperError::BindingError(format!(
                "Cannot bind {} to a single statement parameter",
                other.kind()
            ))),
        }
    }
}

macro_rules! impl_param_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    ParamValue::Value(RowValues::from(value))
                }
            }
        )*
    };
}

impl_param_from_scalar!(
    i64,
    i32,
    f64,
    bool,
    String,
    &str,
    chrono::NaiveDateTime,
    serde_json::Value,
    Vec<u8>,
);

impl From<RowValues> for ParamValue {
    fn from(value: RowValues) -> Self {
        ParamValue::Value(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

impl From<ParamMap> for ParamValue {
    fn from(value: ParamMap) -> Self {
        ParamValue::Map(value)
    }
}

/// Name-to-value mapping for multi-argument calls.
///
/// Unlike an ordinary map, looking up an absent key is an error naming the key and the keys
/// that are present; an absent argument never silently reads as null.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamMap {
    entries: BTreeMap<String, ParamValue>,
}

impl ParamMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.entries.insert(key.into(), value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// # Errors
    /// Returns `SqlMapperError::ParameterNotFound` if `key` is absent.
    pub fn get(&self, key: &str) -> Result<&ParamValue, SqlMapperError> {
        self.entries
            .get(key)
            .ok_or_else(|| SqlMapperError::ParameterNotFound {
                name: key.to_string(),
                available: self.keys().map(str::to_string).collect(),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ParamValue)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (K, ParamValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ParamValue {
        ParamValue::record([
            ("id", ParamValue::from(7_i64)),
            ("name", ParamValue::from("ada")),
            (
                "address",
                ParamValue::record([("city", ParamValue::from("London"))]),
            ),
            (
                "tags",
                ParamValue::List(vec!["a".into(), "b".into()]),
            ),
        ])
    }

    #[test]
    fn resolves_nested_and_indexed_properties() {
        let user = user();
        assert_eq!(user.resolve("name").unwrap(), &ParamValue::from("ada"));
        assert_eq!(
            user.resolve("address.city").unwrap(),
            &ParamValue::from("London")
        );
        assert_eq!(user.resolve("tags[1]").unwrap(), &ParamValue::from("b"));
    }

    #[test]
    fn missing_record_property_is_an_error() {
        let err = user().resolve("email").unwrap_err();
        assert!(matches!(err, SqlMapperError::BindingError(_)));
    }

    #[test]
    fn param_map_lookup_lists_available_keys() {
        let map: ParamMap = [("0", ParamValue::from(1_i64)), ("param1", ParamValue::from(1_i64))]
            .into_iter()
            .collect();
        match map.get("id") {
            Err(SqlMapperError::ParameterNotFound { name, available }) => {
                assert_eq!(name, "id");
                assert_eq!(available, vec!["0".to_string(), "param1".to_string()]);
            }
            other => panic!("expected ParameterNotFound, got {other:?}"),
        }
    }

    #[test]
    fn null_short_circuits_paths() {
        let value = ParamValue::record([("address", ParamValue::Null)]);
        assert!(value.resolve("address.city").unwrap().is_null());
    }
}
