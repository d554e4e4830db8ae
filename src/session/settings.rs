use serde::{Deserialize, Serialize};

use crate::error::SqlMapperError;
use crate::executor::{ExecutorSettings, ExecutorType, LocalCacheScope};
use crate::types::ColumnType;

/// Global behaviour switches, loadable from JSON.
///
/// ```rust
/// use sql_mapper::prelude::*;
///
/// let settings = Settings::from_json(
///     r#"{ "default_executor_type": "reuse", "local_cache_scope": "statement" }"#,
/// )?;
/// assert_eq!(settings.default_executor_type, ExecutorType::Reuse);
/// assert!(settings.cache_enabled);
/// # Ok::<(), SqlMapperError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wrap executors with the namespace caches.
    pub cache_enabled: bool,
    pub default_executor_type: ExecutorType,
    pub local_cache_scope: LocalCacheScope,
    /// Seconds.
    pub default_statement_timeout: Option<u32>,
    pub column_type_for_null: ColumnType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            default_executor_type: ExecutorType::Simple,
            local_cache_scope: LocalCacheScope::Session,
            default_statement_timeout: None,
            column_type_for_null: ColumnType::Other,
        }
    }
}

impl Settings {
    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if the JSON does not describe settings.
    pub fn from_json(json: &str) -> Result<Self, SqlMapperError> {
        serde_json::from_str(json)
            .map_err(|e| SqlMapperError::ConfigError(format!("Invalid settings: {e}")))
    }

    pub(crate) fn executor_settings(&self, environment_id: Option<&str>) -> ExecutorSettings {
        ExecutorSettings {
            environment_id: environment_id.map(str::to_owned),
            local_cache_scope: self.local_cache_scope,
            default_statement_timeout: self.default_statement_timeout,
            column_type_for_null: self.column_type_for_null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_enum_values_are_config_errors() {
        let err = Settings::from_json(r#"{"default_executor_type":"parallel"}"#).unwrap_err();
        assert!(matches!(err, SqlMapperError::ConfigError(_)));
    }

    #[test]
    fn column_type_for_null_reads_uppercase() {
        let settings = Settings::from_json(r#"{"column_type_for_null":"NULL"}"#).unwrap();
        assert_eq!(settings.column_type_for_null, ColumnType::Null);
    }
}
