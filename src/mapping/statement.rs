use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::SharedCache;
use crate::error::SqlMapperError;
use crate::param::ParamValue;

use super::bound_sql::BoundSql;
use super::sql_source::SqlSource;

/// What a statement does to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlCommandType {
    Insert,
    Update,
    Delete,
    Select,
    Flush,
}

impl SqlCommandType {
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

/// How the driver statement is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatementType {
    /// SQL runs as-is, no parameters.
    Plain,
    /// Compiled once, parameters bound per execution.
    #[default]
    Prepared,
    /// Stored-procedure call with IN/OUT slots.
    Callable,
}

impl FromStr for StatementType {
    type Err = SqlMapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STATEMENT" | "PLAIN" => Ok(Self::Plain),
            "PREPARED" => Ok(Self::Prepared),
            "CALLABLE" | "PROCEDURE" => Ok(Self::Callable),
            other => Err(SqlMapperError::ExecutorError(format!(
                "Unknown statement type: {other}"
            ))),
        }
    }
}

/// Immutable description of one named SQL operation.
#[derive(Clone)]
pub struct MappedStatement {
    id: String,
    command_type: SqlCommandType,
    statement_type: StatementType,
    sql_source: Arc<dyn SqlSource>,
    parameter_type: Option<String>,
    result_type: Option<String>,
    use_cache: bool,
    flush_cache_required: bool,
    cache: Option<SharedCache>,
    timeout: Option<u32>,
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("command_type", &self.command_type)
            .field("statement_type", &self.statement_type)
            .field("sql_source", &self.sql_source)
            .field("use_cache", &self.use_cache)
            .field("flush_cache_required", &self.flush_cache_required)
            .field("cache", &self.cache.as_ref().map(SharedCache::id))
            .finish_non_exhaustive()
    }
}

impl MappedStatement {
    /// Start building a statement. Writes default to flushing caches; selects default to
    /// using the shared cache.
    pub fn builder(
        id: impl Into<String>,
        command_type: SqlCommandType,
        sql_source: Arc<dyn SqlSource>,
    ) -> MappedStatementBuilder {
        let is_select = command_type == SqlCommandType::Select;
        MappedStatementBuilder {
            statement: MappedStatement {
                id: id.into(),
                command_type,
                statement_type: StatementType::default(),
                sql_source,
                parameter_type: None,
                result_type: None,
                use_cache: is_select,
                flush_cache_required: !is_select,
                cache: None,
                timeout: None,
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Everything before the last `.` of the id.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.id.rsplit_once('.').map_or("", |(ns, _)| ns)
    }

    #[must_use]
    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }

    #[must_use]
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    #[must_use]
    pub fn parameter_type(&self) -> Option<&str> {
        self.parameter_type.as_deref()
    }

    #[must_use]
    pub fn result_type(&self) -> Option<&str> {
        self.result_type.as_deref()
    }

    #[must_use]
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    #[must_use]
    pub fn is_flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    #[must_use]
    pub fn cache(&self) -> Option<&SharedCache> {
        self.cache.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Option<u32> {
        self.timeout
    }

    /// Render the bound SQL for `param`.
    ///
    /// # Errors
    /// Propagates failures of the statement's SQL source.
    pub fn bound_sql(&self, param: &ParamValue) -> Result<BoundSql, SqlMapperError> {
        self.sql_source.bound_sql(param)
    }

    pub(crate) fn with_id_and_cache(&self, id: String, cache: Option<SharedCache>) -> Self {
        let mut copy = self.clone();
        copy.id = id;
        copy.cache = cache;
        copy
    }
}

pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    #[must_use]
    pub fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement.statement_type = statement_type;
        self
    }

    #[must_use]
    pub fn parameter_type(mut self, parameter_type: impl Into<String>) -> Self {
        self.statement.parameter_type = Some(parameter_type.into());
        self
    }

    #[must_use]
    pub fn result_type(mut self, result_type: impl Into<String>) -> Self {
        self.statement.result_type = Some(result_type.into());
        self
    }

    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.statement.use_cache = use_cache;
        self
    }

    #[must_use]
    pub fn flush_cache(mut self, flush_cache_required: bool) -> Self {
        self.statement.flush_cache_required = flush_cache_required;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: SharedCache) -> Self {
        self.statement.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.statement.timeout = Some(seconds);
        self
    }

    #[must_use]
    pub fn build(self) -> MappedStatement {
        self.statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::StaticSqlSource;

    #[test]
    fn defaults_follow_command_type() {
        let source: Arc<dyn SqlSource> = Arc::new(StaticSqlSource::new("select 1", vec![]));
        let select = MappedStatement::builder("a.B.find", SqlCommandType::Select, Arc::clone(&source)).build();
        assert!(select.use_cache());
        assert!(!select.is_flush_cache_required());
        assert_eq!(select.namespace(), "a.B");

        let insert = MappedStatement::builder("a.B.add", SqlCommandType::Insert, source).build();
        assert!(!insert.use_cache());
        assert!(insert.is_flush_cache_required());
        assert_eq!(insert.statement_type(), StatementType::Prepared);
    }

    #[test]
    fn unknown_statement_type_is_rejected() {
        assert_eq!("callable".parse::<StatementType>().unwrap(), StatementType::Callable);
        assert!("streamed".parse::<StatementType>().is_err());
    }
}
