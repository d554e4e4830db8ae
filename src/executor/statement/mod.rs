//! Statement handlers: turn a mapped statement and its bound SQL into a driver statement.
//!
//! Executors only ever talk to [`RoutingStatementHandler`], which picks the plain, prepared
//! or callable implementation once, from the statement type, and forwards to it.

mod callable;
mod plain;
mod prepared;

use std::time::Duration;

use async_trait::async_trait;

pub use callable::CallableStatementHandler;
pub use plain::PlainStatementHandler;
pub use prepared::PreparedStatementHandler;

use super::ExecutorSettings;
use super::result_handler::{ResultHandler, handle_rows};
use crate::driver::{Connection, Statement};
use crate::error::SqlMapperError;
use crate::mapping::{BoundSql, MappedStatement, RowBounds, StatementType};
use crate::param::ParameterHandler;
use crate::results::{CustomDbRow, ResultSet};

#[async_trait]
pub trait StatementHandler: Send + Sync {
    /// Create the driver statement on `connection` and apply the query timeout.
    async fn prepare(
        &self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<u32>,
    ) -> Result<Box<dyn Statement>, SqlMapperError>;

    /// Bind the parameter values onto `statement`.
    fn parameterize(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError>;

    /// Queue the current binding on `statement` without executing it.
    fn batch(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError>;

    async fn update(&self, statement: &mut dyn Statement) -> Result<i64, SqlMapperError>;

    /// Run the query and drain it through the paging bounds, either into the returned list
    /// or, when given, into `result_handler` (the list is then empty).
    async fn query(
        &self,
        statement: &mut dyn Statement,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError>;

    fn bound_sql(&self) -> &BoundSql;
}

/// State every handler needs.
pub(crate) struct HandlerContext<'a> {
    pub(crate) mapped_statement: &'a MappedStatement,
    pub(crate) bound_sql: BoundSql,
    pub(crate) row_bounds: RowBounds,
    pub(crate) settings: &'a ExecutorSettings,
}

impl HandlerContext<'_> {
    /// The statement's own timeout, else the configured default, capped by the
    /// transaction's timeout.
    fn query_timeout(&self, transaction_timeout: Option<u32>) -> Option<u32> {
        let statement_timeout = self
            .mapped_statement
            .timeout()
            .or(self.settings.default_statement_timeout);
        match (statement_timeout, transaction_timeout) {
            (Some(s), Some(t)) => Some(s.min(t)),
            (s, t) => s.or(t),
        }
    }

    fn apply_timeout(&self, statement: &mut dyn Statement, transaction_timeout: Option<u32>) {
        let timeout = self.query_timeout(transaction_timeout);
        statement.set_query_timeout(timeout.map(|s| Duration::from_secs(u64::from(s))));
    }

    fn parameter_handler(&self) -> ParameterHandler<'_> {
        ParameterHandler::new(&self.bound_sql, self.settings.column_type_for_null)
    }

    fn handle_result_set(
        &self,
        result_set: ResultSet,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        handle_rows(result_set.results, self.row_bounds, result_handler)
    }

    /// Wrap a driver failure with the statement it came from.
    fn describe_failure(&self, action: &str, err: SqlMapperError) -> SqlMapperError {
        match err {
            SqlMapperError::ExecutionError(msg) => SqlMapperError::ExecutionError(format!(
                "Error {action} statement '{}'. Cause: {msg}",
                self.mapped_statement.id()
            )),
            other => other,
        }
    }
}

/// Forwards every call to the handler matching the statement type.
pub struct RoutingStatementHandler<'a> {
    delegate: Box<dyn StatementHandler + 'a>,
}

impl<'a> RoutingStatementHandler<'a> {
    #[must_use]
    pub fn new(
        mapped_statement: &'a MappedStatement,
        bound_sql: BoundSql,
        row_bounds: RowBounds,
        settings: &'a ExecutorSettings,
    ) -> Self {
        let context = HandlerContext {
            mapped_statement,
            bound_sql,
            row_bounds,
            settings,
        };
        let delegate: Box<dyn StatementHandler + 'a> = match mapped_statement.statement_type() {
            StatementType::Plain => Box::new(PlainStatementHandler::new(context)),
            StatementType::Prepared => Box::new(PreparedStatementHandler::new(context)),
            StatementType::Callable => Box::new(CallableStatementHandler::new(context)),
        };
        Self { delegate }
    }
}

#[async_trait]
impl StatementHandler for RoutingStatementHandler<'_> {
    async fn prepare(
        &self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<u32>,
    ) -> Result<Box<dyn Statement>, SqlMapperError> {
        self.delegate.prepare(connection, transaction_timeout).await
    }

    fn parameterize(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError> {
        self.delegate.parameterize(statement)
    }

    fn batch(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError> {
        self.delegate.batch(statement)
    }

    async fn update(&self, statement: &mut dyn Statement) -> Result<i64, SqlMapperError> {
        self.delegate.update(statement).await
    }

    async fn query(
        &self,
        statement: &mut dyn Statement,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        self.delegate.query(statement, result_handler).await
    }

    fn bound_sql(&self) -> &BoundSql {
        self.delegate.bound_sql()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mapping::{ParameterMapping, SqlCommandType, SqlSource, StaticSqlSource};
    use crate::param::ParamValue;
    use crate::test_utils::{DriverEvent, MockDataSource};
    use crate::driver::DataSource;
    use crate::types::RowValues;

    fn statement(statement_type: StatementType) -> MappedStatement {
        let source: Arc<dyn SqlSource> = Arc::new(StaticSqlSource::new(
            "select * from t where id = ?",
            vec![ParameterMapping::new("id")],
        ));
        MappedStatement::builder("t.find", SqlCommandType::Select, source)
            .statement_type(statement_type)
            .timeout(30)
            .build()
    }

    #[tokio::test]
    async fn routes_by_statement_type() {
        let ds = MockDataSource::new();
        let mut conn = ds.get_connection().await.unwrap();
        let settings = ExecutorSettings::default();
        for (kind, expected) in [
            (StatementType::Plain, "create_statement"),
            (StatementType::Prepared, "prepare"),
            (StatementType::Callable, "prepare_call"),
        ] {
            let ms = statement(kind);
            let bound = ms.bound_sql(&ParamValue::from(1_i64)).unwrap();
            let handler = RoutingStatementHandler::new(&ms, bound, RowBounds::DEFAULT, &settings);
            handler.prepare(conn.as_mut(), None).await.unwrap();
            assert_eq!(ds.last_prepare_kind().as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn timeout_is_capped_by_transaction() {
        let ds = MockDataSource::new();
        let mut conn = ds.get_connection().await.unwrap();
        let settings = ExecutorSettings::default();
        let ms = statement(StatementType::Prepared);
        let bound = ms.bound_sql(&ParamValue::from(1_i64)).unwrap();
        let handler = RoutingStatementHandler::new(&ms, bound, RowBounds::DEFAULT, &settings);
        let mut stmt = handler.prepare(conn.as_mut(), Some(5)).await.unwrap();
        handler.parameterize(stmt.as_mut()).unwrap();
        assert!(ds.events().contains(&DriverEvent::Timeout(Some(Duration::from_secs(5)))));
        assert!(ds.events().contains(&DriverEvent::Bind {
            sql: "select * from t where id = ?".into(),
            index: 1,
            value: RowValues::Int(1),
        }));
    }
}
