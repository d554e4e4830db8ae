use async_trait::async_trait;
use tracing::warn;

use super::base::StatementStrategy;
use super::result_handler::ResultHandler;
use super::statement::{RoutingStatementHandler, StatementHandler};
use super::{BatchResult, ExecutorSettings};
use crate::driver::Statement;
use crate::error::SqlMapperError;
use crate::mapping::{BoundSql, MappedStatement, RowBounds};
use crate::param::ParamValue;
use crate::results::CustomDbRow;
use crate::transaction::Transaction;

/// A fresh statement per call, closed as soon as the call finishes.
#[derive(Debug, Default)]
pub struct SimpleStrategy;

pub(crate) async fn close_statement(statement: &mut dyn Statement) {
    if let Err(e) = statement.close().await {
        warn!("Error closing statement. Cause: {e}");
    }
}

#[async_trait]
impl StatementStrategy for SimpleStrategy {
    async fn do_update(
        &mut self,
        transaction: &mut dyn Transaction,
        settings: &ExecutorSettings,
        mapped_statement: &MappedStatement,
        _parameter: &ParamValue,
        bound_sql: BoundSql,
    ) -> Result<i64, SqlMapperError> {
        let handler =
            RoutingStatementHandler::new(mapped_statement, bound_sql, RowBounds::DEFAULT, settings);
        let timeout = transaction.timeout();
        let connection = transaction.connection().await?;
        let mut statement = handler.prepare(connection, timeout).await?;
        let outcome = match handler.parameterize(statement.as_mut()) {
            Ok(()) => handler.update(statement.as_mut()).await,
            Err(e) => Err(e),
        };
        close_statement(statement.as_mut()).await;
        outcome
    }

    async fn do_query(
        &mut self,
        transaction: &mut dyn Transaction,
        settings: &ExecutorSettings,
        mapped_statement: &MappedStatement,
        row_bounds: RowBounds,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
        bound_sql: BoundSql,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        let handler = RoutingStatementHandler::new(mapped_statement, bound_sql, row_bounds, settings);
        let timeout = transaction.timeout();
        let connection = transaction.connection().await?;
        let mut statement = handler.prepare(connection, timeout).await?;
        let outcome = match handler.parameterize(statement.as_mut()) {
            Ok(()) => handler.query(statement.as_mut(), result_handler).await,
            Err(e) => Err(e),
        };
        close_statement(statement.as_mut()).await;
        outcome
    }

    async fn do_flush_statements(
        &mut self,
        _is_rollback: bool,
    ) -> Result<Vec<BatchResult>, SqlMapperError> {
        Ok(Vec::new())
    }
}

impl super::SimpleExecutor {
    #[must_use]
    pub fn new(transaction: Box<dyn Transaction>, settings: ExecutorSettings) -> Self {
        Self::with_strategy(SimpleStrategy, transaction, settings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::executor::Executor;
    use crate::mapping::{RawSqlSource, SqlCommandType};
    use crate::test_utils::{DriverEvent, MockDataSource};
    use crate::transaction::LocalTransaction;

    fn find() -> MappedStatement {
        let source = RawSqlSource::parse("select * from users where id = #{id}").unwrap();
        MappedStatement::builder("users.find", SqlCommandType::Select, Arc::new(source)).build()
    }

    #[tokio::test]
    async fn every_call_prepares_and_closes_a_statement() {
        let ds = MockDataSource::new();
        ds.respond_to_query("select * from users", &["id"], vec![vec![1_i64.into()]]);
        let tx = LocalTransaction::new(Arc::new(ds.clone()), None, false, false);
        let mut executor = super::super::SimpleExecutor::new(Box::new(tx), ExecutorSettings::default());
        let ms = find();
        executor.query(&ms, &ParamValue::from(1_i64), RowBounds::DEFAULT, None).await.unwrap();
        executor.query(&ms, &ParamValue::from(2_i64), RowBounds::DEFAULT, None).await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Prepare { .. })), 2);
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::StatementClosed { .. })), 2);
    }

    #[tokio::test]
    async fn identical_query_is_served_from_local_cache_until_a_write() {
        let ds = MockDataSource::new();
        ds.respond_to_query("select * from users", &["id"], vec![vec![1_i64.into()]]);
        let tx = LocalTransaction::new(Arc::new(ds.clone()), None, false, false);
        let mut executor = super::super::SimpleExecutor::new(Box::new(tx), ExecutorSettings::default());
        let ms = find();
        let param = ParamValue::from(1_i64);
        let first = executor.query(&ms, &param, RowBounds::DEFAULT, None).await.unwrap();
        let second = executor.query(&ms, &param, RowBounds::DEFAULT, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::ExecuteQuery { .. })), 1);

        let delete = MappedStatement::builder(
            "users.delete",
            SqlCommandType::Delete,
            Arc::new(RawSqlSource::parse("delete from users").unwrap()),
        )
        .build();
        executor.update(&delete, &ParamValue::Null).await.unwrap();
        executor.query(&ms, &param, RowBounds::DEFAULT, None).await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::ExecuteQuery { .. })), 2);
    }

    #[tokio::test]
    async fn closed_executor_rejects_work() {
        let ds = MockDataSource::new();
        let tx = LocalTransaction::new(Arc::new(ds.clone()), None, false, false);
        let mut executor = super::super::SimpleExecutor::new(Box::new(tx), ExecutorSettings::default());
        executor.close(false).await;
        assert!(executor.is_closed());
        let err = executor
            .query(&find(), &ParamValue::Null, RowBounds::DEFAULT, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SqlMapperError::ExecutorError(_)));
    }
}
