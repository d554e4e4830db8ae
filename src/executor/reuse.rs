use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::base::StatementStrategy;
use super::result_handler::ResultHandler;
use super::simple::close_statement;
use super::statement::{RoutingStatementHandler, StatementHandler};
use super::{BatchResult, ExecutorSettings};
use crate::driver::Statement;
use crate::error::SqlMapperError;
use crate::mapping::{BoundSql, MappedStatement, RowBounds};
use crate::param::ParamValue;
use crate::results::CustomDbRow;
use crate::transaction::Transaction;

/// Keeps every statement it prepares, keyed by SQL text, until the next flush, commit,
/// rollback or close. A repeated SQL text only rebinds parameters.
#[derive(Default)]
pub struct ReuseStrategy {
    statement_map: HashMap<String, Box<dyn Statement>>,
}

impl ReuseStrategy {
    /// Number of statements currently held open.
    #[must_use]
    pub fn open_statements(&self) -> usize {
        self.statement_map.len()
    }

    async fn prepare_statement(
        &mut self,
        handler: &RoutingStatementHandler<'_>,
        transaction: &mut dyn Transaction,
    ) -> Result<&mut Box<dyn Statement>, SqlMapperError> {
        let sql = handler.bound_sql().sql().to_owned();
        if self.statement_map.contains_key(&sql) {
            debug!(sql = %sql, "reusing prepared statement");
        } else {
            let timeout = transaction.timeout();
            let connection = transaction.connection().await?;
            let statement = handler.prepare(connection, timeout).await?;
            self.statement_map.insert(sql.clone(), statement);
        }
        let statement = self.statement_map.get_mut(&sql).ok_or_else(|| {
            SqlMapperError::ExecutorError(format!("No open statement for SQL: {sql}"))
        })?;
        handler.parameterize(statement.as_mut())?;
        Ok(statement)
    }
}

#[async_trait]
impl StatementStrategy for ReuseStrategy {
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
        let statement = self.prepare_statement(&handler, transaction).await?;
        handler.update(statement.as_mut()).await
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
        let statement = self.prepare_statement(&handler, transaction).await?;
        handler.query(statement.as_mut(), result_handler).await
    }

    async fn do_flush_statements(
        &mut self,
        _is_rollback: bool,
    ) -> Result<Vec<BatchResult>, SqlMapperError> {
        for (_, mut statement) in self.statement_map.drain() {
            close_statement(statement.as_mut()).await;
        }
        Ok(Vec::new())
    }
}

impl super::ReuseExecutor {
    #[must_use]
    pub fn new(transaction: Box<dyn Transaction>, settings: ExecutorSettings) -> Self {
        Self::with_strategy(ReuseStrategy::default(), transaction, settings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::executor::{Executor, ReuseExecutor};
    use crate::mapping::{RawSqlSource, SqlCommandType};
    use crate::test_utils::{DriverEvent, MockDataSource};
    use crate::transaction::LocalTransaction;

    #[tokio::test]
    async fn identical_sql_is_prepared_once_per_session() {
        let ds = MockDataSource::new();
        let tx = LocalTransaction::new(Arc::new(ds.clone()), None, false, false);
        let mut executor = ReuseExecutor::new(Box::new(tx), ExecutorSettings::default());
        let insert = MappedStatement::builder(
            "users.insert",
            SqlCommandType::Insert,
            Arc::new(RawSqlSource::parse("insert into users(name) values (#{name})").unwrap()),
        )
        .build();
        for name in ["a", "b", "c"] {
            let param = ParamValue::record([("name", ParamValue::from(name))]);
            executor.update(&insert, &param).await.unwrap();
        }
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Prepare { .. })), 1);
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::ExecuteUpdate { .. })), 3);
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::StatementClosed { .. })), 0);

        executor.flush_statements().await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::StatementClosed { .. })), 1);

        executor
            .update(&insert, &ParamValue::record([("name", ParamValue::from("d"))]))
            .await
            .unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Prepare { .. })), 2);
        executor.close(true).await;
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::StatementClosed { .. })), 2);
    }
}
