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

/// What `update` reports for a write that was only queued.
pub const BATCH_UPDATE_RETURN_VALUE: i64 = i32::MIN as i64 + 1002;

/// Queues writes instead of running them.
///
/// Consecutive updates with the same statement id and SQL text share one driver statement
/// and become entries of its batch. Nothing reaches the database until the queue is
/// flushed, which happens explicitly, on commit, and before every query so reads observe
/// the session's own writes.
#[derive(Default)]
pub struct BatchStrategy {
    statement_list: Vec<Box<dyn Statement>>,
    batch_result_list: Vec<BatchResult>,
    current_sql: Option<String>,
    current_statement_id: Option<String>,
}

impl BatchStrategy {
    /// Number of sub-batches waiting for a flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.statement_list.len()
    }

    async fn execute_all(
        statements: &mut [Box<dyn Statement>],
        batch_results: Vec<BatchResult>,
    ) -> Result<Vec<BatchResult>, SqlMapperError> {
        let mut successful = Vec::with_capacity(batch_results.len());
        for (i, (statement, mut batch_result)) in
            statements.iter_mut().zip(batch_results).enumerate()
        {
            match statement.execute_batch().await {
                Ok(update_counts) => {
                    batch_result.set_update_counts(update_counts);
                    successful.push(batch_result);
                }
                Err(e) => {
                    if let SqlMapperError::BatchUpdateError { update_counts, .. } = &e {
                        batch_result.set_update_counts(update_counts.clone());
                    }
                    let message = format!(
                        "Error executing batch statement '{}' (batch index #{}) failed. {} prior \
                         sub executor(s) completed successfully, but will be rolled back. Cause: {e}",
                        batch_result.statement_id(),
                        i + 1,
                        i
                    );
                    return Err(SqlMapperError::BatchExecutorError {
                        message,
                        successful,
                        failed: Box::new(batch_result),
                    });
                }
            }
        }
        Ok(successful)
    }
}

#[async_trait]
impl StatementStrategy for BatchStrategy {
    async fn do_update(
        &mut self,
        transaction: &mut dyn Transaction,
        settings: &ExecutorSettings,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
        bound_sql: BoundSql,
    ) -> Result<i64, SqlMapperError> {
        let sql = bound_sql.sql().to_owned();
        let handler =
            RoutingStatementHandler::new(mapped_statement, bound_sql, RowBounds::DEFAULT, settings);
        let same_as_current = self.current_sql.as_deref() == Some(sql.as_str())
            && self.current_statement_id.as_deref() == Some(mapped_statement.id());
        let last = match (same_as_current, self.statement_list.len().checked_sub(1)) {
            (true, Some(last)) => {
                handler.parameterize(self.statement_list[last].as_mut())?;
                self.batch_result_list[last].add_parameter_object(parameter.clone());
                last
            }
            _ => {
                let timeout = transaction.timeout();
                let connection = transaction.connection().await?;
                let mut statement = handler.prepare(connection, timeout).await?;
                if let Err(e) = handler.parameterize(statement.as_mut()) {
                    close_statement(statement.as_mut()).await;
                    return Err(e);
                }
                debug!(statement = mapped_statement.id(), "starting a new sub-batch");
                self.current_sql = Some(sql.clone());
                self.current_statement_id = Some(mapped_statement.id().to_owned());
                self.statement_list.push(statement);
                self.batch_result_list.push(BatchResult::new(
                    mapped_statement.id(),
                    sql,
                    parameter.clone(),
                ));
                self.statement_list.len() - 1
            }
        };
        handler.batch(self.statement_list[last].as_mut())?;
        Ok(BATCH_UPDATE_RETURN_VALUE)
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
        self.do_flush_statements(false).await?;
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
        is_rollback: bool,
    ) -> Result<Vec<BatchResult>, SqlMapperError> {
        let mut statements = std::mem::take(&mut self.statement_list);
        let batch_results = std::mem::take(&mut self.batch_result_list);
        self.current_sql = None;
        self.current_statement_id = None;
        let outcome = if is_rollback {
            Ok(Vec::new())
        } else {
            debug!(sub_batches = statements.len(), "flushing batch statements");
            Self::execute_all(&mut statements, batch_results).await
        };
        for statement in &mut statements {
            close_statement(statement.as_mut()).await;
        }
        outcome
    }
}

impl super::BatchExecutor {
    #[must_use]
    pub fn new(transaction: Box<dyn Transaction>, settings: ExecutorSettings) -> Self {
        Self::with_strategy(BatchStrategy::default(), transaction, settings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::executor::{BatchExecutor, Executor};
    use crate::mapping::{RawSqlSource, SqlCommandType};
    use crate::test_utils::{DriverEvent, MockDataSource};
    use crate::transaction::LocalTransaction;

    fn insert(id: &str, sql: &str) -> MappedStatement {
        MappedStatement::builder(id, SqlCommandType::Insert, Arc::new(RawSqlSource::parse(sql).unwrap()))
            .build()
    }

    fn executor(ds: &MockDataSource) -> BatchExecutor {
        let tx = LocalTransaction::new(Arc::new(ds.clone()), None, false, false);
        BatchExecutor::new(Box::new(tx), ExecutorSettings::default())
    }

    #[tokio::test]
    async fn identical_updates_share_one_sub_batch() {
        let ds = MockDataSource::new();
        let mut executor = executor(&ds);
        let ms = insert("users.insert", "insert into users(name) values (#{name})");
        for name in ["a", "b"] {
            let count = executor
                .update(&ms, &ParamValue::record([("name", ParamValue::from(name))]))
                .await
                .unwrap();
            assert_eq!(count, BATCH_UPDATE_RETURN_VALUE);
        }
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Prepare { .. })), 1);
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::AddBatch { .. })), 2);
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::ExecuteBatch { .. })), 0);

        let results = executor.flush_statements().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].parameter_objects().len(), 2);
        assert_eq!(results[0].update_counts(), &[1, 1]);
    }

    #[tokio::test]
    async fn query_flushes_pending_writes_first() {
        let ds = MockDataSource::new();
        let mut executor = executor(&ds);
        executor
            .update(
                &insert("users.insert", "insert into users(name) values (#{name})"),
                &ParamValue::record([("name", ParamValue::from("a"))]),
            )
            .await
            .unwrap();
        let select = MappedStatement::builder(
            "users.all",
            SqlCommandType::Select,
            Arc::new(RawSqlSource::parse("select * from users").unwrap()),
        )
        .build();
        executor.query(&select, &ParamValue::Null, RowBounds::DEFAULT, None).await.unwrap();
        let events = ds.events();
        let batch_at = events
            .iter()
            .position(|e| matches!(e, DriverEvent::ExecuteBatch { .. }))
            .unwrap();
        let query_at = events
            .iter()
            .position(|e| matches!(e, DriverEvent::ExecuteQuery { .. }))
            .unwrap();
        assert!(batch_at < query_at);
    }

    #[tokio::test]
    async fn failing_sub_batch_keeps_earlier_results() {
        let ds = MockDataSource::new();
        ds.fail_batch_for("insert into orders");
        let mut executor = executor(&ds);
        let users = insert("users.insert", "insert into users(name) values (#{name})");
        let orders = insert("orders.insert", "insert into orders(id) values (#{id})");
        executor
            .update(&users, &ParamValue::record([("name", ParamValue::from("a"))]))
            .await
            .unwrap();
        executor
            .update(&orders, &ParamValue::record([("id", ParamValue::from(1_i64))]))
            .await
            .unwrap();
        let err = executor.flush_statements().await.unwrap_err();
        match err {
            SqlMapperError::BatchExecutorError {
                successful, failed, ..
            } => {
                assert_eq!(successful.len(), 1);
                assert_eq!(successful[0].statement_id(), "users.insert");
                assert_eq!(failed.statement_id(), "orders.insert");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::StatementClosed { .. })), 2);
    }

    #[tokio::test]
    async fn rollback_discards_the_queue() {
        let ds = MockDataSource::new();
        let mut executor = executor(&ds);
        executor
            .update(
                &insert("users.insert", "insert into users(name) values (#{name})"),
                &ParamValue::record([("name", ParamValue::from("a"))]),
            )
            .await
            .unwrap();
        executor.rollback(true).await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::ExecuteBatch { .. })), 0);
        assert!(executor.flush_statements().await.unwrap().is_empty());
    }
}
