//! The seam between this crate and a database driver.
//!
//! The execution core only talks to these traits. The `sqlite` feature ships one backend;
//! `test_utils::MockDataSource` is a scripted one for tests.

use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SqlMapperError;
use crate::results::ResultSet;
use crate::types::{ColumnType, RowValues};

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Transaction isolation level requested when a connection is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Source of fresh connections, typically backed by a pool.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// # Errors
    /// Returns `SqlMapperError::ConnectionError` if no connection can be obtained.
    async fn get_connection(&self) -> Result<Box<dyn Connection>, SqlMapperError>;
}

/// One live database connection.
#[async_trait]
pub trait Connection: Send {
    /// Statement that runs its SQL text as-is, without parameters.
    async fn create_statement(&mut self) -> Result<Box<dyn Statement>, SqlMapperError>;

    /// Compile `sql` once for repeated, parameterized execution.
    async fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>, SqlMapperError>;

    /// Prepare a stored-procedure call.
    async fn prepare_call(&mut self, sql: &str) -> Result<Box<dyn Statement>, SqlMapperError>;

    async fn auto_commit(&mut self) -> Result<bool, SqlMapperError>;

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlMapperError>;

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), SqlMapperError>;

    async fn commit(&mut self) -> Result<(), SqlMapperError>;

    async fn rollback(&mut self) -> Result<(), SqlMapperError>;

    /// Release the connection. Calling it twice is allowed.
    async fn close(&mut self) -> Result<(), SqlMapperError>;

    /// Short label for log lines.
    fn describe(&self) -> String {
        "connection".to_string()
    }
}

/// A driver statement. Parameter indexes are 1-based.
#[async_trait]
pub trait Statement: Send {
    /// SQL the statement was prepared with; empty for plain statements.
    fn sql(&self) -> &str;

    fn bind(
        &mut self,
        index: usize,
        value: RowValues,
        column_type: ColumnType,
    ) -> Result<(), SqlMapperError>;

    fn register_out_parameter(
        &mut self,
        index: usize,
        column_type: ColumnType,
    ) -> Result<(), SqlMapperError>;

    fn clear_parameters(&mut self);

    fn set_query_timeout(&mut self, _timeout: Option<Duration>) {}

    /// Run with the current bindings, returning the affected row count.
    async fn execute_update(&mut self) -> Result<i64, SqlMapperError>;

    async fn execute_query(&mut self) -> Result<ResultSet, SqlMapperError>;

    /// Run `sql` directly (plain statements).
    async fn execute_sql_update(&mut self, sql: &str) -> Result<i64, SqlMapperError>;

    async fn execute_sql_query(&mut self, sql: &str) -> Result<ResultSet, SqlMapperError>;

    /// Queue the current bindings as one batch entry.
    fn add_batch(&mut self) -> Result<(), SqlMapperError>;

    /// Queue `sql` as one batch entry (plain statements).
    fn add_batch_sql(&mut self, sql: &str) -> Result<(), SqlMapperError>;

    /// Run every queued entry in order. On a rejected entry the driver reports
    /// `SqlMapperError::BatchUpdateError` carrying the counts of the entries before it.
    async fn execute_batch(&mut self) -> Result<Vec<i64>, SqlMapperError>;

    async fn close(&mut self) -> Result<(), SqlMapperError>;
}
