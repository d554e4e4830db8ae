//! Executors run mapped statements inside one session's transaction.
//!
//! [`BaseExecutor`] holds what every variant shares (transaction, local cache, lifecycle)
//! and delegates statement handling to a [`StatementStrategy`]: [`SimpleStrategy`] opens
//! and closes a statement per call, [`ReuseStrategy`] keeps prepared statements by SQL
//! text, [`BatchStrategy`] queues writes until flushed. [`CachingExecutor`] wraps any of
//! them with the namespace caches.

mod base;
mod batch;
mod caching;
mod plugin;
mod result_handler;
mod reuse;
mod simple;
pub mod statement;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use base::{BaseExecutor, StatementStrategy};
pub use batch::{BATCH_UPDATE_RETURN_VALUE, BatchStrategy};
pub use caching::CachingExecutor;
pub use plugin::{Interceptor, InterceptorChain};
pub use result_handler::{DefaultResultHandler, MapResultHandler, ResultContext, ResultHandler};
pub(crate) use result_handler::handle_rows;
pub use reuse::ReuseStrategy;
pub use simple::SimpleStrategy;

use crate::cache::CacheKey;
use crate::error::SqlMapperError;
use crate::mapping::{BoundSql, MappedStatement, RowBounds};
use crate::param::ParamValue;
use crate::results::CustomDbRow;
use crate::types::ColumnType;

pub type SimpleExecutor = BaseExecutor<SimpleStrategy>;
pub type ReuseExecutor = BaseExecutor<ReuseStrategy>;
pub type BatchExecutor = BaseExecutor<BatchStrategy>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    #[default]
    Simple,
    Reuse,
    Batch,
}

/// How long local-cache entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalCacheScope {
    /// Until the next write, commit, rollback or close of the session.
    #[default]
    Session,
    /// Cleared after every query.
    Statement,
}

/// Configuration values executors and statement handlers read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Part of every cache key when set.
    pub environment_id: Option<String>,
    pub local_cache_scope: LocalCacheScope,
    /// Seconds; used when a statement declares no timeout.
    pub default_statement_timeout: Option<u32>,
    /// Column type used to bind a null whose mapping declares none.
    pub column_type_for_null: ColumnType,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            environment_id: None,
            local_cache_scope: LocalCacheScope::Session,
            default_statement_timeout: None,
            column_type_for_null: ColumnType::Other,
        }
    }
}

/// Outcome of one flushed sub-batch: every queued parameter object for one statement and
/// SQL text, and the per-entry counts the driver reported.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    statement_id: String,
    sql: String,
    parameter_objects: Vec<ParamValue>,
    update_counts: Vec<i64>,
}

impl BatchResult {
    #[must_use]
    pub fn new(statement_id: impl Into<String>, sql: impl Into<String>, parameter_object: ParamValue) -> Self {
        Self {
            statement_id: statement_id.into(),
            sql: sql.into(),
            parameter_objects: vec![parameter_object],
            update_counts: Vec::new(),
        }
    }

    #[must_use]
    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn parameter_objects(&self) -> &[ParamValue] {
        &self.parameter_objects
    }

    #[must_use]
    pub fn update_counts(&self) -> &[i64] {
        &self.update_counts
    }

    pub fn add_parameter_object(&mut self, parameter_object: ParamValue) {
        self.parameter_objects.push(parameter_object);
    }

    pub fn set_update_counts(&mut self, update_counts: Vec<i64>) {
        self.update_counts = update_counts;
    }
}

/// Statement execution for one session. Not meant to be shared between tasks.
#[async_trait]
pub trait Executor: Send {
    /// Run an insert, update or delete; returns the affected row count.
    async fn update(
        &mut self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
    ) -> Result<i64, SqlMapperError>;

    /// Run a select with a precomputed cache key and bound SQL.
    async fn query_with_key(
        &mut self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
        row_bounds: RowBounds,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError>;

    /// Run a select. With a result handler the rows go to the handler and the returned
    /// list is empty.
    async fn query(
        &mut self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
        row_bounds: RowBounds,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        let bound_sql = mapped_statement.bound_sql(parameter)?;
        let key = self.create_cache_key(mapped_statement, parameter, row_bounds, &bound_sql)?;
        self.query_with_key(
            mapped_statement,
            parameter,
            row_bounds,
            result_handler,
            key,
            bound_sql,
        )
        .await
    }

    /// Execute anything queued; only the batch variant queues.
    async fn flush_statements(&mut self) -> Result<Vec<BatchResult>, SqlMapperError>;

    /// Flush, clear the local cache, and commit the connection when `required`.
    async fn commit(&mut self, required: bool) -> Result<(), SqlMapperError>;

    /// Discard queued work, clear the local cache, and roll back when `required`.
    async fn rollback(&mut self, required: bool) -> Result<(), SqlMapperError>;

    fn create_cache_key(
        &self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey, SqlMapperError>;

    fn clear_local_cache(&mut self);

    /// Roll back (when forced), release statements and close the transaction. Errors are
    /// logged rather than returned.
    async fn close(&mut self, force_rollback: bool);

    fn is_closed(&self) -> bool;
}
