use async_trait::async_trait;
use tracing::{debug, warn};

use super::result_handler::ResultHandler;
use super::{BatchResult, Executor, ExecutorSettings, LocalCacheScope};
use crate::cache::{Cache, CacheKey, PerpetualCache};
use crate::error::SqlMapperError;
use crate::mapping::{BoundSql, MappedStatement, ParameterMode, RowBounds};
use crate::param::{ParamValue, resolve_parameter};
use crate::results::CustomDbRow;
use crate::transaction::Transaction;

/// The part of an executor that differs between variants.
#[async_trait]
pub trait StatementStrategy: Send {
    async fn do_update(
        &mut self,
        transaction: &mut dyn Transaction,
        settings: &ExecutorSettings,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
        bound_sql: BoundSql,
    ) -> Result<i64, SqlMapperError>;

    async fn do_query(
        &mut self,
        transaction: &mut dyn Transaction,
        settings: &ExecutorSettings,
        mapped_statement: &MappedStatement,
        row_bounds: RowBounds,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
        bound_sql: BoundSql,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError>;

    /// Execute (or, on rollback, discard) queued work and release held statements.
    async fn do_flush_statements(
        &mut self,
        is_rollback: bool,
    ) -> Result<Vec<BatchResult>, SqlMapperError>;
}

/// Shared executor lifecycle over a [`StatementStrategy`].
///
/// Owns the session's transaction and its local cache. Every write clears the local cache
/// before running; reads consult it first and populate it on success.
pub struct BaseExecutor<S> {
    strategy: S,
    transaction: Box<dyn Transaction>,
    settings: ExecutorSettings,
    local_cache: PerpetualCache,
    closed: bool,
}

impl<S: StatementStrategy> BaseExecutor<S> {
    #[must_use]
    pub fn with_strategy(
        strategy: S,
        transaction: Box<dyn Transaction>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            strategy,
            transaction,
            settings,
            local_cache: PerpetualCache::new("LocalCache"),
            closed: false,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Whether the local cache currently holds `key`.
    #[must_use]
    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.local_cache.peek(key).is_some()
    }

    fn ensure_open(&self) -> Result<(), SqlMapperError> {
        if self.closed {
            Err(SqlMapperError::ExecutorError("Executor was closed.".to_string()))
        } else {
            Ok(())
        }
    }

    async fn query_from_database(
        &mut self,
        mapped_statement: &MappedStatement,
        row_bounds: RowBounds,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        let streaming = result_handler.is_some();
        let list = self
            .strategy
            .do_query(
                self.transaction.as_mut(),
                &self.settings,
                mapped_statement,
                row_bounds,
                result_handler,
                bound_sql,
            )
            .await?;
        if !streaming {
            self.local_cache.put(key, list.clone());
        }
        Ok(list)
    }

    async fn flush(&mut self, is_rollback: bool) -> Result<Vec<BatchResult>, SqlMapperError> {
        self.ensure_open()?;
        self.strategy.do_flush_statements(is_rollback).await
    }
}

#[async_trait]
impl<S: StatementStrategy> Executor for BaseExecutor<S> {
    async fn update(
        &mut self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
    ) -> Result<i64, SqlMapperError> {
        debug!(statement = mapped_statement.id(), "executing an update");
        self.ensure_open()?;
        self.clear_local_cache();
        let bound_sql = mapped_statement.bound_sql(parameter)?;
        self.strategy
            .do_update(
                self.transaction.as_mut(),
                &self.settings,
                mapped_statement,
                parameter,
                bound_sql,
            )
            .await
    }

    async fn query_with_key(
        &mut self,
        mapped_statement: &MappedStatement,
        _parameter: &ParamValue,
        row_bounds: RowBounds,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        debug!(statement = mapped_statement.id(), "executing a query");
        self.ensure_open()?;
        if mapped_statement.is_flush_cache_required() {
            self.clear_local_cache();
        }
        let cached = if result_handler.is_none() {
            self.local_cache.get(&key)
        } else {
            None
        };
        let list = match cached {
            Some(list) => {
                debug!(statement = mapped_statement.id(), "local cache hit");
                list
            }
            None => {
                self.query_from_database(mapped_statement, row_bounds, result_handler, key, bound_sql)
                    .await?
            }
        };
        if self.settings.local_cache_scope == LocalCacheScope::Statement {
            self.clear_local_cache();
        }
        Ok(list)
    }

    async fn flush_statements(&mut self) -> Result<Vec<BatchResult>, SqlMapperError> {
        self.flush(false).await
    }

    async fn commit(&mut self, required: bool) -> Result<(), SqlMapperError> {
        if self.closed {
            return Err(SqlMapperError::ExecutorError(
                "Cannot commit, transaction is already closed".to_string(),
            ));
        }
        self.clear_local_cache();
        self.flush(false).await?;
        if required {
            self.transaction.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self, required: bool) -> Result<(), SqlMapperError> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        let flushed = self.flush(true).await;
        let rolled_back = if required {
            self.transaction.rollback().await
        } else {
            Ok(())
        };
        flushed.and(rolled_back)
    }

    fn create_cache_key(
        &self,
        mapped_statement: &MappedStatement,
        _parameter: &ParamValue,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey, SqlMapperError> {
        self.ensure_open()?;
        let mut key = CacheKey::new();
        key.update(mapped_statement.id());
        key.update(i64::try_from(row_bounds.offset()).unwrap_or(i64::MAX));
        key.update(i64::try_from(row_bounds.limit()).unwrap_or(i64::MAX));
        key.update(bound_sql.sql());
        for mapping in bound_sql.parameter_mappings() {
            if mapping.mode != ParameterMode::Out {
                key.update(resolve_parameter(bound_sql, &mapping.property)?);
            }
        }
        if let Some(environment_id) = &self.settings.environment_id {
            key.update(environment_id.as_str());
        }
        Ok(key)
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
        }
    }

    async fn close(&mut self, force_rollback: bool) {
        if self.closed {
            return;
        }
        if let Err(e) = self.rollback(force_rollback).await {
            warn!("Unexpected exception on closing transaction. Cause: {e}");
        }
        if let Err(e) = self.transaction.close().await {
            warn!("Unexpected exception on closing transaction. Cause: {e}");
        }
        self.local_cache.clear();
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
