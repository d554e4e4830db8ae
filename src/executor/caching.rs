use async_trait::async_trait;
use tracing::debug;

use super::result_handler::ResultHandler;
use super::{BatchResult, Executor};
use crate::cache::{CacheKey, TransactionalCacheManager};
use crate::error::SqlMapperError;
use crate::mapping::{BoundSql, MappedStatement, RowBounds, StatementType};
use crate::param::ParamValue;
use crate::results::CustomDbRow;

/// Adds the namespace (second-level) caches on top of another executor.
///
/// Writes to a statement with a cache clear that whole cache; reads with `use_cache` look
/// the key up before delegating and store what the delegate returned. Both go through the
/// session's [`TransactionalCacheManager`], so with flush-on-commit caches nothing becomes
/// visible to other sessions before this one commits.
pub struct CachingExecutor {
    delegate: Box<dyn Executor>,
    tcm: TransactionalCacheManager,
}

impl CachingExecutor {
    #[must_use]
    pub fn new(delegate: Box<dyn Executor>) -> Self {
        Self {
            delegate,
            tcm: TransactionalCacheManager::new(),
        }
    }

    fn flush_cache_if_required(&mut self, mapped_statement: &MappedStatement) {
        if let Some(cache) = mapped_statement.cache()
            && (mapped_statement.command_type().is_write()
                || mapped_statement.is_flush_cache_required())
        {
            debug!(cache = cache.id(), statement = mapped_statement.id(), "clearing namespace cache");
            self.tcm.clear(cache);
        }
    }
}

fn ensure_no_out_params(
    mapped_statement: &MappedStatement,
    bound_sql: &BoundSql,
) -> Result<(), SqlMapperError> {
    if mapped_statement.statement_type() == StatementType::Callable && bound_sql.has_out_parameters() {
        return Err(SqlMapperError::ExecutorError(format!(
            "Caching stored procedures with OUT params is not supported. Please configure \
             use_cache=false in {} statement.",
            mapped_statement.id()
        )));
    }
    Ok(())
}

#[async_trait]
impl Executor for CachingExecutor {
    async fn update(
        &mut self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
    ) -> Result<i64, SqlMapperError> {
        self.flush_cache_if_required(mapped_statement);
        self.delegate.update(mapped_statement, parameter).await
    }

    async fn query_with_key(
        &mut self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
        row_bounds: RowBounds,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
        key: CacheKey,
        bound_sql: BoundSql,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        let Some(cache) = mapped_statement.cache().cloned() else {
            return self
                .delegate
                .query_with_key(mapped_statement, parameter, row_bounds, result_handler, key, bound_sql)
                .await;
        };
        self.flush_cache_if_required(mapped_statement);
        if !mapped_statement.use_cache() || result_handler.is_some() {
            return self
                .delegate
                .query_with_key(mapped_statement, parameter, row_bounds, result_handler, key, bound_sql)
                .await;
        }
        ensure_no_out_params(mapped_statement, &bound_sql)?;
        if let Some(list) = self.tcm.get(&cache, &key) {
            return Ok(list);
        }
        let load_guard = cache.lock_key(&key).await?;
        if load_guard.is_some()
            && let Some(list) = self.tcm.get(&cache, &key)
        {
            return Ok(list);
        }
        let list = self
            .delegate
            .query_with_key(mapped_statement, parameter, row_bounds, None, key.clone(), bound_sql)
            .await?;
        if load_guard.is_some() {
            self.tcm.put_loaded(&cache, key, list.clone());
        } else {
            self.tcm.put(&cache, key, list.clone());
        }
        drop(load_guard);
        Ok(list)
    }

    async fn flush_statements(&mut self) -> Result<Vec<BatchResult>, SqlMapperError> {
        self.delegate.flush_statements().await
    }

    async fn commit(&mut self, required: bool) -> Result<(), SqlMapperError> {
        self.delegate.commit(required).await?;
        self.tcm.commit();
        Ok(())
    }

    async fn rollback(&mut self, required: bool) -> Result<(), SqlMapperError> {
        let outcome = self.delegate.rollback(required).await;
        if required {
            self.tcm.rollback();
        }
        outcome
    }

    fn create_cache_key(
        &self,
        mapped_statement: &MappedStatement,
        parameter: &ParamValue,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey, SqlMapperError> {
        self.delegate
            .create_cache_key(mapped_statement, parameter, row_bounds, bound_sql)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    async fn close(&mut self, force_rollback: bool) {
        if force_rollback {
            self.tcm.rollback();
        } else {
            self.tcm.commit();
        }
        self.delegate.close(force_rollback).await;
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }
}
