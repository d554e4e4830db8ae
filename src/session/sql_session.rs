use std::sync::Arc;

use tracing::{debug, warn};

use super::configuration::Configuration;
use crate::binding::{Mapper, MapperProxy};
use crate::error::SqlMapperError;
use crate::executor::{BatchResult, Executor, MapResultHandler, ResultHandler, handle_rows};
use crate::mapping::RowBounds;
use crate::param::{ParamMap, ParamValue};
use crate::results::{CustomDbRow, FromRow, KeyedRows};

/// One unit of work: statements run through a single executor and transaction.
///
/// A session is not shared between tasks. Call [`close`](Self::close) when done; a dropped
/// session releases its connection without rolling back explicitly.
///
/// ```rust,no_run
/// use sql_mapper::prelude::*;
///
/// # async fn run(factory: SqlSessionFactory) -> Result<(), SqlMapperError> {
/// let mut session = factory.open_session()?;
/// let added = session.insert("app.users.add", ParamValue::record([("name", "alice")])).await?;
/// assert_eq!(added, 1);
/// session.commit().await?;
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct SqlSession {
    configuration: Arc<Configuration>,
    executor: Box<dyn Executor>,
    auto_commit: bool,
    dirty: bool,
    closed: bool,
}

impl SqlSession {
    pub(crate) fn new(
        configuration: Arc<Configuration>,
        executor: Box<dyn Executor>,
        auto_commit: bool,
    ) -> Self {
        Self {
            configuration,
            executor,
            auto_commit,
            dirty: false,
            closed: false,
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// True once a write ran since the last commit or rollback.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// # Errors
    /// Returns `SqlMapperError::TooManyResults` when more than one row comes back.
    pub async fn select_one(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
    ) -> Result<Option<CustomDbRow>, SqlMapperError> {
        let mut rows = self.select_list(statement, parameter).await?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            n => Err(SqlMapperError::TooManyResults(n)),
        }
    }

    /// [`select_one`](Self::select_one), converting the row.
    ///
    /// # Errors
    /// As `select_one`, plus any conversion error from `T`.
    pub async fn select_one_as<T: FromRow>(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
    ) -> Result<Option<T>, SqlMapperError> {
        self.select_one(statement, parameter)
            .await?
            .as_ref()
            .map(T::from_row)
            .transpose()
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` for an unknown statement id and propagates
    /// execution errors.
    pub async fn select_list(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        self.select_list_with_bounds(statement, parameter, RowBounds::DEFAULT)
            .await
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` for an unknown statement id and propagates
    /// execution errors.
    pub async fn select_list_with_bounds(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
        row_bounds: RowBounds,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        let mapped_statement = self.configuration.mapped_statement(statement)?;
        let parameter = wrap_collection(parameter.into());
        self.executor
            .query(&mapped_statement, &parameter, row_bounds, None)
            .await
    }

    /// Rows keyed by the value of column `map_key`.
    ///
    /// # Errors
    /// Returns `SqlMapperError::BindingError` if a row has no `map_key` column.
    pub async fn select_map(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
        map_key: &str,
    ) -> Result<KeyedRows, SqlMapperError> {
        self.select_map_with_bounds(statement, parameter, map_key, RowBounds::DEFAULT)
            .await
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` if a row has no `map_key` column.
    pub async fn select_map_with_bounds(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
        map_key: &str,
        row_bounds: RowBounds,
    ) -> Result<KeyedRows, SqlMapperError> {
        let rows = self
            .select_list_with_bounds(statement, parameter, row_bounds)
            .await?;
        let mut handler = MapResultHandler::new(map_key);
        handle_rows(rows, RowBounds::DEFAULT, Some(&mut handler))?;
        Ok(handler.into_mapped_results())
    }

    /// Stream rows to `handler`. Handled selects bypass both caches.
    ///
    /// # Errors
    /// Propagates execution errors and errors returned by the handler.
    pub async fn select(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
        row_bounds: RowBounds,
        handler: &mut (dyn ResultHandler + Send),
    ) -> Result<(), SqlMapperError> {
        let mapped_statement = self.configuration.mapped_statement(statement)?;
        let parameter = wrap_collection(parameter.into());
        self.executor
            .query(&mapped_statement, &parameter, row_bounds, Some(handler))
            .await?;
        Ok(())
    }

    /// # Errors
    /// Propagates execution errors.
    pub async fn insert(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
    ) -> Result<i64, SqlMapperError> {
        self.update(statement, parameter).await
    }

    /// Affected row count; the batch executor answers
    /// [`BATCH_UPDATE_RETURN_VALUE`](crate::executor::BATCH_UPDATE_RETURN_VALUE).
    ///
    /// # Errors
    /// Propagates execution errors.
    pub async fn update(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
    ) -> Result<i64, SqlMapperError> {
        let mapped_statement = self.configuration.mapped_statement(statement)?;
        let parameter = wrap_collection(parameter.into());
        self.dirty = true;
        self.executor.update(&mapped_statement, &parameter).await
    }

    /// # Errors
    /// Propagates execution errors.
    pub async fn delete(
        &mut self,
        statement: &str,
        parameter: impl Into<ParamValue>,
    ) -> Result<i64, SqlMapperError> {
        self.update(statement, parameter).await
    }

    /// # Errors
    /// Returns `SqlMapperError::BatchExecutorError` if a queued batch fails.
    pub async fn flush_statements(&mut self) -> Result<Vec<BatchResult>, SqlMapperError> {
        self.executor.flush_statements().await
    }

    /// Commit when there are uncommitted writes and auto-commit is off.
    ///
    /// # Errors
    /// Propagates flush and commit errors.
    pub async fn commit(&mut self) -> Result<(), SqlMapperError> {
        self.commit_force(false).await
    }

    /// # Errors
    /// Propagates flush and commit errors.
    pub async fn commit_force(&mut self, force: bool) -> Result<(), SqlMapperError> {
        let required = self.is_commit_or_rollback_required(force);
        self.executor.commit(required).await?;
        self.dirty = false;
        Ok(())
    }

    /// # Errors
    /// Propagates rollback errors.
    pub async fn rollback(&mut self) -> Result<(), SqlMapperError> {
        self.rollback_force(false).await
    }

    /// # Errors
    /// Propagates rollback errors.
    pub async fn rollback_force(&mut self, force: bool) -> Result<(), SqlMapperError> {
        let required = self.is_commit_or_rollback_required(force);
        self.executor.rollback(required).await?;
        self.dirty = false;
        Ok(())
    }

    /// Roll back uncommitted writes and release the connection. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        let force_rollback = self.is_commit_or_rollback_required(false);
        self.executor.close(force_rollback).await;
        self.dirty = false;
        self.closed = true;
        debug!("session closed");
    }

    /// Drop the session's local cache.
    pub fn clear_cache(&mut self) {
        self.executor.clear_local_cache();
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` if `M` was never registered.
    pub fn get_mapper<M: Mapper>(&mut self) -> Result<MapperProxy<'_, M>, SqlMapperError> {
        let factory = self.configuration.mapper_registry().factory::<M>()?;
        Ok(factory.new_instance(self))
    }

    fn is_commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.auto_commit && self.dirty) || force
    }
}

impl Drop for SqlSession {
    fn drop(&mut self) {
        if !self.closed && self.dirty {
            warn!("session dropped with uncommitted changes");
        }
    }
}

impl std::fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("auto_commit", &self.auto_commit)
            .field("dirty", &self.dirty)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// A bare list parameter is reachable as both `collection` and `list`.
fn wrap_collection(parameter: ParamValue) -> ParamValue {
    match parameter {
        ParamValue::List(_) => {
            let mut map = ParamMap::new();
            map.insert("collection", parameter.clone());
            map.insert("list", parameter);
            ParamValue::Map(map)
        }
        other => other,
    }
}
