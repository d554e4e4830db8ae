//! A scripted in-memory driver for exercising executors, transactions and sessions
//! without a database.
//!
//! Every driver call is recorded as a [`DriverEvent`]; queries answer with rows registered
//! through [`MockDataSource::respond_to_query`], updates answer `1` unless told otherwise.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{Connection, DataSource, IsolationLevel, Statement};
use crate::error::SqlMapperError;
use crate::results::ResultSet;
use crate::types::{ColumnType, RowValues};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Open,
    /// `kind` is `create_statement`, `prepare` or `prepare_call`.
    Prepare { kind: &'static str, sql: String },
    SetAutoCommit(bool),
    SetIsolation(IsolationLevel),
    Timeout(Option<Duration>),
    Bind { sql: String, index: usize, value: RowValues },
    RegisterOut { sql: String, index: usize },
    ExecuteQuery { sql: String },
    ExecuteUpdate { sql: String },
    AddBatch { sql: String },
    ExecuteBatch { sql: String, entries: usize },
    StatementClosed { sql: String },
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Clone)]
struct QueryResponse {
    sql_prefix: String,
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<DriverEvent>,
    connections_opened: usize,
    last_prepare_kind: Option<String>,
    queries: Vec<QueryResponse>,
    update_counts: Vec<(String, i64)>,
    batch_failures: Vec<String>,
    fail_set_auto_commit: bool,
    fail_isolation: bool,
    query_delay: Option<Duration>,
}

impl MockState {
    fn record(&mut self, event: DriverEvent) {
        self.events.push(event);
    }

    fn result_set_for(&self, sql: &str) -> ResultSet {
        self.queries
            .iter()
            .rev()
            .find(|q| matches_prefix(sql, &q.sql_prefix))
            .map_or_else(ResultSet::default, |q| {
                ResultSet::from_rows(q.columns.clone(), q.rows.clone())
            })
    }

    fn update_count_for(&self, sql: &str) -> i64 {
        self.update_counts
            .iter()
            .rev()
            .find(|(prefix, _)| matches_prefix(sql, prefix))
            .map_or(1, |(_, count)| *count)
    }

    fn batch_fails(&self, sql: &str) -> bool {
        self.batch_failures.iter().any(|p| matches_prefix(sql, p))
    }
}

fn matches_prefix(sql: &str, prefix: &str) -> bool {
    sql.trim_start()
        .to_ascii_lowercase()
        .starts_with(&prefix.to_ascii_lowercase())
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Data source handing out scripted connections. Clones share one event log.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    state: SharedState,
}

impl MockDataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<DriverEvent> {
        lock(&self.state).events.clone()
    }

    pub fn count(&self, predicate: impl Fn(&DriverEvent) -> bool) -> usize {
        lock(&self.state).events.iter().filter(|e| predicate(e)).count()
    }

    pub fn clear_events(&self) {
        lock(&self.state).events.clear();
    }

    #[must_use]
    pub fn connections_opened(&self) -> usize {
        lock(&self.state).connections_opened
    }

    /// How the most recent statement was created.
    #[must_use]
    pub fn last_prepare_kind(&self) -> Option<String> {
        lock(&self.state).last_prepare_kind.clone()
    }

    /// Answer queries whose SQL starts with `sql_prefix` (case-insensitive) with these rows.
    /// Later registrations win.
    pub fn respond_to_query(&self, sql_prefix: &str, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        lock(&self.state).queries.push(QueryResponse {
            sql_prefix: sql_prefix.to_owned(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows,
        });
    }

    /// Report `count` affected rows for updates and batch entries matching `sql_prefix`.
    pub fn respond_to_update(&self, sql_prefix: &str, count: i64) {
        lock(&self.state)
            .update_counts
            .push((sql_prefix.to_owned(), count));
    }

    /// Reject the first batch entry of statements matching `sql_prefix`.
    pub fn fail_batch_for(&self, sql_prefix: &str) {
        lock(&self.state).batch_failures.push(sql_prefix.to_owned());
    }

    pub fn fail_set_auto_commit(&self, fail: bool) {
        lock(&self.state).fail_set_auto_commit = fail;
    }

    pub fn fail_isolation(&self, fail: bool) {
        lock(&self.state).fail_isolation = fail;
    }

    /// Make every query take `delay` before it answers.
    pub fn delay_queries(&self, delay: Duration) {
        lock(&self.state).query_delay = Some(delay);
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn get_connection(&self) -> Result<Box<dyn Connection>, SqlMapperError> {
        let mut state = lock(&self.state);
        state.connections_opened += 1;
        state.record(DriverEvent::Open);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            auto_commit: true,
            closed: false,
        }))
    }
}

/// Connection of a [`MockDataSource`].
#[derive(Debug)]
pub struct MockConnection {
    state: SharedState,
    auto_commit: bool,
    closed: bool,
}

impl MockConnection {
    fn statement(&self, kind: &'static str, sql: &str) -> Box<dyn Statement> {
        let mut state = lock(&self.state);
        state.last_prepare_kind = Some(kind.to_owned());
        state.record(DriverEvent::Prepare {
            kind,
            sql: sql.to_owned(),
        });
        Box::new(MockStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_owned(),
            batch: Vec::new(),
        })
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn create_statement(&mut self) -> Result<Box<dyn Statement>, SqlMapperError> {
        Ok(self.statement("create_statement", ""))
    }

    async fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>, SqlMapperError> {
        Ok(self.statement("prepare", sql))
    }

    async fn prepare_call(&mut self, sql: &str) -> Result<Box<dyn Statement>, SqlMapperError> {
        Ok(self.statement("prepare_call", sql))
    }

    async fn auto_commit(&mut self) -> Result<bool, SqlMapperError> {
        Ok(self.auto_commit)
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlMapperError> {
        let mut state = lock(&self.state);
        if state.fail_set_auto_commit {
            return Err(SqlMapperError::ConnectionError(
                "mock driver refused set_auto_commit".to_string(),
            ));
        }
        state.record(DriverEvent::SetAutoCommit(auto_commit));
        self.auto_commit = auto_commit;
        Ok(())
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), SqlMapperError> {
        let mut state = lock(&self.state);
        if state.fail_isolation {
            return Err(SqlMapperError::ConnectionError(
                "mock driver refused the isolation level".to_string(),
            ));
        }
        state.record(DriverEvent::SetIsolation(level));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlMapperError> {
        lock(&self.state).record(DriverEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlMapperError> {
        lock(&self.state).record(DriverEvent::Rollback);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlMapperError> {
        if !self.closed {
            self.closed = true;
            lock(&self.state).record(DriverEvent::Close);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "mock connection".to_string()
    }
}

/// Statement of a [`MockConnection`].
#[derive(Debug)]
pub struct MockStatement {
    state: SharedState,
    sql: String,
    batch: Vec<String>,
}

#[async_trait]
impl Statement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(
        &mut self,
        index: usize,
        value: RowValues,
        _column_type: ColumnType,
    ) -> Result<(), SqlMapperError> {
        lock(&self.state).record(DriverEvent::Bind {
            sql: self.sql.clone(),
            index,
            value,
        });
        Ok(())
    }

    fn register_out_parameter(
        &mut self,
        index: usize,
        _column_type: ColumnType,
    ) -> Result<(), SqlMapperError> {
        lock(&self.state).record(DriverEvent::RegisterOut {
            sql: self.sql.clone(),
            index,
        });
        Ok(())
    }

    fn clear_parameters(&mut self) {}

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        lock(&self.state).record(DriverEvent::Timeout(timeout));
    }

    async fn execute_update(&mut self) -> Result<i64, SqlMapperError> {
        let mut state = lock(&self.state);
        state.record(DriverEvent::ExecuteUpdate {
            sql: self.sql.clone(),
        });
        Ok(state.update_count_for(&self.sql))
    }

    async fn execute_query(&mut self) -> Result<ResultSet, SqlMapperError> {
        let delay = lock(&self.state).query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = lock(&self.state);
        state.record(DriverEvent::ExecuteQuery {
            sql: self.sql.clone(),
        });
        Ok(state.result_set_for(&self.sql))
    }

    async fn execute_sql_update(&mut self, sql: &str) -> Result<i64, SqlMapperError> {
        let mut state = lock(&self.state);
        state.record(DriverEvent::ExecuteUpdate {
            sql: sql.to_owned(),
        });
        Ok(state.update_count_for(sql))
    }

    async fn execute_sql_query(&mut self, sql: &str) -> Result<ResultSet, SqlMapperError> {
        let delay = lock(&self.state).query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = lock(&self.state);
        state.record(DriverEvent::ExecuteQuery {
            sql: sql.to_owned(),
        });
        Ok(state.result_set_for(sql))
    }

    fn add_batch(&mut self) -> Result<(), SqlMapperError> {
        lock(&self.state).record(DriverEvent::AddBatch {
            sql: self.sql.clone(),
        });
        self.batch.push(self.sql.clone());
        Ok(())
    }

    fn add_batch_sql(&mut self, sql: &str) -> Result<(), SqlMapperError> {
        lock(&self.state).record(DriverEvent::AddBatch {
            sql: sql.to_owned(),
        });
        self.batch.push(sql.to_owned());
        Ok(())
    }

    async fn execute_batch(&mut self) -> Result<Vec<i64>, SqlMapperError> {
        let entries = std::mem::take(&mut self.batch);
        let mut state = lock(&self.state);
        state.record(DriverEvent::ExecuteBatch {
            sql: self.sql.clone(),
            entries: entries.len(),
        });
        let mut update_counts = Vec::with_capacity(entries.len());
        for sql in &entries {
            if state.batch_fails(sql) {
                return Err(SqlMapperError::BatchUpdateError {
                    update_counts,
                    message: format!("mock driver rejected batch entry: {sql}"),
                });
            }
            update_counts.push(state.update_count_for(sql));
        }
        Ok(update_counts)
    }

    async fn close(&mut self) -> Result<(), SqlMapperError> {
        lock(&self.state).record(DriverEvent::StatementClosed {
            sql: self.sql.clone(),
        });
        Ok(())
    }
}
