use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use super::config::SharedSqliteConnection;
use super::params::row_value_to_sqlite_value;
use super::query::build_result_set;
use super::run_blocking;
use crate::driver::Statement;
use crate::error::SqlMapperError;
use crate::results::ResultSet;
use crate::types::{ColumnType, RowValues};

/// A statement over a shared `SQLite` connection. The rusqlite statement itself lives in
/// the connection's prepared-statement cache, so this only carries SQL and bindings.
pub struct SqliteStatement {
    conn: SharedSqliteConnection,
    auto_commit: Arc<AtomicBool>,
    sql: String,
    bindings: Vec<Value>,
    batch: Vec<Vec<Value>>,
    batch_sql: Vec<String>,
    timeout: Option<Duration>,
    closed: bool,
}

impl SqliteStatement {
    pub(crate) fn new(conn: SharedSqliteConnection, auto_commit: Arc<AtomicBool>, sql: String) -> Self {
        Self {
            conn,
            auto_commit,
            sql,
            bindings: Vec::new(),
            batch: Vec::new(),
            batch_sql: Vec::new(),
            timeout: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), SqlMapperError> {
        if self.closed {
            return Err(SqlMapperError::ExecutionError("statement is closed".to_string()));
        }
        Ok(())
    }

    async fn run_update(&self, sql: String, params: Vec<Value>) -> Result<i64, SqlMapperError> {
        self.ensure_open()?;
        let auto_commit = self.auto_commit.load(Ordering::SeqCst);
        let timeout = self.timeout;
        run_blocking(Arc::clone(&self.conn), move |conn| {
            prepare_connection(conn, auto_commit, timeout)?;
            let mut stmt = conn.prepare_cached(&sql)?;
            let changed = stmt.execute(params_from_iter(params.iter()))?;
            Ok(to_count(changed))
        })
        .await
    }

    async fn run_query(&self, sql: String, params: Vec<Value>) -> Result<ResultSet, SqlMapperError> {
        self.ensure_open()?;
        let auto_commit = self.auto_commit.load(Ordering::SeqCst);
        let timeout = self.timeout;
        run_blocking(Arc::clone(&self.conn), move |conn| {
            prepare_connection(conn, auto_commit, timeout)?;
            let mut stmt = conn.prepare_cached(&sql)?;
            build_result_set(&mut stmt, &params)
        })
        .await
    }
}

/// Apply the lock wait timeout and open the deferred transaction when auto-commit is off.
fn prepare_connection(
    conn: &rusqlite::Connection,
    auto_commit: bool,
    timeout: Option<Duration>,
) -> Result<(), SqlMapperError> {
    if let Some(timeout) = timeout {
        conn.busy_timeout(timeout)?;
    }
    if !auto_commit && conn.is_autocommit() {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

fn to_count(changed: usize) -> i64 {
    i64::try_from(changed).unwrap_or(i64::MAX)
}

#[async_trait]
impl Statement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(
        &mut self,
        index: usize,
        value: RowValues,
        _column_type: ColumnType,
    ) -> Result<(), SqlMapperError> {
        if index == 0 {
            return Err(SqlMapperError::BindingError(
                "parameter indexes start at 1".to_string(),
            ));
        }
        if self.bindings.len() < index {
            self.bindings.resize(index, Value::Null);
        }
        self.bindings[index - 1] = row_value_to_sqlite_value(&value);
        Ok(())
    }

    fn register_out_parameter(
        &mut self,
        index: usize,
        _column_type: ColumnType,
    ) -> Result<(), SqlMapperError> {
        Err(SqlMapperError::Unimplemented(format!(
            "SQLite has no OUT parameters (index {index})"
        )))
    }

    fn clear_parameters(&mut self) {
        self.bindings.clear();
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    async fn execute_update(&mut self) -> Result<i64, SqlMapperError> {
        self.run_update(self.sql.clone(), self.bindings.clone()).await
    }

    async fn execute_query(&mut self) -> Result<ResultSet, SqlMapperError> {
        self.run_query(self.sql.clone(), self.bindings.clone()).await
    }

    async fn execute_sql_update(&mut self, sql: &str) -> Result<i64, SqlMapperError> {
        self.run_update(sql.to_owned(), Vec::new()).await
    }

    async fn execute_sql_query(&mut self, sql: &str) -> Result<ResultSet, SqlMapperError> {
        self.run_query(sql.to_owned(), Vec::new()).await
    }

    fn add_batch(&mut self) -> Result<(), SqlMapperError> {
        self.ensure_open()?;
        self.batch.push(self.bindings.clone());
        Ok(())
    }

    fn add_batch_sql(&mut self, sql: &str) -> Result<(), SqlMapperError> {
        self.ensure_open()?;
        self.batch_sql.push(sql.to_owned());
        Ok(())
    }

    async fn execute_batch(&mut self) -> Result<Vec<i64>, SqlMapperError> {
        self.ensure_open()?;
        let entries: Vec<(String, Vec<Value>)> = if self.batch_sql.is_empty() {
            std::mem::take(&mut self.batch)
                .into_iter()
                .map(|params| (self.sql.clone(), params))
                .collect()
        } else {
            std::mem::take(&mut self.batch_sql)
                .into_iter()
                .map(|sql| (sql, Vec::new()))
                .collect()
        };
        let auto_commit = self.auto_commit.load(Ordering::SeqCst);
        let timeout = self.timeout;
        run_blocking(Arc::clone(&self.conn), move |conn| {
            prepare_connection(conn, auto_commit, timeout)?;
            let mut update_counts = Vec::with_capacity(entries.len());
            for (sql, params) in &entries {
                let executed = conn
                    .prepare_cached(sql)
                    .and_then(|mut stmt| stmt.execute(params_from_iter(params.iter())));
                match executed {
                    Ok(changed) => update_counts.push(to_count(changed)),
                    Err(e) => {
                        return Err(SqlMapperError::BatchUpdateError {
                            update_counts,
                            message: e.to_string(),
                        });
                    }
                }
            }
            Ok(update_counts)
        })
        .await
    }

    async fn close(&mut self) -> Result<(), SqlMapperError> {
        self.closed = true;
        self.bindings.clear();
        self.batch.clear();
        self.batch_sql.clear();
        Ok(())
    }
}
