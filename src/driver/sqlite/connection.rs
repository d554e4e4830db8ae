use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bb8::PooledConnection;
use tracing::{debug, warn};

use super::config::{SharedSqliteConnection, SqliteManager};
use super::run_blocking;
use super::statement::SqliteStatement;
use crate::driver::{Connection, IsolationLevel, Statement};
use crate::error::SqlMapperError;

/// A pooled `SQLite` connection. With auto-commit off, the first statement opens a
/// transaction that lasts until commit or rollback.
pub struct SqliteConnection {
    conn: Option<PooledConnection<'static, SqliteManager>>,
    auto_commit: Arc<AtomicBool>,
}

impl SqliteConnection {
    pub(crate) fn new(conn: PooledConnection<'static, SqliteManager>) -> Self {
        Self {
            conn: Some(conn),
            auto_commit: Arc::new(AtomicBool::new(true)),
        }
    }

    fn handle(&self) -> Result<SharedSqliteConnection, SqlMapperError> {
        self.conn
            .as_ref()
            .map(|c| Arc::clone(&**c))
            .ok_or_else(|| SqlMapperError::ConnectionError("sqlite connection is closed".into()))
    }

    async fn finish_transaction(&self, command: &'static str) -> Result<(), SqlMapperError> {
        run_blocking(self.handle()?, move |conn| {
            if !conn.is_autocommit() {
                conn.execute_batch(command)?;
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn create_statement(&mut self) -> Result<Box<dyn Statement>, SqlMapperError> {
        Ok(Box::new(SqliteStatement::new(
            self.handle()?,
            Arc::clone(&self.auto_commit),
            String::new(),
        )))
    }

    async fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>, SqlMapperError> {
        let owned = sql.to_owned();
        run_blocking(self.handle()?, move |conn| {
            conn.prepare_cached(&owned)?;
            Ok(())
        })
        .await?;
        Ok(Box::new(SqliteStatement::new(
            self.handle()?,
            Arc::clone(&self.auto_commit),
            sql.to_owned(),
        )))
    }

    async fn prepare_call(&mut self, _sql: &str) -> Result<Box<dyn Statement>, SqlMapperError> {
        Err(SqlMapperError::Unimplemented(
            "SQLite has no stored procedures".to_string(),
        ))
    }

    async fn auto_commit(&mut self) -> Result<bool, SqlMapperError> {
        Ok(self.auto_commit.load(Ordering::SeqCst))
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlMapperError> {
        if auto_commit && !self.auto_commit.load(Ordering::SeqCst) {
            self.finish_transaction("COMMIT").await?;
        }
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
        Ok(())
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), SqlMapperError> {
        let pragma = match level {
            IsolationLevel::Serializable => "PRAGMA read_uncommitted = 0;",
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1;",
            other => {
                return Err(SqlMapperError::TransactionError(format!(
                    "SQLite does not support isolation level {other:?}"
                )));
            }
        };
        run_blocking(self.handle()?, move |conn| {
            conn.execute_batch(pragma)?;
            Ok(())
        })
        .await
    }

    async fn commit(&mut self) -> Result<(), SqlMapperError> {
        self.finish_transaction("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), SqlMapperError> {
        self.finish_transaction("ROLLBACK").await
    }

    async fn close(&mut self) -> Result<(), SqlMapperError> {
        if self.conn.is_none() {
            return Ok(());
        }
        if let Err(e) = self.finish_transaction("ROLLBACK").await {
            warn!(error = %e, "rollback of open sqlite transaction failed on close");
        }
        self.conn = None;
        debug!("sqlite connection returned to pool");
        Ok(())
    }

    fn describe(&self) -> String {
        "sqlite connection".to_string()
    }
}
