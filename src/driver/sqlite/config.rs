use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use tracing::debug;

use super::connection::SqliteConnection;
use crate::driver::{Connection, DataSource};
use crate::error::SqlMapperError;

pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Options for a `SQLite` data source.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub max_size: u32,
    /// Applied with `PRAGMA journal_mode = WAL` on every new connection; ignored in memory.
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            max_size: 4,
            wal: true,
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

/// bb8 manager for rusqlite connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    options: SqliteOptions,
}

impl SqliteManager {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = rusqlite::Error;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let options = self.options.clone();
        async move {
            let conn = rusqlite::Connection::open(&options.db_path)?;
            if options.wal && options.db_path != ":memory:" {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let conn = Arc::clone(conn);
        async move {
            let guard = conn.lock().map_err(|_| rusqlite::Error::InvalidQuery)?;
            guard.query_row("SELECT 1", [], |_| Ok(()))
        }
    }

    /// A connection still inside a transaction never goes back to the pool.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        match conn.try_lock() {
            Ok(guard) => !guard.is_autocommit(),
            Err(_) => true,
        }
    }
}

/// Pooled `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    pool: Pool<SqliteManager>,
}

impl SqliteDataSource {
    /// # Errors
    /// Returns `SqlMapperError::ConnectionError` if the pool cannot open its first connection.
    pub async fn new(options: SqliteOptions) -> Result<Self, SqlMapperError> {
        let max_size = options.max_size;
        let pool = Pool::builder()
            .max_size(max_size)
            .build(SqliteManager::new(options))
            .await
            .map_err(|e| {
                SqlMapperError::ConnectionError(format!("Failed to create SQLite pool: {e}"))
            })?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<SqliteManager> {
        &self.pool
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn get_connection(&self) -> Result<Box<dyn Connection>, SqlMapperError> {
        let pooled = self.pool.get_owned().await?;
        debug!(state = ?self.pool.state(), "checked out sqlite connection");
        Ok(Box::new(SqliteConnection::new(pooled)))
    }
}
