//! `SQLite` backend: a bb8 pool of rusqlite connections, driven through `spawn_blocking`.

mod config;
mod connection;
mod params;
mod query;
mod statement;

pub use config::{SharedSqliteConnection, SqliteDataSource, SqliteManager, SqliteOptions};
pub use connection::SqliteConnection;
pub use params::row_value_to_sqlite_value;
pub use query::sqlite_extract_value_sync;
pub use statement::SqliteStatement;

use crate::error::SqlMapperError;

/// Run `func` against the connection on the blocking pool.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlMapperError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlMapperError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock().map_err(|_| {
            SqlMapperError::ConnectionError("sqlite connection mutex poisoned".to_string())
        })?;
        func(&mut guard)
    })
    .await
    .map_err(|e| SqlMapperError::ExecutionError(format!("sqlite blocking task failed: {e}")))?
}
