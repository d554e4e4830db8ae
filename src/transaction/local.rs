use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Transaction, closed_error};
use crate::driver::{Connection, DataSource, IsolationLevel};
use crate::error::SqlMapperError;

/// Self-managed transaction: commit and rollback go straight to the connection.
///
/// Both are skipped while the connection is in auto-commit mode, since the driver already
/// committed every statement. On close, a connection left with auto-commit off is switched
/// back on before release; failures there are logged and swallowed.
pub struct LocalTransaction {
    data_source: Option<Arc<dyn DataSource>>,
    connection: Option<Box<dyn Connection>>,
    level: Option<IsolationLevel>,
    auto_commit: bool,
    skip_set_auto_commit_on_close: bool,
    closed: bool,
}

impl LocalTransaction {
    #[must_use]
    pub fn new(
        data_source: Arc<dyn DataSource>,
        level: Option<IsolationLevel>,
        auto_commit: bool,
        skip_set_auto_commit_on_close: bool,
    ) -> Self {
        Self {
            data_source: Some(data_source),
            connection: None,
            level,
            auto_commit,
            skip_set_auto_commit_on_close,
            closed: false,
        }
    }

    /// Wrap a connection that is already open; its settings are left untouched.
    #[must_use]
    pub fn from_connection(connection: Box<dyn Connection>) -> Self {
        Self {
            data_source: None,
            connection: Some(connection),
            level: None,
            auto_commit: false,
            skip_set_auto_commit_on_close: false,
            closed: false,
        }
    }

    async fn open_connection(&mut self) -> Result<(), SqlMapperError> {
        let Some(data_source) = &self.data_source else {
            return Err(SqlMapperError::TransactionError(
                "No data source or connection to open".to_string(),
            ));
        };
        debug!("Opening connection");
        let mut connection = data_source.get_connection().await.map_err(|e| {
            SqlMapperError::TransactionError(format!("Error opening connection. Cause: {e}"))
        })?;
        if let Some(level) = self.level {
            connection.set_isolation_level(level).await.map_err(|e| {
                SqlMapperError::TransactionError(format!(
                    "Error setting isolation level {level:?}. Cause: {e}"
                ))
            })?;
        }
        set_desired_auto_commit(connection.as_mut(), self.auto_commit).await?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Whether the held connection runs in auto-commit mode; false before it is opened.
    async fn connection_auto_commits(&mut self) -> Result<Option<bool>, SqlMapperError> {
        match self.connection.as_deref_mut() {
            Some(connection) => Ok(Some(connection.auto_commit().await?)),
            None => Ok(None),
        }
    }
}

async fn set_desired_auto_commit(
    connection: &mut dyn Connection,
    desired: bool,
) -> Result<(), SqlMapperError> {
    let configure = async {
        if connection.auto_commit().await? != desired {
            debug!(
                "Setting autocommit to {desired} on connection [{}]",
                connection.describe()
            );
            connection.set_auto_commit(desired).await?;
        }
        Ok::<(), SqlMapperError>(())
    };
    configure.await.map_err(|e| {
        SqlMapperError::TransactionError(format!(
            "Error configuring AutoCommit. Your driver may not support reading or setting \
             auto-commit. Requested setting: {desired}. Cause: {e}"
        ))
    })
}

#[async_trait]
impl Transaction for LocalTransaction {
    async fn connection(&mut self) -> Result<&mut dyn Connection, SqlMapperError> {
        if self.closed {
            return Err(closed_error());
        }
        if self.connection.is_none() {
            self.open_connection().await?;
        }
        self.connection
            .as_deref_mut()
            .map(|c| c as &mut dyn Connection)
            .ok_or_else(closed_error)
    }

    async fn commit(&mut self) -> Result<(), SqlMapperError> {
        if self.connection_auto_commits().await? == Some(false)
            && let Some(connection) = self.connection.as_deref_mut()
        {
            debug!("Committing connection [{}]", connection.describe());
            connection.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlMapperError> {
        if self.connection_auto_commits().await? == Some(false)
            && let Some(connection) = self.connection.as_deref_mut()
        {
            debug!("Rolling back connection [{}]", connection.describe());
            connection.rollback().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlMapperError> {
        self.closed = true;
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        if !self.skip_set_auto_commit_on_close {
            reset_auto_commit(connection.as_mut()).await;
        }
        debug!("Closing connection [{}]", connection.describe());
        connection.close().await
    }
}

/// Some drivers refuse to close a connection that is mid-transaction.
async fn reset_auto_commit(connection: &mut dyn Connection) {
    let reset = async {
        if !connection.auto_commit().await? {
            debug!(
                "Resetting autocommit to true on connection [{}]",
                connection.describe()
            );
            connection.set_auto_commit(true).await?;
        }
        Ok::<(), SqlMapperError>(())
    };
    if let Err(e) = reset.await {
        warn!(
            "Error resetting autocommit to true before closing the connection [{}]. Cause: {e}",
            connection.describe()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{DriverEvent, MockDataSource};

    #[tokio::test]
    async fn opens_lazily_and_only_once() {
        let ds = MockDataSource::new();
        let mut tx = LocalTransaction::new(Arc::new(ds.clone()), None, false, false);
        assert_eq!(ds.connections_opened(), 0);
        tx.connection().await.unwrap();
        tx.connection().await.unwrap();
        assert_eq!(ds.connections_opened(), 1);
    }

    #[tokio::test]
    async fn commit_skipped_under_auto_commit() {
        let ds = MockDataSource::new();
        let mut tx = LocalTransaction::new(Arc::new(ds.clone()), None, true, false);
        tx.connection().await.unwrap();
        tx.commit().await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit | DriverEvent::Rollback)), 0);
    }

    #[tokio::test]
    async fn close_restores_auto_commit_and_suppresses_reset_errors() {
        let ds = MockDataSource::new();
        let mut tx = LocalTransaction::new(Arc::new(ds.clone()), None, false, false);
        tx.connection().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit)), 1);

        ds.fail_set_auto_commit(true);
        tx.close().await.unwrap();
        tx.close().await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Close)), 1);
        assert!(tx.connection().await.is_err());
    }

    #[tokio::test]
    async fn isolation_failure_is_a_transaction_error() {
        let ds = MockDataSource::new();
        ds.fail_isolation(true);
        let mut tx = LocalTransaction::new(
            Arc::new(ds.clone()),
            Some(IsolationLevel::Serializable),
            false,
            false,
        );
        let err = tx.connection().await.err().unwrap();
        assert!(matches!(err, SqlMapperError::TransactionError(_)));
    }
}
