use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Transaction, closed_error};
use crate::driver::{Connection, DataSource, IsolationLevel};
use crate::error::SqlMapperError;

/// Container-managed transaction: commit and rollback belong to whoever owns the
/// connection, so both are no-ops here. `close` releases the connection only when
/// `close_connection` is set.
pub struct ManagedTransaction {
    data_source: Option<Arc<dyn DataSource>>,
    connection: Option<Box<dyn Connection>>,
    level: Option<IsolationLevel>,
    close_connection: bool,
    closed: bool,
}

impl ManagedTransaction {
    #[must_use]
    pub fn new(
        data_source: Arc<dyn DataSource>,
        level: Option<IsolationLevel>,
        close_connection: bool,
    ) -> Self {
        Self {
            data_source: Some(data_source),
            connection: None,
            level,
            close_connection,
            closed: false,
        }
    }

    #[must_use]
    pub fn from_connection(connection: Box<dyn Connection>, close_connection: bool) -> Self {
        Self {
            data_source: None,
            connection: Some(connection),
            level: None,
            close_connection,
            closed: false,
        }
    }

    async fn open_connection(&mut self) -> Result<(), SqlMapperError> {
        let Some(data_source) = &self.data_source else {
            return Err(SqlMapperError::TransactionError(
                "No data source or connection to open".to_string(),
            ));
        };
        debug!("Opening managed connection");
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
        self.connection = Some(connection);
        Ok(())
    }
}

#[async_trait]
impl Transaction for ManagedTransaction {
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
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlMapperError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlMapperError> {
        self.closed = true;
        if !self.close_connection {
            return Ok(());
        }
        match self.connection.take() {
            Some(mut connection) => {
                debug!("Closing connection [{}]", connection.describe());
                connection.close().await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{DriverEvent, MockDataSource};

    #[tokio::test]
    async fn never_commits_or_rolls_back() {
        let ds = MockDataSource::new();
        let mut tx = ManagedTransaction::new(Arc::new(ds.clone()), None, true);
        tx.connection().await.unwrap();
        tx.commit().await.unwrap();
        tx.rollback().await.unwrap();
        tx.close().await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit | DriverEvent::Rollback)), 0);
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Close)), 1);
    }

    #[tokio::test]
    async fn leaves_connection_open_unless_asked() {
        let ds = MockDataSource::new();
        let mut tx = ManagedTransaction::new(Arc::new(ds.clone()), None, false);
        tx.connection().await.unwrap();
        tx.close().await.unwrap();
        assert_eq!(ds.count(|e| matches!(e, DriverEvent::Close)), 0);
    }
}
