use std::sync::Arc;

use tracing::debug;

use super::configuration::Configuration;
use super::sql_session::SqlSession;
use crate::driver::{Connection, IsolationLevel};
use crate::error::SqlMapperError;
use crate::executor::ExecutorType;
use crate::transaction::{ManagedTransactionFactory, TransactionFactory};

/// Opens sessions over one [`Configuration`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SqlSessionFactory {
    configuration: Arc<Configuration>,
}

impl SqlSessionFactory {
    #[must_use]
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration: Arc::new(configuration),
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Session with the default executor type and auto-commit off.
    ///
    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if no environment is configured.
    pub fn open_session(&self) -> Result<SqlSession, SqlMapperError> {
        self.open_session_with(self.configuration.settings().default_executor_type, None, false)
    }

    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if no environment is configured.
    pub fn open_session_auto_commit(&self, auto_commit: bool) -> Result<SqlSession, SqlMapperError> {
        self.open_session_with(
            self.configuration.settings().default_executor_type,
            None,
            auto_commit,
        )
    }

    /// Session over a fresh transaction from the environment's data source. The connection
    /// is opened on first use.
    ///
    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if no environment is configured.
    pub fn open_session_with(
        &self,
        executor_type: ExecutorType,
        level: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Result<SqlSession, SqlMapperError> {
        let environment = self.configuration.environment().ok_or_else(|| {
            SqlMapperError::ConfigError(
                "No environment configured, a session needs a data source".to_string(),
            )
        })?;
        let transaction = environment.transaction_factory().new_transaction(
            Arc::clone(environment.data_source()),
            level,
            auto_commit,
        );
        let executor = self.configuration.new_executor(transaction, executor_type);
        debug!(
            environment = environment.id(),
            ?executor_type,
            ?level,
            auto_commit,
            "opened session"
        );
        Ok(SqlSession::new(
            Arc::clone(&self.configuration),
            executor,
            auto_commit,
        ))
    }

    /// Session over a connection the caller already holds. Auto-commit follows the
    /// connection, assuming on when the driver cannot report it. Without an environment the
    /// connection is wrapped in a managed transaction.
    pub async fn open_session_with_connection(
        &self,
        executor_type: ExecutorType,
        mut connection: Box<dyn Connection>,
    ) -> SqlSession {
        let auto_commit = match connection.auto_commit().await {
            Ok(auto_commit) => auto_commit,
            Err(e) => {
                debug!(error = %e, "driver did not report auto-commit, assuming true");
                true
            }
        };
        let transaction = match self.configuration.environment() {
            Some(environment) => environment.transaction_factory().from_connection(connection),
            None => ManagedTransactionFactory::default().from_connection(connection),
        };
        let executor = self.configuration.new_executor(transaction, executor_type);
        SqlSession::new(Arc::clone(&self.configuration), executor, auto_commit)
    }
}
