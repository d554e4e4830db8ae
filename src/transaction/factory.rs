use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{LocalTransaction, ManagedTransaction, Transaction};
use crate::driver::{Connection, DataSource, IsolationLevel};

/// Creates transactions with one fixed commit policy.
pub trait TransactionFactory: Send + Sync {
    fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        level: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Box<dyn Transaction>;

    /// Wrap a connection the caller already opened.
    fn from_connection(&self, connection: Box<dyn Connection>) -> Box<dyn Transaction>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTransactionFactory {
    pub skip_set_auto_commit_on_close: bool,
}

impl TransactionFactory for LocalTransactionFactory {
    fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        level: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Box<dyn Transaction> {
        Box::new(LocalTransaction::new(
            data_source,
            level,
            auto_commit,
            self.skip_set_auto_commit_on_close,
        ))
    }

    fn from_connection(&self, connection: Box<dyn Connection>) -> Box<dyn Transaction> {
        Box::new(LocalTransaction::from_connection(connection))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedTransactionFactory {
    pub close_connection: bool,
}

impl Default for ManagedTransactionFactory {
    fn default() -> Self {
        Self {
            close_connection: true,
        }
    }
}

impl TransactionFactory for ManagedTransactionFactory {
    /// Auto-commit is the container's business and is ignored here.
    fn new_transaction(
        &self,
        data_source: Arc<dyn DataSource>,
        level: Option<IsolationLevel>,
        _auto_commit: bool,
    ) -> Box<dyn Transaction> {
        Box::new(ManagedTransaction::new(
            data_source,
            level,
            self.close_connection,
        ))
    }

    fn from_connection(&self, connection: Box<dyn Connection>) -> Box<dyn Transaction> {
        Box::new(ManagedTransaction::from_connection(
            connection,
            self.close_connection,
        ))
    }
}
