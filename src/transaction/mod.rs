//! Connection lifecycle under a fixed commit policy.
//!
//! [`LocalTransaction`] drives commit and rollback itself. [`ManagedTransaction`] leaves
//! both to an outer owner and only optionally closes the connection.

mod factory;
mod local;
mod managed;

use async_trait::async_trait;

pub use factory::{LocalTransactionFactory, ManagedTransactionFactory, TransactionFactory};
pub use local::LocalTransaction;
pub use managed::ManagedTransaction;

use crate::driver::Connection;
use crate::error::SqlMapperError;

/// Owns at most one live connection: unopened, then open, then closed for good.
#[async_trait]
pub trait Transaction: Send {
    /// The connection, opened on first use.
    ///
    /// # Errors
    /// Returns `SqlMapperError::TransactionError` if the connection cannot be opened or
    /// configured, or if the transaction is already closed.
    async fn connection(&mut self) -> Result<&mut dyn Connection, SqlMapperError>;

    async fn commit(&mut self) -> Result<(), SqlMapperError>;

    async fn rollback(&mut self) -> Result<(), SqlMapperError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<(), SqlMapperError>;

    /// Statement timeout imposed by the transaction, in seconds.
    fn timeout(&self) -> Option<u32> {
        None
    }
}

pub(crate) fn closed_error() -> SqlMapperError {
    SqlMapperError::TransactionError("Transaction is already closed".to_string())
}
