use std::fmt;
use std::sync::Arc;

use crate::driver::DataSource;
use crate::transaction::TransactionFactory;

/// Where sessions get their connections and how they manage transactions.
///
/// The id becomes part of every cache key, so caches never mix results from two
/// environments.
#[derive(Clone)]
pub struct Environment {
    id: String,
    transaction_factory: Arc<dyn TransactionFactory>,
    data_source: Arc<dyn DataSource>,
}

impl Environment {
    pub fn new(
        id: impl Into<String>,
        transaction_factory: Arc<dyn TransactionFactory>,
        data_source: Arc<dyn DataSource>,
    ) -> Self {
        Self {
            id: id.into(),
            transaction_factory,
            data_source,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn transaction_factory(&self) -> &Arc<dyn TransactionFactory> {
        &self.transaction_factory
    }

    #[must_use]
    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
