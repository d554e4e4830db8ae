//! Statement execution, two-level result caching and typed mapper binding over async SQL
//! drivers.
//!
//! A [`session::Configuration`] holds mapped statements grouped into namespaces, each
//! optionally with a shared cache. A [`session::SqlSessionFactory`] opens
//! [`session::SqlSession`]s, each owning one executor and one transaction. Mappers bind
//! declared methods to statements by name.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sql_mapper::prelude::*;
//!
//! # async fn run() -> Result<(), SqlMapperError> {
//! let data_source = SqliteDataSource::new(SqliteOptions::new("app.db")).await?;
//! let environment = Environment::new(
//!     "dev",
//!     Arc::new(LocalTransactionFactory::default()),
//!     Arc::new(data_source),
//! );
//! let configuration = Configuration::builder()
//!     .environment(environment)
//!     .namespace(
//!         Namespace::new("app.users")
//!             .cache(CacheSettings::default())
//!             .select("find", "select id, name from users where id = #{id}")?,
//!     )
//!     .build()?;
//! let factory = SqlSessionFactory::new(configuration);
//!
//! let mut session = factory.open_session()?;
//! let user = session.select_one("app.users.find", 1_i64).await?;
//! # let _ = user;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod cache;
pub mod driver;
pub mod error;
pub mod executor;
pub mod mapping;
pub mod param;
pub mod prelude;
pub mod results;
pub mod session;
pub mod transaction;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::SqlMapperError;
pub use results::{CustomDbRow, FromRow, ResultSet};
pub use types::{ColumnType, RowValues};
