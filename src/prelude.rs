//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::binding::{
    Arg, Mapper, MapperProxy, MapperRegistry, MapperValue, MethodDecl, ParamDecl, ReturnType,
    ScalarType,
};
pub use crate::cache::{CacheBuilder, CacheKey, CacheSettings, EvictionPolicy, SharedCache};
pub use crate::driver::{Connection, DataSource, IsolationLevel, Statement};
pub use crate::error::SqlMapperError;
pub use crate::executor::{
    BatchResult, DefaultResultHandler, Executor, ExecutorType, Interceptor, LocalCacheScope,
    MapResultHandler, ResultContext, ResultHandler,
};
pub use crate::mapping::{
    MappedStatement, ParameterMapping, ParameterMode, RawSqlSource, RowBounds, SqlCommandType,
    StatementType, StaticSqlSource,
};
pub use crate::param::{ParamMap, ParamValue};
pub use crate::results::{CustomDbRow, FromRow, KeyedRows, ResultSet};
pub use crate::session::{
    Configuration, ConfigurationBuilder, Environment, Namespace, Settings, SqlSession,
    SqlSessionFactory,
};
pub use crate::transaction::{
    LocalTransactionFactory, ManagedTransactionFactory, Transaction, TransactionFactory,
};
pub use crate::types::{ColumnType, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::driver::sqlite::{SqliteDataSource, SqliteOptions};
