//! Statement descriptors and the per-invocation SQL they render to.

mod bound_sql;
mod row_bounds;
mod sql_source;
mod statement;

pub use bound_sql::{BoundSql, ParameterMapping, ParameterMode};
pub use row_bounds::RowBounds;
pub use sql_source::{RawSqlSource, SqlSource, StaticSqlSource};
pub use statement::{MappedStatement, MappedStatementBuilder, SqlCommandType, StatementType};
