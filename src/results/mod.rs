mod keyed;
mod result_set;
mod row;

pub use keyed::KeyedRows;
pub use result_set::ResultSet;
pub use row::{CustomDbRow, FromRow};
