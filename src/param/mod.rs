//! Parameter objects and how statement parameters are read out of them.

mod handler;
mod property;
mod value;

pub use handler::ParameterHandler;
pub(crate) use handler::resolve_parameter;
pub use property::PropertyTokenizer;
pub use value::{ParamMap, ParamValue};
