//! Call binding: mapper interfaces described as data, turned into statement executions.
//!
//! A mapper is a type implementing [`Mapper`]: a name (the statement namespace) and a table
//! of [`MethodDecl`]s. [`MapperRegistry`] holds one factory per mapper type; a factory hands
//! out [`MapperProxy`] values bound to one session, and the proxy runs each call through a
//! [`MapperMethod`] derived once per method and shared by every proxy of that mapper.
//!
//! Typed call sites are thin adapters over [`MapperProxy::invoke`]:
//!
//! ```rust
//! use sql_mapper::prelude::*;
//!
//! struct UserMapper;
//!
//! impl Mapper for UserMapper {
//!     const NAME: &'static str = "users";
//!
//!     fn methods() -> Vec<MethodDecl> {
//!         vec![
//!             MethodDecl::new("count").returns(ReturnType::Primitive(ScalarType::Long)),
//!             MethodDecl::new("rename")
//!                 .named("id")
//!                 .named("name")
//!                 .returns(ReturnType::Boxed(ScalarType::Bool)),
//!         ]
//!     }
//! }
//! ```

mod method;
mod proxy;
mod registry;
mod value;

use std::fmt;

pub use method::{MapperMethod, MethodSignature, ParamNameResolver, SqlCommand};
pub use proxy::MapperProxy;
pub use registry::{MapperProxyFactory, MapperRegistry};
pub use value::MapperValue;

use crate::executor::ResultHandler;
use crate::mapping::RowBounds;
use crate::param::ParamValue;

/// A mapper interface: a namespace plus the methods it declares.
pub trait Mapper: 'static {
    /// Namespace of the mapper's statements, e.g. `app.UserMapper`.
    const NAME: &'static str;

    fn methods() -> Vec<MethodDecl>;
}

/// Scalar kinds a method can declare as its return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int,
    Long,
    Bool,
    Double,
    Text,
}

/// Declared return shape of a mapper method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnType {
    #[default]
    Void,
    /// Cannot represent absence: a missing result is an error.
    Primitive(ScalarType),
    /// May be absent.
    Boxed(ScalarType),
    /// One row, or none.
    Row,
    List,
    Array,
    /// Rows keyed by the method's map-key column.
    Map,
}

impl ReturnType {
    #[must_use]
    pub fn is_primitive(self) -> bool {
        matches!(self, ReturnType::Primitive(_))
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scalar = |s: &ScalarType, boxed: bool| match (s, boxed) {
            (ScalarType::Int, false) => "i32",
            (ScalarType::Int, true) => "Option<i32>",
            (ScalarType::Long, false) => "i64",
            (ScalarType::Long, true) => "Option<i64>",
            (ScalarType::Bool, false) => "bool",
            (ScalarType::Bool, true) => "Option<bool>",
            (ScalarType::Double, false) => "f64",
            (ScalarType::Double, true) => "Option<f64>",
            (ScalarType::Text, false) => "String",
            (ScalarType::Text, true) => "Option<String>",
        };
        match self {
            ReturnType::Void => f.write_str("()"),
            ReturnType::Primitive(s) => f.write_str(scalar(s, false)),
            ReturnType::Boxed(s) => f.write_str(scalar(s, true)),
            ReturnType::Row => f.write_str("Option<Row>"),
            ReturnType::List => f.write_str("Vec<Row>"),
            ReturnType::Array => f.write_str("[Row]"),
            ReturnType::Map => f.write_str("Map<Key, Row>"),
        }
    }
}

/// One declared parameter of a mapper method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamDecl {
    /// Carries an explicit alias.
    Named(String),
    /// Named by its position among the usable parameters.
    Positional,
    RowBounds,
    ResultHandler,
}

/// Declaration of one mapper method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    /// Namespace of the mapper that originally declares the method, when inherited.
    pub declaring_type: Option<String>,
    pub params: Vec<ParamDecl>,
    pub return_type: ReturnType,
    pub map_key: Option<String>,
    /// Bind to a flush of pending batch statements when no statement matches.
    pub flush: bool,
}

impl MethodDecl {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type: None,
            params: Vec::new(),
            return_type: ReturnType::Void,
            map_key: None,
            flush: false,
        }
    }

    #[must_use]
    pub fn named(mut self, alias: impl Into<String>) -> Self {
        self.params.push(ParamDecl::Named(alias.into()));
        self
    }

    #[must_use]
    pub fn positional(mut self) -> Self {
        self.params.push(ParamDecl::Positional);
        self
    }

    #[must_use]
    pub fn row_bounds(mut self) -> Self {
        self.params.push(ParamDecl::RowBounds);
        self
    }

    #[must_use]
    pub fn result_handler(mut self) -> Self {
        self.params.push(ParamDecl::ResultHandler);
        self
    }

    #[must_use]
    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    #[must_use]
    pub fn map_key(mut self, column: impl Into<String>) -> Self {
        self.map_key = Some(column.into());
        self
    }

    #[must_use]
    pub fn flush(mut self) -> Self {
        self.flush = true;
        self
    }

    #[must_use]
    pub fn declared_by(mut self, namespace: impl Into<String>) -> Self {
        self.declaring_type = Some(namespace.into());
        self
    }
}

/// One actual argument of a mapper call, positionally matching the method's
/// [`ParamDecl`]s.
pub enum Arg<'h> {
    Value(ParamValue),
    RowBounds(RowBounds),
    ResultHandler(&'h mut (dyn ResultHandler + Send)),
}

impl Arg<'_> {
    pub fn value(value: impl Into<ParamValue>) -> Self {
        Arg::Value(value.into())
    }
}

impl From<ParamValue> for Arg<'_> {
    fn from(value: ParamValue) -> Self {
        Arg::Value(value)
    }
}

impl From<RowBounds> for Arg<'_> {
    fn from(value: RowBounds) -> Self {
        Arg::RowBounds(value)
    }
}

impl<'h> From<&'h mut (dyn ResultHandler + Send)> for Arg<'h> {
    fn from(value: &'h mut (dyn ResultHandler + Send)) -> Self {
        Arg::ResultHandler(value)
    }
}

impl fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Arg::RowBounds(b) => f.debug_tuple("RowBounds").field(b).finish(),
            Arg::ResultHandler(_) => f.write_str("ResultHandler"),
        }
    }
}
