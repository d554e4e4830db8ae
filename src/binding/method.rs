use tracing::debug;

use super::value::MapperValue;
use super::{Arg, MethodDecl, ParamDecl, ReturnType, ScalarType};
use crate::error::SqlMapperError;
use crate::executor::ResultHandler;
use crate::mapping::{RowBounds, SqlCommandType};
use crate::param::{ParamMap, ParamValue};
use crate::results::CustomDbRow;
use crate::session::{Configuration, SqlSession};
use crate::types::RowValues;

const GENERIC_NAME_PREFIX: &str = "param";

/// The statement a method is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCommand {
    name: String,
    command_type: SqlCommandType,
}

impl SqlCommand {
    /// Look up `<mapper>.<method>`, then `<declaring type>.<method>`; a method marked as
    /// flush binds to [`SqlCommandType::Flush`] when neither exists.
    ///
    /// # Errors
    /// Returns `SqlMapperError::BindingError` when no statement is bound to the method.
    pub fn resolve(
        configuration: &Configuration,
        mapper_name: &str,
        decl: &MethodDecl,
    ) -> Result<Self, SqlMapperError> {
        let direct = format!("{mapper_name}.{}", decl.name);
        let mut candidates = vec![direct.clone()];
        if let Some(declaring) = decl.declaring_type.as_deref()
            && declaring != mapper_name
        {
            candidates.push(format!("{declaring}.{}", decl.name));
        }
        for candidate in candidates {
            if configuration.has_statement(&candidate) {
                let statement = configuration.mapped_statement(&candidate)?;
                return Ok(Self {
                    name: statement.id().to_owned(),
                    command_type: statement.command_type(),
                });
            }
        }
        if decl.flush {
            return Ok(Self {
                name: String::new(),
                command_type: SqlCommandType::Flush,
            });
        }
        Err(SqlMapperError::BindingError(format!(
            "Invalid bound statement (not found): {direct}"
        )))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }
}

/// Names of a method's usable parameters, by argument position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamNameResolver {
    names: Vec<(usize, String)>,
    has_named_parameters: bool,
}

impl ParamNameResolver {
    #[must_use]
    pub fn new(params: &[ParamDecl]) -> Self {
        let mut names = Vec::new();
        let mut has_named_parameters = false;
        for (index, param) in params.iter().enumerate() {
            let name = match param {
                ParamDecl::RowBounds | ParamDecl::ResultHandler => continue,
                ParamDecl::Named(alias) => {
                    has_named_parameters = true;
                    alias.clone()
                }
                ParamDecl::Positional => names.len().to_string(),
            };
            names.push((index, name));
        }
        Self {
            names,
            has_named_parameters,
        }
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.names.iter().map(|(_, n)| n.as_str()).collect()
    }

    #[must_use]
    pub fn has_named_parameters(&self) -> bool {
        self.has_named_parameters
    }

    /// No usable parameters yield `Null`; a single unnamed one is passed through as-is;
    /// anything else becomes a [`ParamMap`] holding each declared name plus a generic
    /// `paramN` alias that never overrides a declared name.
    ///
    /// # Errors
    /// Returns `SqlMapperError::BindingError` if a usable position holds no value.
    pub fn named_params(&self, args: &[Arg<'_>]) -> Result<ParamValue, SqlMapperError> {
        match self.names.as_slice() {
            [] => Ok(ParamValue::Null),
            [(index, _)] if !self.has_named_parameters => value_at(args, *index).cloned(),
            names => {
                let mut param = ParamMap::new();
                for (i, (index, name)) in names.iter().enumerate() {
                    let value = value_at(args, *index)?;
                    param.insert(name.clone(), value.clone());
                    let generic = format!("{GENERIC_NAME_PREFIX}{}", i + 1);
                    if !param.contains_key(&generic) {
                        param.insert(generic, value.clone());
                    }
                }
                Ok(ParamValue::Map(param))
            }
        }
    }
}

fn value_at<'a>(args: &'a [Arg<'_>], index: usize) -> Result<&'a ParamValue, SqlMapperError> {
    match args.get(index) {
        Some(Arg::Value(value)) => Ok(value),
        Some(other) => Err(SqlMapperError::BindingError(format!(
            "Argument {index} should be a value but was {other:?}"
        ))),
        None => Err(SqlMapperError::BindingError(format!(
            "Missing argument at position {index}"
        ))),
    }
}

/// Return shape and special-argument positions of one method, classified once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    return_type: ReturnType,
    returns_void: bool,
    returns_many: bool,
    returns_map: bool,
    map_key: Option<String>,
    arg_count: usize,
    row_bounds_index: Option<usize>,
    result_handler_index: Option<usize>,
    param_name_resolver: ParamNameResolver,
}

impl MethodSignature {
    /// # Errors
    /// Returns `SqlMapperError::BindingError` if the method declares more than one
    /// `RowBounds` or `ResultHandler` parameter.
    pub fn new(decl: &MethodDecl) -> Result<Self, SqlMapperError> {
        let return_type = decl.return_type;
        let map_key = match return_type {
            ReturnType::Map => decl.map_key.clone(),
            _ => None,
        };
        Ok(Self {
            return_type,
            returns_void: return_type == ReturnType::Void,
            returns_many: matches!(return_type, ReturnType::List | ReturnType::Array),
            returns_map: map_key.is_some(),
            map_key,
            arg_count: decl.params.len(),
            row_bounds_index: unique_index(decl, &ParamDecl::RowBounds)?,
            result_handler_index: unique_index(decl, &ParamDecl::ResultHandler)?,
            param_name_resolver: ParamNameResolver::new(&decl.params),
        })
    }

    #[must_use]
    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.returns_void
    }

    #[must_use]
    pub fn returns_many(&self) -> bool {
        self.returns_many
    }

    #[must_use]
    pub fn returns_map(&self) -> bool {
        self.returns_map
    }

    #[must_use]
    pub fn map_key(&self) -> Option<&str> {
        self.map_key.as_deref()
    }

    #[must_use]
    pub fn has_row_bounds(&self) -> bool {
        self.row_bounds_index.is_some()
    }

    #[must_use]
    pub fn has_result_handler(&self) -> bool {
        self.result_handler_index.is_some()
    }

    #[must_use]
    pub fn param_name_resolver(&self) -> &ParamNameResolver {
        &self.param_name_resolver
    }

    /// # Errors
    /// See [`ParamNameResolver::named_params`].
    pub fn convert_args_to_sql_command_param(
        &self,
        args: &[Arg<'_>],
    ) -> Result<ParamValue, SqlMapperError> {
        self.param_name_resolver.named_params(args)
    }

    #[must_use]
    pub fn extract_row_bounds(&self, args: &[Arg<'_>]) -> RowBounds {
        match self.row_bounds_index.and_then(|i| args.get(i)) {
            Some(Arg::RowBounds(bounds)) => *bounds,
            _ => RowBounds::DEFAULT,
        }
    }
}

fn unique_index(decl: &MethodDecl, wanted: &ParamDecl) -> Result<Option<usize>, SqlMapperError> {
    let mut found = None;
    for (i, param) in decl.params.iter().enumerate() {
        if param == wanted {
            if found.is_some() {
                return Err(SqlMapperError::BindingError(format!(
                    "{} cannot have multiple {wanted:?} parameters",
                    decl.name
                )));
            }
            found = Some(i);
        }
    }
    Ok(found)
}

/// A bound mapper method: the statement it runs and how its arguments and result are
/// shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperMethod {
    command: SqlCommand,
    method: MethodSignature,
}

impl MapperMethod {
    /// # Errors
    /// Returns `SqlMapperError::BindingError` if no statement is bound to the method or its
    /// parameters are malformed.
    pub fn new(
        configuration: &Configuration,
        mapper_name: &str,
        decl: &MethodDecl,
    ) -> Result<Self, SqlMapperError> {
        let command = SqlCommand::resolve(configuration, mapper_name, decl)?;
        let method = MethodSignature::new(decl)?;
        debug!(
            mapper = mapper_name,
            method = %decl.name,
            statement = command.name(),
            "bound mapper method"
        );
        Ok(Self { command, method })
    }

    #[must_use]
    pub fn command(&self) -> &SqlCommand {
        &self.command
    }

    #[must_use]
    pub fn signature(&self) -> &MethodSignature {
        &self.method
    }

    /// Run the bound statement on `session`.
    ///
    /// # Errors
    /// Propagates execution errors; returns `SqlMapperError::BindingError` for argument
    /// mismatches, unsupported return types and a missing result for a primitive return.
    pub async fn execute(
        &self,
        session: &mut SqlSession,
        mut args: Vec<Arg<'_>>,
    ) -> Result<MapperValue, SqlMapperError> {
        if args.len() != self.method.arg_count {
            return Err(SqlMapperError::BindingError(format!(
                "Mapper method '{}' expects {} arguments but got {}",
                self.command.name,
                self.method.arg_count,
                args.len()
            )));
        }
        let name = self.command.name.as_str();
        let result = match self.command.command_type {
            SqlCommandType::Insert => {
                let param = self.method.convert_args_to_sql_command_param(&args)?;
                self.row_count_result(session.insert(name, param).await?)?
            }
            SqlCommandType::Update => {
                let param = self.method.convert_args_to_sql_command_param(&args)?;
                self.row_count_result(session.update(name, param).await?)?
            }
            SqlCommandType::Delete => {
                let param = self.method.convert_args_to_sql_command_param(&args)?;
                self.row_count_result(session.delete(name, param).await?)?
            }
            SqlCommandType::Select => {
                if self.method.returns_void && self.method.has_result_handler() {
                    self.execute_with_result_handler(session, &mut args).await?;
                    MapperValue::Null
                } else if self.method.returns_many {
                    self.execute_for_many(session, &args).await?
                } else if self.method.returns_map {
                    self.execute_for_map(session, &args).await?
                } else {
                    let param = self.method.convert_args_to_sql_command_param(&args)?;
                    let row = session.select_one(name, param).await?;
                    self.single_result(row)?
                }
            }
            SqlCommandType::Flush => MapperValue::BatchResults(session.flush_statements().await?),
        };
        if result.is_null() && self.method.return_type.is_primitive() {
            return Err(SqlMapperError::BindingError(format!(
                "Mapper method '{name}' attempted to return null from a method with a primitive \
                 return type ({}).",
                self.method.return_type
            )));
        }
        Ok(result)
    }

    fn row_count_result(&self, row_count: i64) -> Result<MapperValue, SqlMapperError> {
        let unsupported = || {
            SqlMapperError::BindingError(format!(
                "Mapper method '{}' has an unsupported return type: {}",
                self.command.name, self.method.return_type
            ))
        };
        match self.method.return_type {
            ReturnType::Void => Ok(MapperValue::Null),
            ReturnType::Primitive(scalar) | ReturnType::Boxed(scalar) => match scalar {
                ScalarType::Int => i32::try_from(row_count)
                    .map(MapperValue::Int)
                    .map_err(|_| unsupported()),
                ScalarType::Long => Ok(MapperValue::Long(row_count)),
                ScalarType::Bool => Ok(MapperValue::Bool(row_count > 0)),
                ScalarType::Double | ScalarType::Text => Err(unsupported()),
            },
            _ => Err(unsupported()),
        }
    }

    /// Shape a single-row select: scalar returns read the row's first column.
    fn single_result(&self, row: Option<CustomDbRow>) -> Result<MapperValue, SqlMapperError> {
        let Some(row) = row else {
            return Ok(MapperValue::Null);
        };
        let scalar = match self.method.return_type {
            ReturnType::Primitive(s) | ReturnType::Boxed(s) => s,
            ReturnType::Void => return Ok(MapperValue::Null),
            _ => return Ok(MapperValue::Row(row)),
        };
        let value = row.get_by_index(0).cloned().unwrap_or(RowValues::Null);
        if value.is_null() {
            return Ok(MapperValue::Null);
        }
        let mismatch = || {
            SqlMapperError::BindingError(format!(
                "Mapper method '{}' cannot convert {value:?} to {}",
                self.command.name, self.method.return_type
            ))
        };
        match scalar {
            ScalarType::Int => value
                .as_int()
                .and_then(|v| i32::try_from(*v).ok())
                .map(MapperValue::Int)
                .ok_or_else(mismatch),
            ScalarType::Long => value.as_int().map(|v| MapperValue::Long(*v)).ok_or_else(mismatch),
            ScalarType::Bool => value.as_bool().map(MapperValue::Bool).ok_or_else(mismatch),
            ScalarType::Double | ScalarType::Text => Ok(MapperValue::Scalar(value)),
        }
    }

    async fn execute_with_result_handler(
        &self,
        session: &mut SqlSession,
        args: &mut [Arg<'_>],
    ) -> Result<(), SqlMapperError> {
        let statement = session
            .configuration()
            .mapped_statement(&self.command.name)?;
        if statement.result_type() == Some("void") {
            return Err(SqlMapperError::BindingError(format!(
                "method {} needs a result type so a ResultHandler can be used as a parameter.",
                self.command.name
            )));
        }
        let param = self.method.convert_args_to_sql_command_param(args)?;
        let row_bounds = self.method.extract_row_bounds(args);
        let handler: &mut (dyn ResultHandler + Send) = match self
            .method
            .result_handler_index
            .and_then(|i| args.get_mut(i))
        {
            Some(Arg::ResultHandler(handler)) => &mut **handler,
            _ => {
                return Err(SqlMapperError::BindingError(format!(
                    "Mapper method '{}' expects a result handler argument",
                    self.command.name
                )));
            }
        };
        session
            .select(&self.command.name, param, row_bounds, handler)
            .await
    }

    async fn execute_for_many(
        &self,
        session: &mut SqlSession,
        args: &[Arg<'_>],
    ) -> Result<MapperValue, SqlMapperError> {
        let param = self.method.convert_args_to_sql_command_param(args)?;
        let row_bounds = self.method.extract_row_bounds(args);
        let rows = session
            .select_list_with_bounds(&self.command.name, param, row_bounds)
            .await?;
        Ok(match self.method.return_type {
            ReturnType::Array => MapperValue::Array(rows.into_boxed_slice()),
            _ => MapperValue::List(rows),
        })
    }

    async fn execute_for_map(
        &self,
        session: &mut SqlSession,
        args: &[Arg<'_>],
    ) -> Result<MapperValue, SqlMapperError> {
        let param = self.method.convert_args_to_sql_command_param(args)?;
        let row_bounds = self.method.extract_row_bounds(args);
        let map_key = self.method.map_key.as_deref().unwrap_or_default();
        let map = session
            .select_map_with_bounds(&self.command.name, param, map_key, row_bounds)
            .await?;
        Ok(MapperValue::Map(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(decl: MethodDecl) -> ParamNameResolver {
        ParamNameResolver::new(&decl.params)
    }

    #[test]
    fn no_usable_params_is_null() {
        let r = resolver(MethodDecl::new("all").row_bounds());
        assert_eq!(r.named_params(&[Arg::RowBounds(RowBounds::DEFAULT)]).unwrap(), ParamValue::Null);
    }

    #[test]
    fn single_unnamed_param_passes_through() {
        let r = resolver(MethodDecl::new("find").positional());
        let record = ParamValue::record([("id", ParamValue::from(3_i64))]);
        assert_eq!(r.named_params(&[Arg::Value(record.clone())]).unwrap(), record);
    }

    #[test]
    fn two_positional_params_get_index_and_generic_names() {
        let r = resolver(MethodDecl::new("find").positional().positional());
        let param = r
            .named_params(&[Arg::value(1_i64), Arg::value("x")])
            .unwrap();
        let ParamValue::Map(map) = param else { panic!("expected a map") };
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["0", "1", "param1", "param2"]);
        assert_eq!(map.get("param2").unwrap(), &ParamValue::from("x"));
        let err = map.get("name").unwrap_err();
        assert!(matches!(err, SqlMapperError::ParameterNotFound { ref available, .. } if available.len() == 4));
    }

    #[test]
    fn special_params_are_skipped_when_numbering() {
        let r = resolver(MethodDecl::new("page").row_bounds().positional());
        assert_eq!(r.names(), vec!["0"]);
    }

    #[test]
    fn explicit_alias_wins_over_generic_name() {
        let r = resolver(MethodDecl::new("odd").named("param2").positional());
        let param = r
            .named_params(&[Arg::value("aliased"), Arg::value("second")])
            .unwrap();
        let ParamValue::Map(map) = param else { panic!("expected a map") };
        assert_eq!(map.get("param2").unwrap(), &ParamValue::from("aliased"));
        assert_eq!(map.get("1").unwrap(), &ParamValue::from("second"));
    }

    #[test]
    fn single_named_param_is_wrapped() {
        let r = resolver(MethodDecl::new("find").named("id"));
        let ParamValue::Map(map) = r.named_params(&[Arg::value(5_i64)]).unwrap() else {
            panic!("expected a map")
        };
        assert_eq!(map.get("id").unwrap(), &ParamValue::from(5_i64));
        assert_eq!(map.get("param1").unwrap(), &ParamValue::from(5_i64));
    }

    #[test]
    fn duplicate_row_bounds_are_rejected() {
        let decl = MethodDecl::new("page").row_bounds().row_bounds();
        assert!(MethodSignature::new(&decl).is_err());
    }

    #[test]
    fn map_key_only_counts_for_map_returns() {
        let list = MethodSignature::new(&MethodDecl::new("a").map_key("id").returns(ReturnType::List)).unwrap();
        assert!(list.returns_many() && !list.returns_map());
        let map = MethodSignature::new(&MethodDecl::new("b").map_key("id").returns(ReturnType::Map)).unwrap();
        assert!(map.returns_map());
        assert_eq!(map.map_key(), Some("id"));
    }
}
