use crate::driver::Statement;
use crate::error::SqlMapperError;
use crate::mapping::{BoundSql, ParameterMapping, ParameterMode};
use crate::types::{ColumnType, RowValues};

use super::value::ParamValue;

/// Reads each slot's value out of the parameter object and binds it to a statement.
#[derive(Debug, Clone, Copy)]
pub struct ParameterHandler<'a> {
    bound_sql: &'a BoundSql,
    column_type_for_null: ColumnType,
}

impl<'a> ParameterHandler<'a> {
    #[must_use]
    pub fn new(bound_sql: &'a BoundSql, column_type_for_null: ColumnType) -> Self {
        Self {
            bound_sql,
            column_type_for_null,
        }
    }

    /// Value for one slot: computed bindings win, a null object yields null, a simple
    /// object binds as itself, anything else is read by property path.
    ///
    /// # Errors
    /// Returns `SqlMapperError` if the property cannot be resolved or is not bindable.
    pub fn value_for(&self, mapping: &ParameterMapping) -> Result<RowValues, SqlMapperError> {
        resolve_parameter(self.bound_sql, &mapping.property)
    }

    /// Bind every IN/INOUT slot and register every OUT/INOUT slot on `statement`.
    ///
    /// # Errors
    /// Returns `SqlMapperError` naming the mapping that could not be bound.
    pub fn set_parameters(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError> {
        statement.clear_parameters();
        for (i, mapping) in self.bound_sql.parameter_mappings().iter().enumerate() {
            let index = i + 1;
            if mapping.mode != ParameterMode::In {
                let column_type = mapping.column_type.unwrap_or(ColumnType::Other);
                statement.register_out_parameter(index, column_type)?;
            }
            if mapping.mode == ParameterMode::Out {
                continue;
            }
            let value = self.value_for(mapping).map_err(|e| {
                SqlMapperError::BindingError(format!(
                    "Could not set parameters for mapping '{}'. Cause: {e}",
                    mapping.property
                ))
            })?;
            let column_type = match mapping.column_type {
                Some(column_type) => column_type,
                None if value.is_null() => self.column_type_for_null,
                None => value.natural_column_type(),
            };
            statement.bind(index, value, column_type)?;
        }
        Ok(())
    }
}

/// Shared by parameter binding and cache-key construction, so both read the same values.
pub(crate) fn resolve_parameter(
    bound_sql: &BoundSql,
    property: &str,
) -> Result<RowValues, SqlMapperError> {
    if bound_sql.has_additional_parameter(property) {
        let additional = ParamValue::Record(bound_sql.additional_parameters().clone());
        return additional.resolve(property)?.to_row_value();
    }
    let object = bound_sql.parameter_object();
    if object.is_null() {
        return Ok(RowValues::Null);
    }
    if object.is_simple() {
        return object.to_row_value();
    }
    object.resolve(property)?.to_row_value()
}
