use std::collections::BTreeMap;

use crate::param::{ParamValue, PropertyTokenizer};
use crate::types::ColumnType;

/// Direction of a parameter slot; only callable statements use `Out`/`InOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

/// One `?` slot of a bound statement: where its value comes from and how to bind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMapping {
    pub property: String,
    pub column_type: Option<ColumnType>,
    pub mode: ParameterMode,
}

impl ParameterMapping {
    #[must_use]
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column_type: None,
            mode: ParameterMode::In,
        }
    }

    #[must_use]
    pub fn with_column_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Final SQL for one invocation plus its ordered parameter slots.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    parameter_object: ParamValue,
    additional_parameters: BTreeMap<String, ParamValue>,
}

impl BoundSql {
    #[must_use]
    pub fn new(
        sql: impl Into<String>,
        parameter_mappings: Vec<ParameterMapping>,
        parameter_object: ParamValue,
    ) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
            parameter_object,
            additional_parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    #[must_use]
    pub fn parameter_object(&self) -> &ParamValue {
        &self.parameter_object
    }

    /// Add a computed binding that shadows properties of the parameter object.
    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: ParamValue) {
        self.additional_parameters.insert(name.into(), value);
    }

    /// Whether the first segment of `property` names a computed binding.
    #[must_use]
    pub fn has_additional_parameter(&self, property: &str) -> bool {
        let tok = PropertyTokenizer::new(property);
        self.additional_parameters.contains_key(tok.name())
    }

    #[must_use]
    pub fn additional_parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.additional_parameters
    }

    #[must_use]
    pub fn has_out_parameters(&self) -> bool {
        self.parameter_mappings
            .iter()
            .any(|m| m.mode != ParameterMode::In)
    }
}
