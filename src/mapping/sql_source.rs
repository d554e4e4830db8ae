use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlMapperError;
use crate::param::ParamValue;
use crate::types::ColumnType;

use super::bound_sql::{BoundSql, ParameterMapping, ParameterMode};

/// Produces the bound SQL of a statement for one parameter object.
///
/// Dynamic templating lives outside this crate; anything able to render SQL text plus
/// ordered slots can implement this.
pub trait SqlSource: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns `SqlMapperError` if the SQL cannot be rendered for `param`.
    fn bound_sql(&self, param: &ParamValue) -> Result<BoundSql, SqlMapperError>;
}

/// SQL text with pre-computed slots, identical for every invocation.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    #[must_use]
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
        }
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, param: &ParamValue) -> Result<BoundSql, SqlMapperError> {
        Ok(BoundSql::new(
            self.sql.clone(),
            self.parameter_mappings.clone(),
            param.clone(),
        ))
    }
}

/// SQL written with `#{property}` markers, parsed once into `?` placeholders.
///
/// Markers may carry options: `#{id, columnType=BIGINT}` or `#{total, mode=OUT}`.
/// Quoted text and comments are left untouched.
#[derive(Debug, Clone)]
pub struct RawSqlSource {
    inner: StaticSqlSource,
}

static MARKER_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]+)\s*=\s*([A-Za-z_]+)\s*$").expect("marker option pattern")
});

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

impl RawSqlSource {
    /// # Errors
    /// Returns `SqlMapperError::ConfigError` for an unterminated marker or unknown option.
    pub fn parse(sql: &str) -> Result<Self, SqlMapperError> {
        let mut out = String::with_capacity(sql.len());
        let mut mappings = Vec::new();
        let mut state = State::Normal;
        let mut rest = sql;

        while let Some(c) = rest.chars().next() {
            let next = rest[c.len_utf8()..].chars().next();
            match state {
                State::Normal => match c {
                    '#' if next == Some('{') => {
                        let end = rest.find('}').ok_or_else(|| {
                            SqlMapperError::ConfigError(format!(
                                "unterminated parameter marker in SQL: {sql}"
                            ))
                        })?;
                        mappings.push(parse_marker(&rest[2..end])?);
                        out.push('?');
                        rest = &rest[end + 1..];
                        continue;
                    }
                    '\'' => state = State::SingleQuoted,
                    '"' => state = State::DoubleQuoted,
                    '-' if next == Some('-') => state = State::LineComment,
                    '/' if next == Some('*') => state = State::BlockComment,
                    _ => {}
                },
                State::SingleQuoted if c == '\'' => state = State::Normal,
                State::DoubleQuoted if c == '"' => state = State::Normal,
                State::LineComment if c == '\n' => state = State::Normal,
                State::BlockComment if c == '*' && next == Some('/') => {
                    out.push_str("*/");
                    rest = &rest[2..];
                    state = State::Normal;
                    continue;
                }
                _ => {}
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }

        Ok(Self {
            inner: StaticSqlSource::new(out, mappings),
        })
    }
}

fn parse_marker(body: &str) -> Result<ParameterMapping, SqlMapperError> {
    let mut parts = body.split(',');
    let property = parts.next().unwrap_or_default().trim();
    if property.is_empty() {
        return Err(SqlMapperError::ConfigError(
            "empty parameter marker #{}".to_string(),
        ));
    }
    let mut mapping = ParameterMapping::new(property);
    for option in parts {
        let caps = MARKER_OPTION.captures(option).ok_or_else(|| {
            SqlMapperError::ConfigError(format!(
                "malformed option '{}' in parameter marker #{{{body}}}",
                option.trim()
            ))
        })?;
        let value = &caps[2];
        match &caps[1] {
            "columnType" | "jdbcType" => {
                let column_type = value.parse::<ColumnType>().map_err(|e| {
                    SqlMapperError::ConfigError(format!("unknown column type '{value}': {e}"))
                })?;
                mapping = mapping.with_column_type(column_type);
            }
            "mode" => {
                let mode = match value.to_ascii_uppercase().as_str() {
                    "IN" => ParameterMode::In,
                    "OUT" => ParameterMode::Out,
                    "INOUT" => ParameterMode::InOut,
                    other => {
                        return Err(SqlMapperError::ConfigError(format!(
                            "unknown parameter mode '{other}'"
                        )));
                    }
                };
                mapping = mapping.with_mode(mode);
            }
            other => {
                return Err(SqlMapperError::ConfigError(format!(
                    "unsupported option '{other}' in parameter marker #{{{body}}}"
                )));
            }
        }
    }
    Ok(mapping)
}

impl SqlSource for RawSqlSource {
    fn bound_sql(&self, param: &ParamValue) -> Result<BoundSql, SqlMapperError> {
        self.inner.bound_sql(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(sql: &str) -> BoundSql {
        RawSqlSource::parse(sql)
            .unwrap()
            .bound_sql(&ParamValue::Null)
            .unwrap()
    }

    #[test]
    fn markers_become_placeholders_in_order() {
        let bound = render("update user set name = #{name} where id = #{id}");
        assert_eq!(bound.sql(), "update user set name = ? where id = ?");
        let names: Vec<_> = bound
            .parameter_mappings()
            .iter()
            .map(|m| m.property.as_str())
            .collect();
        assert_eq!(names, ["name", "id"]);
    }

    #[test]
    fn markers_inside_literals_and_comments_are_kept() {
        let bound = render("select '#{x}' -- #{y}\n/* #{z} */ from t where a = #{a}");
        assert_eq!(
            bound.sql(),
            "select '#{x}' -- #{y}\n/* #{z} */ from t where a = ?"
        );
        assert_eq!(bound.parameter_mappings().len(), 1);
    }

    #[test]
    fn marker_options_are_parsed() {
        let bound = render("{call total(#{id, columnType=BIGINT}, #{out, mode=OUT, jdbcType=INTEGER})}");
        let mappings = bound.parameter_mappings();
        assert_eq!(mappings[0].column_type, Some(ColumnType::BigInt));
        assert_eq!(mappings[1].mode, ParameterMode::Out);
        assert_eq!(mappings[1].column_type, Some(ColumnType::Integer));
        assert!(bound.has_out_parameters());
    }

    #[test]
    fn unterminated_marker_is_rejected() {
        assert!(RawSqlSource::parse("select #{id from t").is_err());
        assert!(RawSqlSource::parse("select #{id, size=3} from t").is_err());
    }
}
