//! Single filter expressions
//!
//! A token is either `field:value`, a bare `field` (equality against `true`),
//! or `field::[not_]operator[_prop][:value]`. Either side may be wrapped in an
//! aggregate function, `count{orders}`. Parsing is purely syntactic;
//! [`FilterExpression::compile`] resolves paths, checks operators against the
//! attribute type and coerces literals.

use super::scanner::Word;
use super::{Comparison, Operand};
use crate::error::{Error, Result};
use crate::path::JoinResolver;
use crate::value::{ScalarType, Value};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    IsNull,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "isnull" => Some(Self::IsNull),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "in" => Some(Self::In),
            "contains" => Some(Self::Contains),
            "icontains" => Some(Self::IContains),
            "startswith" => Some(Self::StartsWith),
            "istartswith" => Some(Self::IStartsWith),
            "endswith" => Some(Self::EndsWith),
            "iendswith" => Some(Self::IEndsWith),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::IsNull => "isnull",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
        }
    }

    /// Pattern operators rendered with LIKE.
    pub fn is_like(self) -> bool {
        matches!(
            self,
            Self::Contains
                | Self::IContains
                | Self::StartsWith
                | Self::IStartsWith
                | Self::EndsWith
                | Self::IEndsWith
        )
    }

    pub fn is_case_insensitive(self) -> bool {
        matches!(self, Self::IContains | Self::IStartsWith | Self::IEndsWith)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Avg,
    Sum,
    Max,
    Min,
    Greatest,
    Least,
}

impl AggregateFn {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Self::Count),
            "count_distinct" => Some(Self::CountDistinct),
            "avg" => Some(Self::Avg),
            "sum" => Some(Self::Sum),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "greatest" => Some(Self::Greatest),
            "least" => Some(Self::Least),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::CountDistinct => "count_distinct",
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Greatest => "greatest",
            Self::Least => "least",
        }
    }

    /// Type of the aggregated value for an argument of type `arg`.
    fn result_type(self, field: &str, arg: ScalarType) -> Result<ScalarType> {
        match self {
            Self::Count | Self::CountDistinct => Ok(ScalarType::Integer),
            Self::Avg | Self::Sum if !arg.is_numeric() => Err(Error::UnsupportedOperator {
                operator: self.as_str().to_string(),
                field: field.to_string(),
            }),
            Self::Avg => Ok(ScalarType::Float),
            _ => Ok(arg),
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RightSide {
    Literal(String),
    List(Vec<String>),
    Path {
        path: String,
        function: Option<AggregateFn>,
    },
}

/// Syntactic form of one filter token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression {
    pub attribute: String,
    pub left_function: Option<AggregateFn>,
    pub operator: Operator,
    pub negate: bool,
    pub property_compare: bool,
    pub right: RightSide,
}

fn function_pattern() -> &'static Regex {
    static FUNCTION_RE: OnceLock<Regex> = OnceLock::new();
    FUNCTION_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_0-9]+\{.*\}$").expect("function regex must compile")
    })
}

/// Split `fn{inner}` into its function and inner path.
fn unwrap_function(s: &str) -> Result<Option<(AggregateFn, String)>> {
    if !function_pattern().is_match(s) {
        return Ok(None);
    }
    let open = s.find('{').unwrap_or_default();
    let name = &s[..open];
    let inner = &s[open + 1..s.len() - 1];
    let function =
        AggregateFn::parse(name).ok_or_else(|| Error::UnknownFunction(name.to_string()))?;
    Ok(Some((function, inner.to_string())))
}

fn strip_single_quotes(s: &str) -> Option<&str> {
    (s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'')).then(|| &s[1..s.len() - 1])
}

fn parse_list(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in inner.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => items.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    items.push(current);

    let items: Vec<String> = items
        .into_iter()
        .map(|item| {
            let trimmed = item.trim();
            strip_single_quotes(trimmed).unwrap_or(trimmed).to_string()
        })
        .collect();
    if items.len() == 1 && items[0].is_empty() && !inner.contains('\'') {
        Vec::new()
    } else {
        items
    }
}

impl FilterExpression {
    /// Parse a token from an unquoted string.
    pub fn parse_str(token: &str) -> Result<Self> {
        Self::parse(&Word {
            text: token.to_string(),
            quoted_from: None,
        })
    }

    pub fn parse(word: &Word) -> Result<Self> {
        let syntax = word.syntax();
        let text = word.text.as_str();

        let (field, operator_spec, value_at) = match syntax.find(':') {
            None => (text, None, None),
            Some(i) if syntax[i + 1..].starts_with(':') => {
                let spec_start = i + 2;
                match syntax[spec_start..].find(':') {
                    Some(j) => (
                        &text[..i],
                        Some(&text[spec_start..spec_start + j]),
                        Some(spec_start + j + 1),
                    ),
                    None => (&text[..i], Some(&text[spec_start..]), None),
                }
            }
            Some(i) => (&text[..i], None, Some(i + 1)),
        };

        if field.is_empty() {
            return Err(Error::InvalidPath(text.to_string()));
        }

        let mut operator = Operator::Eq;
        let mut negate = false;
        let mut property_compare = false;
        if let Some(spec) = operator_spec {
            let mut name = spec;
            if let Some(rest) = name.strip_prefix("not_") {
                negate = true;
                name = rest;
            }
            if let Some(rest) = name.strip_suffix("_prop") {
                property_compare = true;
                name = rest;
            }
            operator =
                Operator::parse(name).ok_or_else(|| Error::UnknownOperator(spec.to_string()))?;
        }

        let (attribute, left_function) = match unwrap_function(field)? {
            Some((function, inner)) => (inner, Some(function)),
            None => (field.to_string(), None),
        };

        let right = match value_at {
            None => RightSide::Literal("true".to_string()),
            Some(at) => {
                let raw = &text[at..];
                if word.quoted_since(at) {
                    RightSide::Literal(raw.to_string())
                } else if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']'))
                {
                    RightSide::List(parse_list(inner))
                } else if let Some(literal) = strip_single_quotes(raw) {
                    RightSide::Literal(literal.to_string())
                } else if let Some((function, path)) = unwrap_function(raw)? {
                    property_compare = true;
                    RightSide::Path {
                        path,
                        function: Some(function),
                    }
                } else if property_compare {
                    RightSide::Path {
                        path: raw.to_string(),
                        function: None,
                    }
                } else {
                    RightSide::Literal(raw.to_string())
                }
            }
        };

        Ok(Self {
            attribute,
            left_function,
            operator,
            negate,
            property_compare,
            right,
        })
    }

    pub fn is_aggregate(&self) -> bool {
        self.left_function.is_some()
            || matches!(
                self.right,
                RightSide::Path {
                    function: Some(_),
                    ..
                }
            )
    }

    fn unsupported(&self) -> Error {
        Error::UnsupportedOperator {
            operator: self.operator.as_str().to_string(),
            field: self.attribute.clone(),
        }
    }

    /// Resolve paths through `resolver` and coerce literals to the attribute type.
    pub fn compile(&self, resolver: &mut JoinResolver<'_>, null_safe_eq: bool) -> Result<Comparison> {
        let left = resolver.resolve(&self.attribute)?;
        let (left_operand, left_type) = match self.left_function {
            Some(function) => (
                Operand::Aggregate(counting_members(function, left.identifier), left.attr),
                function.result_type(&self.attribute, left.scalar)?,
            ),
            None => (Operand::Attribute(left.attr), left.scalar),
        };

        if self.operator.is_like() && left_type != ScalarType::Text {
            return Err(self.unsupported());
        }

        let (right, negate) = match (self.operator, &self.right) {
            (Operator::IsNull, RightSide::Literal(raw)) => {
                let wanted = ScalarType::Boolean.coerce(&self.attribute, raw)? == Value::Bool(true);
                // `negate` is normalized so that `false` always means IS NULL.
                (Operand::None, wanted == self.negate)
            }
            (Operator::IsNull, _) => return Err(self.unsupported()),
            (Operator::In, RightSide::List(items)) => (
                Operand::List(
                    items
                        .iter()
                        .map(|raw| left_type.coerce(&self.attribute, raw))
                        .collect::<Result<_>>()?,
                ),
                self.negate,
            ),
            (Operator::In, RightSide::Literal(raw)) => (
                Operand::List(vec![left_type.coerce(&self.attribute, raw)?]),
                self.negate,
            ),
            (_, RightSide::List(_)) | (Operator::In, RightSide::Path { .. }) => {
                return Err(self.unsupported())
            }
            (_, RightSide::Literal(raw)) => {
                (Operand::Literal(left_type.coerce(&self.attribute, raw)?), self.negate)
            }
            (_, RightSide::Path { path, function }) => {
                let resolved = resolver.resolve(path)?;
                let (operand, right_type) = match function {
                    Some(f) => (
                        Operand::Aggregate(counting_members(*f, resolved.identifier), resolved.attr),
                        f.result_type(path, resolved.scalar)?,
                    ),
                    None => (Operand::Attribute(resolved.attr), resolved.scalar),
                };
                let comparable = right_type == left_type
                    || (right_type.is_numeric() && left_type.is_numeric());
                if !comparable {
                    return Err(Error::coercion(&self.attribute, path, left_type));
                }
                if self.operator.is_like() && right_type != ScalarType::Text {
                    return Err(self.unsupported());
                }
                (operand, self.negate)
            }
        };

        let null_safe = null_safe_eq
            && self.operator == Operator::Eq
            && matches!(left_operand, Operand::Attribute(_))
            && matches!(right, Operand::Attribute(_));

        Ok(Comparison {
            left: left_operand,
            operator: self.operator,
            negate,
            null_safe,
            right,
        })
    }
}

/// Counting an association counts its distinct members, not joined rows.
fn counting_members(function: AggregateFn, identifier: bool) -> AggregateFn {
    match function {
        AggregateFn::Count if identifier => AggregateFn::CountDistinct,
        other => other,
    }
}
