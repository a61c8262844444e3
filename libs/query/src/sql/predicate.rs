//! Renders compiled predicates as SQL boolean expressions.

use super::bind::{push_array, push_text, push_value};
use super::{alias, quote, BindValue};
use crate::error::{Error, Result};
use crate::filter::{AggregateFn, Comparison, Operand, Operator, Predicate};
use crate::path::{AttrRef, Column, JoinNode, Source};
use crate::registry::{AttributeKind, EntityRegistry};

fn escape_like_pattern(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn aggregate_sql(function: AggregateFn, column: &str) -> String {
    match function {
        AggregateFn::Count => format!("COUNT({column})"),
        AggregateFn::CountDistinct => format!("COUNT(DISTINCT {column})"),
        AggregateFn::Avg => format!("AVG({column})"),
        AggregateFn::Sum => format!("SUM({column})"),
        AggregateFn::Max | AggregateFn::Greatest => format!("MAX({column})"),
        AggregateFn::Min | AggregateFn::Least => format!("MIN({column})"),
    }
}

pub(super) struct PredicateSql<'a> {
    registry: &'a EntityRegistry,
    joins: &'a [JoinNode],
}

impl<'a> PredicateSql<'a> {
    pub(super) fn new(registry: &'a EntityRegistry, joins: &'a [JoinNode]) -> Self {
        Self { registry, joins }
    }

    pub(super) fn column(&self, attr: &AttrRef) -> Result<String> {
        let table = alias(attr.source);
        let column = match &attr.column {
            Column::Attribute { column, .. } => column.clone(),
            element => {
                let Source::Join(id) = attr.source else {
                    return Err(Error::InvalidPath(format!("{element:?} outside a join")));
                };
                let join = &self.joins[id];
                match (&self.registry.attribute(&join.owner, &join.attribute)?.kind, element) {
                    (AttributeKind::Map { key_column, .. }, Column::MapKey) => key_column.clone(),
                    (AttributeKind::Map { value_column, .. }, Column::MapValue)
                    | (AttributeKind::Collection { value_column, .. }, Column::Element) => {
                        value_column.clone()
                    }
                    _ => return Err(Error::InvalidPath(join.path.clone())),
                }
            }
        };
        Ok(format!("{table}.{}", quote(&column)))
    }

    fn operand(&self, operand: &Operand, bind_params: &mut Vec<BindValue>) -> Result<String> {
        match operand {
            Operand::Attribute(attr) => self.column(attr),
            Operand::Aggregate(function, attr) => Ok(aggregate_sql(*function, &self.column(attr)?)),
            Operand::Literal(value) => Ok(format!("${}", push_value(bind_params, value))),
            Operand::List(values) => Ok(format!("${}", push_array(bind_params, values))),
            Operand::None => Ok("NULL".to_string()),
        }
    }

    fn like(
        &self,
        c: &Comparison,
        left: String,
        bind_params: &mut Vec<BindValue>,
    ) -> Result<String> {
        let ci = c.operator.is_case_insensitive();
        let (prefix, suffix) = match c.operator {
            Operator::Contains | Operator::IContains => (true, true),
            Operator::StartsWith | Operator::IStartsWith => (false, true),
            _ => (true, false),
        };
        let pattern = match &c.right {
            Operand::Literal(value) => {
                let mut pattern = escape_like_pattern(value.as_text().unwrap_or_default());
                if ci {
                    pattern = pattern.to_lowercase();
                }
                if prefix {
                    pattern.insert(0, '%');
                }
                if suffix {
                    pattern.push('%');
                }
                format!("${}", push_text(bind_params, pattern))
            }
            other => {
                let mut right = self.operand(other, bind_params)?;
                if ci {
                    right = format!("lower({right})");
                }
                if prefix {
                    right = format!("'%' || {right}");
                }
                if suffix {
                    right = format!("{right} || '%'");
                }
                right
            }
        };
        let left = if ci { format!("lower({left})") } else { left };
        Ok(format!("{left} LIKE {pattern} ESCAPE '\\'"))
    }

    pub(super) fn comparison(
        &self,
        c: &Comparison,
        bind_params: &mut Vec<BindValue>,
    ) -> Result<String> {
        let left = self.operand(&c.left, bind_params)?;
        let sql = match (c.operator, &c.right) {
            (Operator::IsNull, _) => format!("{left} IS NULL"),
            (Operator::In, Operand::List(values)) if values.is_empty() => "FALSE".to_string(),
            (Operator::In, right) => {
                format!("{left} = ANY({})", self.operand(right, bind_params)?)
            }
            (Operator::Eq, right) if c.null_safe => {
                format!("{left} IS NOT DISTINCT FROM {}", self.operand(right, bind_params)?)
            }
            (op, _) if op.is_like() => self.like(c, left, bind_params)?,
            (op, right) => {
                let symbol = match op {
                    Operator::Gt => ">",
                    Operator::Lt => "<",
                    Operator::Gte => ">=",
                    Operator::Lte => "<=",
                    _ => "=",
                };
                format!("{left} {symbol} {}", self.operand(right, bind_params)?)
            }
        };
        Ok(if c.negate { format!("NOT ({sql})") } else { sql })
    }

    /// Row-level rendering, for a WHERE clause.
    pub(super) fn row(&self, p: &Predicate, bind_params: &mut Vec<BindValue>) -> Result<String> {
        Ok(match p {
            Predicate::And(a, b) => {
                format!("({} AND {})", self.row(a, bind_params)?, self.row(b, bind_params)?)
            }
            Predicate::Or(a, b) => {
                format!("({} OR {})", self.row(a, bind_params)?, self.row(b, bind_params)?)
            }
            Predicate::Not(inner) => format!("NOT ({})", self.row(inner, bind_params)?),
            Predicate::Compare(c) => self.comparison(c, bind_params)?,
        })
    }

    /// Group-level rendering, for a HAVING clause. Subtrees without an
    /// aggregate hold when they hold for any row of the group.
    pub(super) fn having(&self, p: &Predicate, bind_params: &mut Vec<BindValue>) -> Result<String> {
        if !p.is_aggregate() {
            return Ok(format!("BOOL_OR({})", self.row(p, bind_params)?));
        }
        Ok(match p {
            Predicate::And(a, b) => format!(
                "({} AND {})",
                self.having(a, bind_params)?,
                self.having(b, bind_params)?
            ),
            Predicate::Or(a, b) => format!(
                "({} OR {})",
                self.having(a, bind_params)?,
                self.having(b, bind_params)?
            ),
            Predicate::Not(inner) => format!("NOT ({})", self.having(inner, bind_params)?),
            Predicate::Compare(c) => self.comparison(c, bind_params)?,
        })
    }
}
