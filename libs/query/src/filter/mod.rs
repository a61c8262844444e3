//! Filter language compiler
//!
//! `scanner` splits the input into words and groups, `expression` compiles a
//! single word into a typed comparison, and `combinator` folds the terms into
//! one predicate tree. Compilation either fully succeeds or fails before any
//! query is issued.

mod combinator;
pub mod expression;
pub mod scanner;

pub use expression::{AggregateFn, FilterExpression, Operator, RightSide};
pub use scanner::{scan, Token, TokenKind, Word};

use crate::config::QueryConfig;
use crate::error::Result;
use crate::path::{AttrRef, JoinNode, JoinResolver};
use crate::registry::EntityRegistry;
use crate::value::Value;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Attribute(AttrRef),
    Aggregate(AggregateFn, AttrRef),
    Literal(Value),
    List(Vec<Value>),
    None,
}

impl Operand {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Operand::Aggregate(..))
    }
}

/// A typed comparison leaf.
///
/// For `isnull`, `negate == false` means IS NULL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub left: Operand,
    pub operator: Operator,
    pub negate: bool,
    /// Two NULL attributes compare equal (`IS NOT DISTINCT FROM`).
    pub null_safe: bool,
    pub right: Operand,
}

impl Comparison {
    pub fn is_aggregate(&self) -> bool {
        self.left.is_aggregate() || self.right.is_aggregate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare(Comparison),
}

impl Predicate {
    pub fn is_aggregate(&self) -> bool {
        match self {
            Predicate::And(a, b) | Predicate::Or(a, b) => a.is_aggregate() || b.is_aggregate(),
            Predicate::Not(inner) => inner.is_aggregate(),
            Predicate::Compare(c) => c.is_aggregate(),
        }
    }

    /// Visit every comparison leaf, left to right.
    pub fn for_each_comparison<'a>(&'a self, f: &mut impl FnMut(&'a Comparison)) {
        match self {
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.for_each_comparison(f);
                b.for_each_comparison(f);
            }
            Predicate::Not(inner) => inner.for_each_comparison(f),
            Predicate::Compare(c) => f(c),
        }
    }
}

/// Result of compiling one filter string against a root entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledFilter {
    pub predicate: Option<Predicate>,
    pub joins: Vec<JoinNode>,
    /// Route the predicate to HAVING with GROUP BY.
    pub aggregate: bool,
    /// Grouping keys after the root identifier: plain attributes compared
    /// against an aggregate inside the same comparison.
    pub group_by: Vec<AttrRef>,
}

impl CompiledFilter {
    pub fn empty() -> Self {
        Self {
            predicate: None,
            joins: Vec::new(),
            aggregate: false,
            group_by: Vec::new(),
        }
    }
}

/// Compiles filter strings. Holds only borrowed, read-only state, so one
/// compiler may serve any number of concurrent compilations.
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler<'a> {
    registry: &'a EntityRegistry,
    null_safe_property_eq: bool,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(registry: &'a EntityRegistry, config: &QueryConfig) -> Self {
        Self {
            registry,
            null_safe_property_eq: config.null_safe_property_eq,
        }
    }

    pub fn compile(&self, input: &str, entity: &str) -> Result<CompiledFilter> {
        let mut resolver = JoinResolver::new(self.registry, entity)?;
        let tokens = scan(input)?;
        let predicate = combinator::combine(&tokens, |word| {
            let expr = FilterExpression::parse(word)?;
            let comparison = expr.compile(&mut resolver, self.null_safe_property_eq)?;
            Ok(Predicate::Compare(comparison))
        })?;

        let aggregate = predicate.as_ref().is_some_and(Predicate::is_aggregate);
        let mut group_by: Vec<AttrRef> = Vec::new();
        if let Some(tree) = predicate.as_ref().filter(|_| aggregate) {
            tree.for_each_comparison(&mut |c| {
                if !c.is_aggregate() {
                    return;
                }
                for operand in [&c.left, &c.right] {
                    if let Operand::Attribute(attr) = operand {
                        if !group_by.contains(attr) {
                            group_by.push(attr.clone());
                        }
                    }
                }
            });
        }

        let joins = resolver.into_joins();
        debug!(
            entity,
            joins = joins.len(),
            aggregate,
            "Compiled filter expression"
        );
        Ok(CompiledFilter {
            predicate,
            joins,
            aggregate,
            group_by,
        })
    }
}

/// Compile `input` against `entity` with default options.
pub fn compile_filter(
    input: &str,
    entity: &str,
    registry: &EntityRegistry,
) -> Result<CompiledFilter> {
    FilterCompiler::new(registry, &QueryConfig::default()).compile(input, entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::path::{Column, Source};
    use crate::value::ScalarType;

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .entity("Customer", "customer", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("name", ScalarType::Text)
                    .scalar("age", ScalarType::Integer)
                    .scalar("nickname", ScalarType::Text)
                    .scalar("active", ScalarType::Boolean)
                    .one_to_many("orders", "Order")
            })
            .entity("Order", "orders", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("total", ScalarType::Float)
                    .scalar("placed", ScalarType::Date)
                    .many_to_one("customer", "Customer")
            })
            .build()
            .unwrap()
    }

    fn compare(filter: &CompiledFilter) -> &Comparison {
        match filter.predicate.as_ref() {
            Some(Predicate::Compare(c)) => c,
            other => panic!("expected a single comparison, got {other:?}"),
        }
    }

    #[test]
    fn short_and_long_equality_compile_identically() {
        let registry = registry();
        let a = compile_filter("age:30", "Customer", &registry).unwrap();
        let b = compile_filter("age::eq:30", "Customer", &registry).unwrap();
        assert_eq!(a, b);
        assert_eq!(compare(&a).right, Operand::Literal(Value::Int(30)));
    }

    #[test]
    fn bare_field_means_true() {
        let registry = registry();
        let f = compile_filter("active", "Customer", &registry).unwrap();
        assert_eq!(compare(&f).right, Operand::Literal(Value::Bool(true)));
    }

    #[test]
    fn isnull_forms_are_normalized() {
        let registry = registry();
        for (input, negate) in [
            ("nickname::isnull", false),
            ("nickname::isnull:true", false),
            ("nickname::isnull:false", true),
            ("nickname::not_isnull", true),
            ("nickname::not_isnull:false", false),
        ] {
            let f = compile_filter(input, "Customer", &registry).unwrap();
            let c = compare(&f);
            assert_eq!(c.operator, Operator::IsNull, "{input}");
            assert_eq!(c.negate, negate, "{input}");
        }
    }

    #[test]
    fn coercion_errors_name_field_and_value() {
        let registry = registry();
        let err = compile_filter("orders.placed::gt:yesterday", "Customer", &registry).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeCoercion { ref field, ref value, ref target }
                if field == "orders.placed" && value == "yesterday" && target == "date"
        ));
    }

    #[test]
    fn like_operators_require_text() {
        let registry = registry();
        assert!(compile_filter("name::icontains:ali", "Customer", &registry).is_ok());
        assert!(matches!(
            compile_filter("age::contains:3", "Customer", &registry),
            Err(Error::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn aggregate_anywhere_routes_to_having() {
        let registry = registry();
        let f = compile_filter("name:bob or count{orders}::gte:2", "Customer", &registry).unwrap();
        assert!(f.aggregate);
        assert!(f.group_by.is_empty());
        match f.predicate.as_ref() {
            Some(Predicate::Or(_, right)) => match right.as_ref() {
                Predicate::Compare(c) => {
                    assert!(matches!(c.left, Operand::Aggregate(AggregateFn::CountDistinct, _)));
                    assert_eq!(c.right, Operand::Literal(Value::Int(2)));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn aggregate_operands_join_the_grouping() {
        let registry = registry();
        let f = compile_filter("age::lt_prop:sum{orders.total}", "Customer", &registry).unwrap();
        assert!(f.aggregate);
        assert_eq!(f.group_by, vec![AttrRef::root("age", "age")]);
    }

    #[test]
    fn property_equality_is_null_safe() {
        let registry = registry();
        let f = compile_filter("name::eq_prop:nickname", "Customer", &registry).unwrap();
        let c = compare(&f);
        assert!(c.null_safe);
        assert_eq!(
            c.right,
            Operand::Attribute(AttrRef {
                source: Source::Root,
                column: Column::Attribute {
                    name: "nickname".into(),
                    column: "nickname".into()
                }
            })
        );

        let strict = QueryConfig {
            null_safe_property_eq: false,
            ..QueryConfig::default()
        };
        let f = FilterCompiler::new(&registry, &strict)
            .compile("name::eq_prop:nickname", "Customer")
            .unwrap();
        assert!(!compare(&f).null_safe);
    }

    #[test]
    fn repeated_paths_share_joins() {
        let registry = registry();
        let f = compile_filter(
            "orders.total::gt:10 and orders.placed::lt:2024-01-01",
            "Customer",
            &registry,
        )
        .unwrap();
        assert_eq!(f.joins.len(), 1);
    }

    #[test]
    fn empty_filter_has_no_predicate() {
        let registry = registry();
        assert_eq!(
            compile_filter("   ", "Customer", &registry).unwrap(),
            CompiledFilter::empty()
        );
    }
}
