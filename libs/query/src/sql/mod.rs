//! SQL rendering for PostgreSQL.
//!
//! Builds parameterized statements from the store criteria objects:
//! - Root selection, with an identifier subquery whenever joins or
//!   aggregates could multiply or collapse root rows
//! - Total counts over the same predicate
//! - Batched association loads keyed by owner identifiers
//!
//! Identifiers are always quoted. The root table is aliased `r`, join node
//! `n` is aliased `j{n}` and the join table of a many-to-many node `l{n}`.

mod bind;
mod predicate;

use crate::error::{Error, Result};
use crate::path::{JoinNode, Source};
use crate::query::{OrderKey, SelectQuery};
use crate::registry::{AttributeKind, EntityDef, EntityRegistry};
use crate::store::{Link, RelatedQuery};
use crate::value::ScalarType;
use bind::push_array;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use predicate::PredicateSql;
use uuid::Uuid;

/// Column alias carrying the owner key in association loads.
pub const OWNER_KEY: &str = "__owner";

/// Bind values for `sqlx` queries.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    TextArray(Vec<String>),
    DateArray(Vec<NaiveDate>),
    DateTimeArray(Vec<NaiveDateTime>),
    TimestampArray(Vec<DateTime<Utc>>),
    UuidArray(Vec<Uuid>),
}

/// A column read back from a selected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projected {
    pub name: String,
    pub column: String,
    pub scalar: ScalarType,
    /// Foreign key of a to-one association rather than a scalar field.
    pub reference: bool,
}

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn alias(source: Source) -> String {
    match source {
        Source::Root => "r".to_string(),
        Source::Join(id) => format!("j{id}"),
    }
}

/// Columns selected for `entity`, in select-list order: scalars first, then
/// foreign keys typed by their target's identifier.
pub fn projection(registry: &EntityRegistry, entity: &EntityDef) -> Result<Vec<Projected>> {
    let mut out: Vec<Projected> = entity
        .scalars()
        .map(|a| Projected {
            name: a.name.clone(),
            column: a.column.clone(),
            scalar: a.scalar_type().unwrap_or(ScalarType::Text),
            reference: false,
        })
        .collect();
    for attribute in entity.foreign_keys() {
        let (Some(relation), Some(column)) = (attribute.relation(), attribute.foreign_key_column())
        else {
            continue;
        };
        out.push(Projected {
            name: attribute.name.clone(),
            column: column.to_string(),
            scalar: registry.entity(&relation.target)?.id_type(),
            reference: true,
        });
    }
    Ok(out)
}

fn push_order_by(sql: &mut String, tie_breaker: &str, order: &[OrderKey]) {
    let mut parts: Vec<String> = order
        .iter()
        .map(|key| {
            format!(
                "r.{} {} NULLS LAST",
                quote(&key.column),
                key.direction.as_sql()
            )
        })
        .collect();
    parts.push(format!("{tie_breaker} ASC"));
    sql.push_str(" ORDER BY ");
    sql.push_str(&parts.join(", "));
}

fn push_page(sql: &mut String, limit: Option<usize>, offset: u64) {
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if offset > 0 {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
}

pub struct SqlBuilder<'a> {
    registry: &'a EntityRegistry,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(registry: &'a EntityRegistry) -> Self {
        Self { registry }
    }

    fn select_list(&self, entity: &EntityDef) -> Result<String> {
        Ok(projection(self.registry, entity)?
            .iter()
            .map(|p| format!("r.{}", quote(&p.column)))
            .collect::<Vec<_>>()
            .join(", "))
    }

    pub fn build_select(&self, query: &SelectQuery) -> Result<(String, Vec<BindValue>)> {
        let entity = self.registry.entity(&query.entity)?;
        let mut bind_params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {} r",
            self.select_list(entity)?,
            quote(&entity.table)
        );
        self.push_filter(&mut sql, &mut bind_params, entity, query)?;
        push_order_by(
            &mut sql,
            &format!("r.{}", quote(entity.id_column())),
            &query.order,
        );
        push_page(&mut sql, query.limit, query.offset);
        Ok((sql, bind_params))
    }

    pub fn build_count(&self, query: &SelectQuery) -> Result<(String, Vec<BindValue>)> {
        let entity = self.registry.entity(&query.entity)?;
        let mut bind_params = Vec::new();
        let mut sql = format!("SELECT COUNT(*) FROM {} r", quote(&entity.table));
        self.push_filter(&mut sql, &mut bind_params, entity, query)?;
        Ok((sql, bind_params))
    }

    /// Targets of one association for a batch of owner keys. The first
    /// selected column is the owner key, aliased [`OWNER_KEY`].
    pub fn build_related(&self, query: &RelatedQuery) -> Result<(String, Vec<BindValue>)> {
        let target = self.registry.entity(&query.target)?;
        let table = quote(&target.table);
        let id = format!("r.{}", quote(target.id_column()));
        let (owner, from) = match &query.link {
            Link::Identity => (id.clone(), format!("{table} r")),
            Link::ForeignKey { column, .. } => (format!("r.{}", quote(column)), format!("{table} r")),
            Link::JoinTable(jt) => (
                format!("l.{}", quote(&jt.owner_column)),
                format!(
                    "{table} r JOIN {} l ON l.{} = {id}",
                    quote(&jt.table),
                    quote(&jt.target_column)
                ),
            ),
        };

        let mut bind_params = Vec::new();
        let condition = if query.keys.is_empty() {
            "FALSE".to_string()
        } else {
            format!("{owner} = ANY(${})", push_array(&mut bind_params, &query.keys))
        };
        let mut sql = format!(
            "SELECT {owner} AS {}, {} FROM {from} WHERE {condition}",
            quote(OWNER_KEY),
            self.select_list(target)?
        );
        push_order_by(&mut sql, &id, &query.order);
        if matches!(query.link, Link::JoinTable(_)) {
            sql.push_str(&format!(", {owner} ASC"));
        }
        push_page(&mut sql, query.limit, query.offset);
        Ok((sql, bind_params))
    }

    fn push_filter(
        &self,
        sql: &mut String,
        bind_params: &mut Vec<BindValue>,
        entity: &EntityDef,
        query: &SelectQuery,
    ) -> Result<()> {
        let Some(predicate) = &query.predicate else {
            return Ok(());
        };
        let renderer = PredicateSql::new(self.registry, &query.joins);
        if !query.needs_subquery() {
            sql.push_str(" WHERE ");
            sql.push_str(&renderer.row(predicate, bind_params)?);
            return Ok(());
        }

        let id = format!("r.{}", quote(entity.id_column()));
        let mut sub = format!("SELECT {id} FROM {} r", quote(&entity.table));
        for join in &query.joins {
            sub.push_str(&self.join_clause(join)?);
        }
        if query.aggregate {
            let mut group = vec![id.clone()];
            for attr in &query.group_by {
                group.push(renderer.column(attr)?);
            }
            sub.push_str(&format!(
                " GROUP BY {} HAVING {}",
                group.join(", "),
                renderer.having(predicate, bind_params)?
            ));
        } else {
            sub.push_str(" WHERE ");
            sub.push_str(&renderer.row(predicate, bind_params)?);
        }
        sql.push_str(&format!(" WHERE {id} IN ({sub})"));
        Ok(())
    }

    fn join_clause(&self, join: &JoinNode) -> Result<String> {
        let parent = alias(join.parent);
        let me = alias(Source::Join(join.id));
        let owner_id = quote(self.registry.entity(&join.owner)?.id_column());
        let attribute = self.registry.attribute(&join.owner, &join.attribute)?;

        match &attribute.kind {
            AttributeKind::Relation(relation) => {
                let target = self.registry.entity(&relation.target)?;
                let table = quote(&target.table);
                let target_id = quote(target.id_column());
                match Link::resolve(self.registry, &join.owner, &join.attribute)? {
                    Link::Identity => {
                        let fk = attribute.foreign_key_column().ok_or_else(|| {
                            Error::Schema(format!(
                                "{}.{} has no join column",
                                join.owner, join.attribute
                            ))
                        })?;
                        Ok(format!(
                            " LEFT JOIN {table} {me} ON {me}.{target_id} = {parent}.{}",
                            quote(fk)
                        ))
                    }
                    Link::ForeignKey { column, .. } => Ok(format!(
                        " LEFT JOIN {table} {me} ON {me}.{} = {parent}.{owner_id}",
                        quote(&column)
                    )),
                    Link::JoinTable(jt) => {
                        let link = format!("l{}", join.id);
                        Ok(format!(
                            " LEFT JOIN {} {link} ON {link}.{} = {parent}.{owner_id} \
                             LEFT JOIN {table} {me} ON {me}.{target_id} = {link}.{}",
                            quote(&jt.table),
                            quote(&jt.owner_column),
                            quote(&jt.target_column)
                        ))
                    }
                }
            }
            AttributeKind::Map {
                table,
                owner_column,
                ..
            }
            | AttributeKind::Collection {
                table,
                owner_column,
                ..
            } => Ok(format!(
                " LEFT JOIN {} {me} ON {me}.{} = {parent}.{owner_id}",
                quote(table),
                quote(owner_column)
            )),
            AttributeKind::Scalar(_) => Err(Error::InvalidPath(join.path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile_filter;
    use crate::query::{resolve_order, SortKey};
    use crate::value::Value;

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .entity("Author", "author", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("name", ScalarType::Text)
                    .scalar("born", ScalarType::Date)
                    .one_to_many("books", "Book")
                    .many_to_many("prizes", "Prize")
                    .map("links", ScalarType::Text, ScalarType::Text)
            })
            .entity("Book", "book", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("title", ScalarType::Text)
                    .scalar("pages", ScalarType::Integer)
                    .many_to_one("author", "Author")
            })
            .entity("Prize", "prize", |e| {
                e.id("id", ScalarType::Uuid)
                    .scalar("label", ScalarType::Text)
            })
            .build()
            .unwrap()
    }

    fn select(registry: &EntityRegistry, entity: &str, filter: &str) -> (String, Vec<BindValue>) {
        let query = SelectQuery::new(entity, compile_filter(filter, entity, registry).unwrap());
        SqlBuilder::new(registry).build_select(&query).unwrap()
    }

    #[test]
    fn plain_filters_stay_in_where() {
        let registry = registry();
        let (sql, binds) = select(&registry, "Book", "title:Dune and pages::gt:100");
        assert_eq!(
            sql,
            "SELECT r.\"id\", r.\"title\", r.\"pages\", r.\"author_id\" FROM \"book\" r \
             WHERE (r.\"title\" = $1 AND r.\"pages\" > $2) ORDER BY r.\"id\" ASC"
        );
        assert_eq!(binds, vec![BindValue::Text("Dune".into()), BindValue::Int(100)]);
    }

    #[test]
    fn joins_select_roots_through_id_subquery() {
        let registry = registry();
        let (sql, _) = select(&registry, "Book", "author.name::icontains:a_b");
        assert!(sql.contains(
            "WHERE r.\"id\" IN (SELECT r.\"id\" FROM \"book\" r \
             LEFT JOIN \"author\" j0 ON j0.\"id\" = r.\"author_id\" \
             WHERE lower(j0.\"name\") LIKE $1 ESCAPE '\\')"
        ));
        let (_, binds) = select(&registry, "Book", "author.name::icontains:A_B");
        assert_eq!(binds, vec![BindValue::Text("%a\\_b%".into())]);
    }

    #[test]
    fn to_many_and_element_joins() {
        let registry = registry();
        let (sql, _) = select(&registry, "Author", "books.title:Dune or links.key:web");
        assert!(sql.contains("LEFT JOIN \"book\" j0 ON j0.\"author_id\" = r.\"id\""));
        assert!(sql.contains("LEFT JOIN \"author_links\" j1 ON j1.\"author_id\" = r.\"id\""));
        assert!(sql.contains("(j0.\"title\" = $1 OR j1.\"key\" = $2)"));

        let (sql, _) = select(&registry, "Author", "prizes.label:Hugo");
        assert!(sql.contains(
            "LEFT JOIN \"author_prizes\" l0 ON l0.\"author_id\" = r.\"id\" \
             LEFT JOIN \"prize\" j0 ON j0.\"id\" = l0.\"prize_id\""
        ));
    }

    #[test]
    fn aggregates_render_having_with_bool_or() {
        let registry = registry();
        let (sql, binds) = select(&registry, "Author", "count{books}::gt:2 or name:Butler");
        assert!(sql.contains(
            "GROUP BY r.\"id\" HAVING (COUNT(DISTINCT j0.\"id\") > $1 OR BOOL_OR(r.\"name\" = $2))"
        ));
        assert_eq!(binds[0], BindValue::Int(2));
    }

    #[test]
    fn in_lists_bind_arrays() {
        let registry = registry();
        let (sql, binds) = select(&registry, "Book", "pages::in:[1,2]");
        assert!(sql.contains("r.\"pages\" = ANY($1)"));
        assert_eq!(binds, vec![BindValue::IntArray(vec![1, 2])]);

        let (sql, binds) = select(&registry, "Book", "pages::not_in:[]");
        assert!(sql.contains("WHERE NOT (FALSE)"));
        assert!(binds.is_empty());
    }

    #[test]
    fn counts_and_pages() {
        let registry = registry();
        let order = resolve_order(&registry, "Book", &[SortKey::desc("pages")]).unwrap();
        let query = SelectQuery::new("Book", compile_filter("", "Book", &registry).unwrap())
            .with_order(order)
            .paged(10, 20);
        let builder = SqlBuilder::new(&registry);
        let (sql, _) = builder.build_select(&query).unwrap();
        assert!(sql.ends_with(
            "ORDER BY r.\"pages\" DESC NULLS LAST, r.\"id\" ASC LIMIT 10 OFFSET 20"
        ));
        let (sql, _) = builder.build_count(&query.count()).unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"book\" r");
    }

    #[test]
    fn related_loads_key_on_owner() {
        let registry = registry();
        let builder = SqlBuilder::new(&registry);
        let query = RelatedQuery {
            owner: "Author".into(),
            attribute: "books".into(),
            target: "Book".into(),
            link: Link::resolve(&registry, "Author", "books").unwrap(),
            keys: vec![Value::Int(1), Value::Int(2)],
            order: Vec::new(),
            limit: Some(5),
            offset: 0,
        };
        let (sql, binds) = builder.build_related(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT r.\"author_id\" AS \"__owner\", r.\"id\", r.\"title\", r.\"pages\", \
             r.\"author_id\" FROM \"book\" r WHERE r.\"author_id\" = ANY($1) \
             ORDER BY r.\"id\" ASC LIMIT 5"
        );
        assert_eq!(binds, vec![BindValue::IntArray(vec![1, 2])]);
    }
}
