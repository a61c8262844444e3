//! In-memory store
//!
//! Evaluates compiled queries directly over stored records with the same
//! semantics the SQL renderer produces: left joins expand one binding per
//! joined row, comparisons use three-valued logic, and aggregate predicates
//! are evaluated per group with plain sub-predicates reduced like `bool_or`.

use super::{Link, Related, RelatedQuery, Store};
use crate::error::{Error, Result};
use crate::filter::{AggregateFn, Comparison, Operand, Operator, Predicate};
use crate::path::{AttrRef, Column, JoinNode, JoinTarget, Source};
use crate::query::{OrderKey, SelectQuery, SortDirection};
use crate::record::Record;
use crate::registry::{AttributeKind, EntityRegistry};
use crate::value::Value;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
struct ElementRow {
    owner: Value,
    key: Value,
    value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Record>>,
    index: HashMap<String, HashMap<String, usize>>,
    links: HashMap<String, Vec<BTreeMap<String, Value>>>,
    elements: HashMap<String, Vec<ElementRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, keyed by entity and id.
    pub fn insert(&mut self, mut record: Record) {
        record.relations.clear();
        let key = record.key();
        let rows = self.tables.entry(record.entity.clone()).or_default();
        let index = self.index.entry(record.entity.clone()).or_default();
        match index.get(&key) {
            Some(&i) => rows[i] = record,
            None => {
                index.insert(key, rows.len());
                rows.push(record);
            }
        }
    }

    /// Add a join-table row linking `owner.attribute` to `target`.
    pub fn link(
        &mut self,
        registry: &EntityRegistry,
        owner: &str,
        attribute: &str,
        owner_id: impl Into<Value>,
        target_id: impl Into<Value>,
    ) -> Result<()> {
        let jt = registry.join_table(owner, attribute)?;
        let mut row = BTreeMap::new();
        row.insert(jt.owner_column, owner_id.into());
        row.insert(jt.target_column, target_id.into());
        self.links.entry(jt.table).or_default().push(row);
        Ok(())
    }

    /// Add an entry to a map-valued attribute.
    pub fn put_entry(
        &mut self,
        registry: &EntityRegistry,
        entity: &str,
        attribute: &str,
        owner_id: impl Into<Value>,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        match &registry.attribute(entity, attribute)?.kind {
            AttributeKind::Map { table, .. } => {
                self.elements.entry(table.clone()).or_default().push(ElementRow {
                    owner: owner_id.into(),
                    key: key.into(),
                    value: value.into(),
                });
                Ok(())
            }
            _ => Err(Error::InvalidPath(format!(
                "{entity}.{attribute} is not a map attribute"
            ))),
        }
    }

    /// Add an element to a collection-valued attribute.
    pub fn push_element(
        &mut self,
        registry: &EntityRegistry,
        entity: &str,
        attribute: &str,
        owner_id: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        match &registry.attribute(entity, attribute)?.kind {
            AttributeKind::Collection { table, .. } => {
                self.elements.entry(table.clone()).or_default().push(ElementRow {
                    owner: owner_id.into(),
                    key: Value::Null,
                    value: value.into(),
                });
                Ok(())
            }
            _ => Err(Error::InvalidPath(format!(
                "{entity}.{attribute} is not a collection attribute"
            ))),
        }
    }

    fn rows(&self, entity: &str) -> &[Record] {
        self.tables.get(entity).map(Vec::as_slice).unwrap_or_default()
    }

    fn find(&self, entity: &str, id: &Value) -> Option<&Record> {
        let i = self.index.get(entity)?.get(&id.key())?;
        self.tables.get(entity)?.get(*i)
    }

    fn matching<'s>(
        &'s self,
        registry: &'s EntityRegistry,
        query: &'s SelectQuery,
    ) -> Result<Vec<&'s Record>> {
        registry.entity(&query.entity)?;
        let evaluator = Evaluator::new(self, registry, query)?;
        let mut out = Vec::new();
        for record in self.rows(&query.entity) {
            if evaluator.matches(record) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn of(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    fn and(self, other: Self) -> Self {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    fn or(self, other: Self) -> Self {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }

    fn not(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    /// `bool_or` over a set of rows.
    fn any(values: impl Iterator<Item = Truth>) -> Self {
        let mut out = Truth::Unknown;
        for v in values {
            match v {
                Truth::True => return Truth::True,
                Truth::False => out = Truth::False,
                Truth::Unknown => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
enum Row<'s> {
    Entity(&'s Record),
    Element(&'s ElementRow),
}

/// One row of the root left-joined with every join node, indexed by join id.
type Binding<'s> = Vec<Option<Row<'s>>>;

enum JoinPlan {
    Link { target: String, link: Link },
    Elements { table: String },
}

struct Evaluator<'s> {
    store: &'s MemoryStore,
    query: &'s SelectQuery,
    plans: Vec<JoinPlan>,
}

impl<'s> Evaluator<'s> {
    fn new(
        store: &'s MemoryStore,
        registry: &'s EntityRegistry,
        query: &'s SelectQuery,
    ) -> Result<Self> {
        let plans = query
            .joins
            .iter()
            .map(|join| join_plan(registry, join))
            .collect::<Result<_>>()?;
        Ok(Self {
            store,
            query,
            plans,
        })
    }

    fn children(&self, parent: &'s Record, join: usize) -> Vec<Row<'s>> {
        let attribute = &self.query.joins[join].attribute;
        match &self.plans[join] {
            JoinPlan::Link { target, link } => {
                related_rows(self.store, target, link, attribute, &parent.id, parent)
                    .into_iter()
                    .map(|(_, record)| Row::Entity(record))
                    .collect()
            }
            JoinPlan::Elements { table } => {
                let key = parent.key();
                self.store
                    .elements
                    .get(table)
                    .into_iter()
                    .flatten()
                    .filter(|row| row.owner.key() == key)
                    .map(Row::Element)
                    .collect()
            }
        }
    }

    fn expand(&self, root: &'s Record) -> Vec<Binding<'s>> {
        let mut bindings: Vec<Binding<'s>> = vec![vec![None; self.query.joins.len()]];
        for join in &self.query.joins {
            let mut next = Vec::with_capacity(bindings.len());
            for binding in bindings {
                let parent = match join.parent {
                    Source::Root => Some(Row::Entity(root)),
                    Source::Join(p) => binding[p],
                };
                let children = match parent {
                    Some(Row::Entity(record)) => self.children(record, join.id),
                    _ => Vec::new(),
                };
                if children.is_empty() {
                    next.push(binding);
                    continue;
                }
                for child in children {
                    let mut expanded = binding.clone();
                    expanded[join.id] = Some(child);
                    next.push(expanded);
                }
            }
            bindings = next;
        }
        bindings
    }

    fn value(&self, root: &'s Record, binding: &Binding<'s>, attr: &AttrRef) -> Value {
        let row = match attr.source {
            Source::Root => Some(Row::Entity(root)),
            Source::Join(j) => binding[j],
        };
        match (row, &attr.column) {
            (Some(Row::Entity(record)), Column::Attribute { name, .. }) => {
                record.field(name).clone()
            }
            (Some(Row::Element(row)), Column::MapKey) => row.key.clone(),
            (Some(Row::Element(row)), Column::MapValue | Column::Element) => row.value.clone(),
            _ => Value::Null,
        }
    }

    fn matches(&self, root: &'s Record) -> bool {
        let Some(predicate) = &self.query.predicate else {
            return true;
        };
        let bindings = self.expand(root);

        if !self.query.aggregate {
            return bindings
                .iter()
                .any(|b| self.eval_row(predicate, root, b) == Truth::True);
        }

        let mut groups: BTreeMap<Vec<String>, Vec<Binding<'s>>> = BTreeMap::new();
        for binding in bindings {
            let key = self
                .query
                .group_by
                .iter()
                .map(|attr| self.value(root, &binding, attr).key())
                .collect();
            groups.entry(key).or_default().push(binding);
        }
        groups
            .values()
            .any(|group| self.eval_group(predicate, root, group) == Truth::True)
    }

    fn eval_row(&self, predicate: &Predicate, root: &'s Record, binding: &Binding<'s>) -> Truth {
        match predicate {
            Predicate::And(a, b) => self
                .eval_row(a, root, binding)
                .and(self.eval_row(b, root, binding)),
            Predicate::Or(a, b) => self
                .eval_row(a, root, binding)
                .or(self.eval_row(b, root, binding)),
            Predicate::Not(inner) => self.eval_row(inner, root, binding).not(),
            Predicate::Compare(c) => {
                let operand = |op: &Operand| match op {
                    Operand::Attribute(attr) | Operand::Aggregate(_, attr) => {
                        Values::One(self.value(root, binding, attr))
                    }
                    other => Values::literal(other),
                };
                evaluate(c, operand(&c.left), operand(&c.right))
            }
        }
    }

    fn eval_group(&self, predicate: &Predicate, root: &'s Record, group: &[Binding<'s>]) -> Truth {
        if !predicate.is_aggregate() {
            return Truth::any(group.iter().map(|b| self.eval_row(predicate, root, b)));
        }
        match predicate {
            Predicate::And(a, b) => self
                .eval_group(a, root, group)
                .and(self.eval_group(b, root, group)),
            Predicate::Or(a, b) => self
                .eval_group(a, root, group)
                .or(self.eval_group(b, root, group)),
            Predicate::Not(inner) => self.eval_group(inner, root, group).not(),
            Predicate::Compare(c) => {
                let operand = |op: &Operand| match op {
                    Operand::Aggregate(function, attr) => Values::One(aggregate(
                        *function,
                        group.iter().map(|b| self.value(root, b, attr)),
                    )),
                    // Grouped by, so constant within the group.
                    Operand::Attribute(attr) => Values::One(
                        group
                            .first()
                            .map(|b| self.value(root, b, attr))
                            .unwrap_or(Value::Null),
                    ),
                    other => Values::literal(other),
                };
                evaluate(c, operand(&c.left), operand(&c.right))
            }
        }
    }
}

fn join_plan(registry: &EntityRegistry, join: &JoinNode) -> Result<JoinPlan> {
    match (&join.target, &registry.attribute(&join.owner, &join.attribute)?.kind) {
        (JoinTarget::Entity(target), _) => Ok(JoinPlan::Link {
            target: target.clone(),
            link: Link::resolve(registry, &join.owner, &join.attribute)?,
        }),
        (_, AttributeKind::Map { table, .. } | AttributeKind::Collection { table, .. }) => {
            Ok(JoinPlan::Elements {
                table: table.clone(),
            })
        }
        _ => Err(Error::InvalidPath(join.path.clone())),
    }
}

/// Target records of `attribute` for one owner, paired with the owner key.
fn related_rows<'s>(
    store: &'s MemoryStore,
    target: &str,
    link: &Link,
    attribute: &str,
    owner_id: &Value,
    owner: &Record,
) -> Vec<(Value, &'s Record)> {
    match link {
        Link::Identity => {
            let id = owner.reference(attribute);
            store
                .find(target, id)
                .map(|r| vec![(r.id.clone(), r)])
                .unwrap_or_default()
        }
        _ => related_for_keys(store, target, link, &HashSet::from([owner_id.key()])),
    }
}

/// Target records whose link key is in `keys`, paired with that key.
fn related_for_keys<'s>(
    store: &'s MemoryStore,
    target: &str,
    link: &Link,
    keys: &HashSet<String>,
) -> Vec<(Value, &'s Record)> {
    match link {
        Link::Identity => store
            .rows(target)
            .iter()
            .filter(|r| keys.contains(&r.key()))
            .map(|r| (r.id.clone(), r))
            .collect(),
        Link::ForeignKey { attribute, .. } => store
            .rows(target)
            .iter()
            .filter_map(|r| {
                let fk = r.reference(attribute);
                (!fk.is_null() && keys.contains(&fk.key())).then(|| (fk.clone(), r))
            })
            .collect(),
        Link::JoinTable(jt) => store
            .links
            .get(&jt.table)
            .into_iter()
            .flatten()
            .filter_map(|row| {
                let owner = row.get(&jt.owner_column)?;
                if !keys.contains(&owner.key()) {
                    return None;
                }
                let record = store.find(target, row.get(&jt.target_column)?)?;
                Some((owner.clone(), record))
            })
            .collect(),
    }
}

enum Values {
    One(Value),
    Many(Vec<Value>),
}

impl Values {
    fn literal(operand: &Operand) -> Self {
        match operand {
            Operand::Literal(v) => Values::One(v.clone()),
            Operand::List(items) => Values::Many(items.clone()),
            _ => Values::One(Value::Null),
        }
    }
}

fn aggregate(function: AggregateFn, values: impl Iterator<Item = Value>) -> Value {
    let present: Vec<Value> = values.filter(|v| !v.is_null()).collect();
    match function {
        AggregateFn::Count => Value::Int(present.len() as i64),
        AggregateFn::CountDistinct => {
            let distinct: HashSet<String> = present.iter().map(Value::key).collect();
            Value::Int(distinct.len() as i64)
        }
        _ if present.is_empty() => Value::Null,
        AggregateFn::Sum => {
            // Integer sum while every input is an integer and it fits in i64.
            let ints = present.iter().try_fold(0i64, |acc, v| match v {
                Value::Int(i) => acc.checked_add(*i),
                _ => None,
            });
            match ints {
                Some(sum) => Value::Int(sum),
                None => Value::Float(present.iter().map(as_f64).sum()),
            }
        }
        AggregateFn::Avg => {
            Value::Float(present.iter().map(as_f64).sum::<f64>() / present.len() as f64)
        }
        AggregateFn::Max | AggregateFn::Greatest => extreme(present, Ordering::Greater),
        AggregateFn::Min | AggregateFn::Least => extreme(present, Ordering::Less),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

fn extreme(values: Vec<Value>, wanted: Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, v| if v.compare(&best) == Some(wanted) { v } else { best })
        .unwrap_or(Value::Null)
}

fn like(operator: Operator, haystack: &str, needle: &str) -> bool {
    let (haystack, needle) = if operator.is_case_insensitive() {
        (haystack.to_lowercase(), needle.to_lowercase())
    } else {
        (haystack.to_string(), needle.to_string())
    };
    match operator {
        Operator::Contains | Operator::IContains => haystack.contains(&needle),
        Operator::StartsWith | Operator::IStartsWith => haystack.starts_with(&needle),
        Operator::EndsWith | Operator::IEndsWith => haystack.ends_with(&needle),
        _ => false,
    }
}

fn evaluate(c: &Comparison, left: Values, right: Values) -> Truth {
    let Values::One(left) = left else {
        return Truth::Unknown;
    };
    let outcome = match (c.operator, right) {
        (Operator::IsNull, _) => Truth::of(left.is_null()),
        (Operator::In, Values::Many(items)) => {
            if items.is_empty() {
                Truth::False
            } else if left.is_null() {
                Truth::Unknown
            } else {
                Truth::of(items.iter().any(|v| left.compare(v) == Some(Ordering::Equal)))
            }
        }
        (_, Values::Many(_)) => Truth::Unknown,
        (Operator::Eq, Values::One(right)) if c.null_safe => match (left.is_null(), right.is_null()) {
            (true, true) => Truth::True,
            (true, false) | (false, true) => Truth::False,
            _ => Truth::of(left.compare(&right) == Some(Ordering::Equal)),
        },
        (op, Values::One(right)) if op.is_like() => match (left.as_text(), right.as_text()) {
            (Some(h), Some(n)) => Truth::of(like(op, h, n)),
            _ => Truth::Unknown,
        },
        (op, Values::One(right)) => match left.compare(&right) {
            None => Truth::Unknown,
            Some(ord) => Truth::of(match op {
                Operator::Eq => ord == Ordering::Equal,
                Operator::Gt => ord == Ordering::Greater,
                Operator::Lt => ord == Ordering::Less,
                Operator::Gte => ord != Ordering::Less,
                Operator::Lte => ord != Ordering::Greater,
                _ => false,
            }),
        },
    };
    if c.negate {
        outcome.not()
    } else {
        outcome
    }
}

/// Nulls last in both directions; ties broken by id.
fn compare_records(a: &Record, b: &Record, order: &[OrderKey]) -> Ordering {
    for key in order {
        let (x, y) = (a.field(&key.attribute), b.field(&key.attribute));
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => {
                let ord = x.compare(y).unwrap_or(Ordering::Equal);
                match key.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.compare(&b.id).unwrap_or(Ordering::Equal)
}

fn page<T>(items: Vec<T>, offset: u64, limit: Option<usize>) -> Vec<T> {
    items
        .into_iter()
        .skip(offset as usize)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<Vec<Record>> {
        let mut matched = self.matching(registry, query)?;
        matched.sort_by(|a, b| compare_records(a, b, &query.order));
        Ok(page(matched, query.offset, query.limit)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn count(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<i64> {
        Ok(self.matching(registry, query)?.len() as i64)
    }

    async fn fetch_related(
        &self,
        registry: &EntityRegistry,
        query: &RelatedQuery,
    ) -> Result<Vec<Related>> {
        registry.entity(&query.target)?;
        let keys: HashSet<String> = query.keys.iter().map(Value::key).collect();
        let mut related = related_for_keys(self, &query.target, &query.link, &keys);
        related.sort_by(|(ka, a), (kb, b)| {
            compare_records(a, b, &query.order).then_with(|| ka.key().cmp(&kb.key()))
        });
        Ok(page(related, query.offset, query.limit)
            .into_iter()
            .map(|(owner_key, record)| Related {
                owner_key,
                record: record.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile_filter;
    use crate::query::{resolve_order, SortKey};
    use crate::value::ScalarType;

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .entity("Customer", "customer", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("name", ScalarType::Text)
                    .scalar("nickname", ScalarType::Text)
                    .one_to_many("orders", "Order")
                    .map("props", ScalarType::Text, ScalarType::Integer)
                    .collection("tags", ScalarType::Text)
                    .many_to_many("groups", "Group")
            })
            .entity("Order", "orders", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("total", ScalarType::Float)
                    .many_to_one("customer", "Customer")
            })
            .entity("Group", "groups", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("label", ScalarType::Text)
            })
            .build()
            .unwrap()
    }

    fn store(registry: &EntityRegistry) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(Record::new("Customer", "id", 1).with("name", "Ada").with("nickname", "Ada"));
        store.insert(Record::new("Customer", "id", 2).with("name", "Bob").with("nickname", Value::Null));
        store.insert(Record::new("Customer", "id", 3).with("name", "cy").with("nickname", Value::Null));
        for (id, customer, total) in [(10, 1, 5.0), (11, 1, 50.0), (12, 2, 20.0)] {
            store.insert(
                Record::new("Order", "id", id)
                    .with("total", total)
                    .with_reference("customer", customer),
            );
        }
        store.insert(Record::new("Group", "id", 100).with("label", "vip"));
        store.link(registry, "Customer", "groups", 1, 100).unwrap();
        store.put_entry(registry, "Customer", "props", 2, "tier", 3).unwrap();
        store.push_element(registry, "Customer", "tags", 3, "new").unwrap();
        store
    }

    async fn ids(store: &MemoryStore, registry: &EntityRegistry, filter: &str) -> Vec<i64> {
        let compiled = compile_filter(filter, "Customer", registry).unwrap();
        let order = resolve_order(registry, "Customer", &[SortKey::asc("id")]).unwrap();
        let query = SelectQuery::new("Customer", compiled).with_order(order);
        store
            .select(registry, &query)
            .await
            .unwrap()
            .into_iter()
            .map(|r| match r.id {
                Value::Int(i) => i,
                other => panic!("unexpected id {other}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn joins_do_not_duplicate_roots() {
        let registry = registry();
        let store = store(&registry);
        assert_eq!(ids(&store, &registry, "orders.total::gt:1").await, vec![1, 2]);
        assert_eq!(ids(&store, &registry, "orders::isnull").await, vec![3]);
    }

    #[tokio::test]
    async fn three_valued_negation() {
        let registry = registry();
        let store = store(&registry);
        // NOT (NULL = 'Ada') is unknown, so customers without nickname drop out.
        assert_eq!(ids(&store, &registry, "not nickname:Ada").await, Vec::<i64>::new());
        assert_eq!(ids(&store, &registry, "name::eq_prop:nickname").await, vec![1]);
        assert_eq!(ids(&store, &registry, "id::in:[]").await, Vec::<i64>::new());
        assert_eq!(ids(&store, &registry, "id::not_in:[]").await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn like_operators_respect_case() {
        let registry = registry();
        let store = store(&registry);
        assert_eq!(ids(&store, &registry, "name::startswith:C").await, Vec::<i64>::new());
        assert_eq!(ids(&store, &registry, "name::istartswith:C").await, vec![3]);
        assert_eq!(ids(&store, &registry, "name::contains:o").await, vec![2]);
    }

    #[tokio::test]
    async fn aggregates_group_by_root() {
        let registry = registry();
        let store = store(&registry);
        assert_eq!(ids(&store, &registry, "count{orders}:2").await, vec![1]);
        assert_eq!(ids(&store, &registry, "count{orders}:0").await, vec![3]);
        assert_eq!(ids(&store, &registry, "sum{orders.total}::gte:20").await, vec![1, 2]);
        assert_eq!(
            ids(&store, &registry, "count{orders}:0 or orders.total::lt:10").await,
            vec![1, 3]
        );
    }

    #[test]
    fn integer_sums_widen_instead_of_overflowing() {
        let sum = aggregate(AggregateFn::Sum, [Value::Int(i64::MAX), Value::Int(1)].into_iter());
        assert_eq!(sum, Value::Float(i64::MAX as f64 + 1.0));
        let sum = aggregate(AggregateFn::Sum, [Value::Int(2), Value::Null, Value::Int(3)].into_iter());
        assert_eq!(sum, Value::Int(5));
    }

    #[tokio::test]
    async fn element_and_link_joins() {
        let registry = registry();
        let store = store(&registry);
        assert_eq!(ids(&store, &registry, "props.key:tier and props.value::gt:2").await, vec![2]);
        assert_eq!(ids(&store, &registry, "tags:new").await, vec![3]);
        assert_eq!(ids(&store, &registry, "groups.label:vip").await, vec![1]);
    }

    #[tokio::test]
    async fn related_rows_are_paged_per_query() {
        let registry = registry();
        let store = store(&registry);
        let order = resolve_order(&registry, "Order", &[SortKey::desc("total")]).unwrap();
        let related = store
            .fetch_related(
                &registry,
                &RelatedQuery {
                    owner: "Customer".into(),
                    attribute: "orders".into(),
                    target: "Order".into(),
                    link: Link::resolve(&registry, "Customer", "orders").unwrap(),
                    keys: vec![Value::Int(1)],
                    order,
                    limit: Some(1),
                    offset: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].record.id, Value::Int(11));
        assert_eq!(related[0].owner_key, Value::Int(1));
    }
}
