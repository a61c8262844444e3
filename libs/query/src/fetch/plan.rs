//! Fetch-plan mini-language
//!
//! ```text
//! plan  := field (WS field)*
//! field := name (bound)? (sort)? ( "{" plan "}" )?
//! bound := "[" INT "]" | "[" INT? ":" INT? "]"
//! sort  := "(" name ":" dir ("," name ":" dir)* ")"
//! ```
//!
//! A numeric bound turns a field into a query fetch with 1-based inclusive
//! positions. `[]` and `[:]` only mark a collection and keep the field a join
//! fetch. A sort without a numeric bound is rejected because a join cannot
//! order or slice a nested collection without breaking the outer page.

use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::query::{SortDirection, SortKey};
use crate::registry::EntityRegistry;
use crate::store::Link;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    Join,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fetch {
    pub name: String,
    pub kind: FetchKind,
    pub is_collection: bool,
    pub offset: u64,
    pub limit: Option<usize>,
    pub sorting: Vec<SortKey>,
}

impl Fetch {
    pub fn join(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FetchKind::Join,
            is_collection: false,
            offset: 0,
            limit: None,
            sorting: Vec::new(),
        }
    }

    /// Join fetch of a collection-valued association.
    pub fn join_collection(name: &str) -> Self {
        Self {
            is_collection: true,
            ..Self::join(name)
        }
    }

    /// Unbounded query fetch; bound and sort it with the `with_*` methods.
    pub fn query(name: &str) -> Self {
        Self {
            kind: FetchKind::Query,
            is_collection: true,
            ..Self::join(name)
        }
    }

    pub fn with_bounds(mut self, offset: u64, limit: Option<usize>) -> Result<Self> {
        if self.kind == FetchKind::Join {
            return Err(Error::JoinCannotBound(self.name));
        }
        self.offset = offset;
        self.limit = limit;
        Ok(self)
    }

    pub fn with_sort(mut self, sorting: Vec<SortKey>) -> Result<Self> {
        if self.kind == FetchKind::Join {
            return Err(Error::JoinCannotBound(self.name));
        }
        self.sorting = sorting;
        Ok(self)
    }
}

/// Join and query fetches keyed by dotted parent path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchPlan {
    joins: BTreeMap<String, Vec<Fetch>>,
    queries: BTreeMap<String, Vec<Fetch>>,
}

fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('.').count()
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn ordered(paths: impl Iterator<Item = String>) -> Vec<String> {
    let mut paths: Vec<String> = paths.collect();
    paths.sort_by(|a, b| {
        depth(a)
            .cmp(&depth(b))
            .then(a.len().cmp(&b.len()))
            .then(a.cmp(b))
    });
    paths.dedup();
    paths
}

impl FetchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Result<Self> {
        PlanParser::new(input).parse()
    }

    /// Add a fetch under `parent` (`""` for the root).
    pub fn add(&mut self, parent: &str, fetch: Fetch) -> Result<()> {
        let taken = self
            .joins
            .get(parent)
            .into_iter()
            .chain(self.queries.get(parent))
            .flatten()
            .any(|f| f.name == fetch.name);
        if taken {
            return Err(Error::malformed_plan(
                0,
                format!("'{}' is fetched twice", child_path(parent, &fetch.name)),
            ));
        }
        let map = match fetch.kind {
            FetchKind::Join => &mut self.joins,
            FetchKind::Query => &mut self.queries,
        };
        map.entry(parent.to_string()).or_default().push(fetch);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.queries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.joins.values().chain(self.queries.values()).map(Vec::len).sum()
    }

    /// Parent paths that carry join fetches, shallowest and shortest first.
    pub fn join_paths(&self) -> Vec<String> {
        ordered(self.joins.keys().cloned())
    }

    /// Parent paths that carry query fetches, shallowest and shortest first.
    pub fn query_paths(&self) -> Vec<String> {
        ordered(self.queries.keys().cloned())
    }

    /// All distinct parent paths in execution order.
    pub fn paths(&self) -> Vec<String> {
        ordered(self.joins.keys().chain(self.queries.keys()).cloned())
    }

    pub fn joins_at(&self, path: &str) -> &[Fetch] {
        self.joins.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn queries_at(&self, path: &str) -> &[Fetch] {
        self.queries.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    /// Check every fetch against the registry and the configured limits.
    pub fn validate(
        &self,
        entity: &str,
        registry: &EntityRegistry,
        config: &QueryConfig,
    ) -> Result<()> {
        if self.len() > config.max_fetches {
            return Err(Error::TooCostly(format!(
                "Fetch plan has {} entries, maximum is {}",
                self.len(),
                config.max_fetches
            )));
        }

        for path in self.paths() {
            if depth(&path) + 1 > config.max_fetch_depth {
                return Err(Error::TooCostly(format!(
                    "Fetch path '{path}' exceeds maximum depth of {}",
                    config.max_fetch_depth
                )));
            }
            let owner = entity_at(registry, entity, &path)?;
            for fetch in self.joins_at(&path).iter().chain(self.queries_at(&path)) {
                let relation = registry.relation(&owner, &fetch.name)?;
                Link::resolve(registry, &owner, &fetch.name)?;
                if fetch.kind == FetchKind::Query && !relation.kind.is_to_many() {
                    return Err(Error::InvalidPath(format!(
                        "{owner}.{} is a to-one association and cannot be bounded or sorted",
                        fetch.name
                    )));
                }
                if fetch.kind == FetchKind::Query {
                    crate::query::resolve_order(registry, &relation.target, &fetch.sorting)?;
                }
            }
        }
        Ok(())
    }
}

/// Entity reached from `root` by following the associations named in `path`.
pub fn entity_at(registry: &EntityRegistry, root: &str, path: &str) -> Result<String> {
    let mut entity = registry.entity(root)?.name.clone();
    if path.is_empty() {
        return Ok(entity);
    }
    for seg in path.split('.') {
        entity = registry.relation(&entity, seg)?.target.clone();
    }
    Ok(entity)
}

struct PlanParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PlanParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.consume_char();
        }
    }

    fn parse(mut self) -> Result<FetchPlan> {
        let mut plan = FetchPlan::new();
        // Open braces: (child path, index of the brace).
        let mut stack: Vec<(String, usize)> = Vec::new();
        let mut last: Option<String> = None;

        loop {
            self.skip_ws();
            let at = self.pos;
            match self.peek_char() {
                None => break,
                Some('{') => {
                    let Some(path) = last.take() else {
                        return Err(Error::malformed_plan(at, "'{' must follow a field name"));
                    };
                    self.consume_char();
                    stack.push((path, at));
                }
                Some('}') => {
                    if stack.pop().is_none() {
                        return Err(Error::malformed_plan(at, "unmatched '}'"));
                    }
                    self.consume_char();
                    last = None;
                }
                Some(_) => {
                    let parent = stack.last().map(|(p, _)| p.as_str()).unwrap_or("");
                    let fetch = self.parse_field()?;
                    let path = child_path(parent, &fetch.name);
                    plan.add(parent, fetch).map_err(|e| match e {
                        Error::MalformedFetchPlan { message, .. } => {
                            Error::malformed_plan(at, message)
                        }
                        other => other,
                    })?;
                    last = Some(path);
                }
            }
        }

        if let Some((_, index)) = stack.pop() {
            return Err(Error::malformed_plan(index, "unterminated '{'"));
        }
        Ok(plan)
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.consume_char();
        }
        if self.pos == start {
            let found = self.peek_char().map(String::from).unwrap_or_default();
            return Err(Error::malformed_plan(
                start,
                format!("expected field name, found '{found}'"),
            ));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// Text up to the matching `close`, which is consumed.
    fn delimited(&mut self, open: char, close: char) -> Result<&'a str> {
        let start = self.pos;
        self.consume_char();
        let body_start = self.pos;
        let Some(len) = self.remaining().find(close) else {
            return Err(Error::malformed_plan(start, format!("unterminated '{open}'")));
        };
        let body = &self.input[body_start..body_start + len];
        self.pos = body_start + len + close.len_utf8();
        Ok(body)
    }

    fn parse_field(&mut self) -> Result<Fetch> {
        let name = self.parse_name()?;
        let mut fetch = Fetch::join(&name);

        if self.peek_char() == Some('[') {
            let at = self.pos;
            let body = self.delimited('[', ']')?;
            fetch = match parse_bound(body).map_err(|m| Error::malformed_plan(at, m))? {
                None => Fetch::join_collection(&name),
                Some((offset, limit)) => Fetch::query(&name).with_bounds(offset, limit)?,
            };
        }

        if self.peek_char() == Some('(') {
            let at = self.pos;
            let body = self.delimited('(', ')')?;
            let sorting = parse_fetch_sort(body).map_err(|m| Error::malformed_plan(at, m))?;
            fetch = fetch.with_sort(sorting)?;
        }

        Ok(fetch)
    }
}

/// `None` for a bare collection marker, else `(offset, limit)`.
fn parse_bound(body: &str) -> std::result::Result<Option<(u64, Option<usize>)>, String> {
    let body = body.trim();
    let position = |s: &str| -> std::result::Result<Option<u64>, String> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        match s.parse::<u64>() {
            Ok(0) => Err("positions start at 1".to_string()),
            Ok(n) => Ok(Some(n)),
            Err(_) => Err(format!("invalid position '{s}'")),
        }
    };

    match body.split_once(':') {
        None if body.is_empty() => Ok(None),
        None => {
            let n = position(body)?.unwrap_or(1);
            Ok(Some((n - 1, Some(1))))
        }
        Some((from, to)) => match (position(from)?, position(to)?) {
            (None, None) => Ok(None),
            (from, Some(to)) => {
                let from = from.unwrap_or(1);
                if to < from {
                    return Err(format!("empty range [{from}:{to}]"));
                }
                Ok(Some((from - 1, Some((to - from + 1) as usize))))
            }
            (Some(from), None) => Ok(Some((from - 1, None))),
        },
    }
}

fn parse_fetch_sort(body: &str) -> std::result::Result<Vec<SortKey>, String> {
    body.split(',')
        .map(|item| {
            let item = item.trim();
            let (field, dir) = item
                .split_once(':')
                .ok_or_else(|| format!("sort entry '{item}' needs a direction"))?;
            let direction = SortDirection::parse(dir.trim())
                .ok_or_else(|| format!("invalid sort direction '{}'", dir.trim()))?;
            let field = field.trim();
            if field.is_empty() {
                return Err(format!("empty sort field in '{item}'"));
            }
            Ok(SortKey {
                field: field.to_string(),
                direction,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarType;

    #[test]
    fn collection_markers_stay_joins() {
        let plan = FetchPlan::parse("orders[]{ items[] { attributes[] } }").unwrap();
        assert_eq!(plan.join_paths(), ["", "orders", "orders.items"]);
        assert!(plan.query_paths().is_empty());
        for path in ["", "orders", "orders.items"] {
            assert!(plan.joins_at(path).iter().all(|f| f.is_collection));
        }
    }

    #[test]
    fn numeric_bounds_make_query_fetches() {
        let plan = FetchPlan::parse("orders[1]{ items[1:2] { attributes[1:10] } }").unwrap();
        assert_eq!(plan.query_paths(), ["", "orders", "orders.items"]);
        assert!(plan.join_paths().is_empty());

        let orders = &plan.queries_at("")[0];
        assert!(orders.is_collection);
        assert_eq!((orders.offset, orders.limit), (0, Some(1)));
        let items = &plan.queries_at("orders")[0];
        assert_eq!((items.offset, items.limit), (0, Some(2)));
        let attributes = &plan.queries_at("orders.items")[0];
        assert_eq!((attributes.offset, attributes.limit), (0, Some(10)));
    }

    #[test]
    fn open_ended_bounds() {
        let plan = FetchPlan::parse("a[3:] b[:4] c[2]").unwrap();
        let q = plan.queries_at("");
        assert_eq!((q[0].offset, q[0].limit), (2, None));
        assert_eq!((q[1].offset, q[1].limit), (0, Some(4)));
        assert_eq!((q[2].offset, q[2].limit), (1, Some(1)));
    }

    #[test]
    fn sort_applies_to_bounded_fetches() {
        let plan = FetchPlan::parse("orders[1:5](placed:desc, id:asc){lines}").unwrap();
        let orders = &plan.queries_at("")[0];
        assert_eq!(
            orders.sorting,
            vec![SortKey::desc("placed"), SortKey::asc("id")]
        );
        assert_eq!(plan.joins_at("orders")[0].name, "lines");
        assert!(!plan.joins_at("orders")[0].is_collection);
    }

    #[test]
    fn join_fetches_cannot_be_sorted_or_bounded() {
        assert!(matches!(
            FetchPlan::parse("orders(placed:desc)"),
            Err(Error::JoinCannotBound(name)) if name == "orders"
        ));
        assert!(matches!(
            FetchPlan::parse("orders[](placed:desc)"),
            Err(Error::JoinCannotBound(_))
        ));
        assert!(matches!(
            Fetch::join("orders").with_bounds(0, Some(1)),
            Err(Error::JoinCannotBound(_))
        ));
    }

    #[test]
    fn paths_order_by_depth_then_length() {
        let plan = FetchPlan::parse("customer{address} lines{product{vendor}} notes").unwrap();
        assert_eq!(
            plan.paths(),
            ["", "lines", "customer", "lines.product"]
        );
    }

    #[test]
    fn malformed_plans_report_position() {
        assert!(matches!(
            FetchPlan::parse("orders{items"),
            Err(Error::MalformedFetchPlan { index: 6, .. })
        ));
        assert!(matches!(
            FetchPlan::parse("orders}"),
            Err(Error::MalformedFetchPlan { index: 6, .. })
        ));
        assert!(matches!(
            FetchPlan::parse("orders[1"),
            Err(Error::MalformedFetchPlan { index: 6, .. })
        ));
        assert!(matches!(
            FetchPlan::parse("orders[0]"),
            Err(Error::MalformedFetchPlan { .. })
        ));
        assert!(matches!(
            FetchPlan::parse("{items}"),
            Err(Error::MalformedFetchPlan { index: 0, .. })
        ));
        assert!(matches!(
            FetchPlan::parse("orders orders[1]"),
            Err(Error::MalformedFetchPlan { index: 7, .. })
        ));
    }

    #[test]
    fn validation_checks_registry_and_limits() {
        let registry = EntityRegistry::builder()
            .entity("Customer", "customer", |e| {
                e.id("id", ScalarType::Integer)
                    .one_to_many("orders", "Order")
                    .many_to_one("referrer", "Customer")
            })
            .entity("Order", "orders", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("placed", ScalarType::Date)
                    .many_to_one("customer", "Customer")
            })
            .build()
            .unwrap();
        let config = QueryConfig::default();

        let ok = FetchPlan::parse("orders[1:3](placed:desc){customer} referrer").unwrap();
        assert!(ok.validate("Customer", &registry, &config).is_ok());

        let bad = FetchPlan::parse("invoices").unwrap();
        assert!(matches!(
            bad.validate("Customer", &registry, &config),
            Err(Error::AttributeNotFound { .. })
        ));

        let to_one = FetchPlan::parse("referrer[1]").unwrap();
        assert!(matches!(
            to_one.validate("Customer", &registry, &config),
            Err(Error::InvalidPath(_))
        ));

        let deep = FetchPlan::parse("orders{customer{orders{customer{orders}}}}").unwrap();
        assert!(matches!(
            deep.validate("Customer", &registry, &config),
            Err(Error::TooCostly(_))
        ));
    }
}
