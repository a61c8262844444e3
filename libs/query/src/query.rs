//! Criteria objects handed to a [`Store`](crate::store::Store) and the page result type

use crate::error::{Error, Result};
use crate::filter::{CompiledFilter, Predicate};
use crate::path::{AttrRef, JoinNode};
use crate::registry::EntityRegistry;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// An unresolved sort request on a field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// A sort key resolved to a scalar attribute of the queried entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderKey {
    pub attribute: String,
    pub column: String,
    pub direction: SortDirection,
}

/// Resolve sort keys against scalar attributes of `entity`.
pub fn resolve_order(
    registry: &EntityRegistry,
    entity: &str,
    keys: &[SortKey],
) -> Result<Vec<OrderKey>> {
    keys.iter()
        .map(|key| {
            let attr = registry.attribute(entity, &key.field)?;
            if attr.scalar_type().is_none() {
                return Err(Error::InvalidPath(format!(
                    "Cannot sort {entity} by non-scalar attribute '{}'",
                    key.field
                )));
            }
            Ok(OrderKey {
                attribute: attr.name.clone(),
                column: attr.column.clone(),
                direction: key.direction,
            })
        })
        .collect()
}

/// Root selection criteria.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectQuery {
    pub entity: String,
    pub joins: Vec<JoinNode>,
    pub predicate: Option<Predicate>,
    pub aggregate: bool,
    pub group_by: Vec<AttrRef>,
    pub order: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: u64,
}

impl SelectQuery {
    pub fn new(entity: &str, filter: CompiledFilter) -> Self {
        Self {
            entity: entity.to_string(),
            joins: filter.joins,
            predicate: filter.predicate,
            aggregate: filter.aggregate,
            group_by: filter.group_by,
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn with_order(mut self, order: Vec<OrderKey>) -> Self {
        self.order = order;
        self
    }

    pub fn paged(mut self, limit: usize, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Predicate-only form used for the total count.
    pub fn count(&self) -> Self {
        Self {
            order: Vec::new(),
            limit: None,
            offset: 0,
            ..self.clone()
        }
    }

    /// Whether matching roots must be de-duplicated through an id subquery.
    pub fn needs_subquery(&self) -> bool {
        self.aggregate || !self.joins.is_empty()
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub size: usize,
    /// Total number of matches, absent when counting was disabled.
    pub total: Option<i64>,
    pub total_pages: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u64, size: usize, total: Option<i64>) -> Self {
        let total_pages = total.map(|t| {
            if size == 0 {
                0
            } else {
                (t.max(0) as u64).div_ceil(size as u64)
            }
        });
        Self {
            items,
            page,
            size,
            total,
            total_pages,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> std::result::Result<U, E>) -> std::result::Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<std::result::Result<_, _>>()?,
            page: self.page,
            size: self.size,
            total: self.total,
            total_pages: self.total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarType;

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<i32> = Page::new(vec![1, 2], 1, 2, Some(5));
        assert_eq!(page.total_pages, Some(3));
        let page: Page<i32> = Page::new(Vec::new(), 1, 10, None);
        assert_eq!(page.total_pages, None);
    }

    #[test]
    fn sorting_requires_scalar_attributes() {
        let registry = EntityRegistry::builder()
            .entity("A", "a", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("name", ScalarType::Text)
                    .column("display_name")
                    .many_to_one("parent", "A")
            })
            .build()
            .unwrap();
        let order = resolve_order(&registry, "A", &[SortKey::desc("name")]).unwrap();
        assert_eq!(order[0].column, "display_name");
        assert!(matches!(
            resolve_order(&registry, "A", &[SortKey::asc("parent")]),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            resolve_order(&registry, "A", &[SortKey::asc("missing")]),
            Err(Error::AttributeNotFound { .. })
        ));
    }
}
