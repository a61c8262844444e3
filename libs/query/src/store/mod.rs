//! Backing-store abstraction
//!
//! A store executes the criteria produced by the compiler. Every method is a
//! single round trip; the fetch executor decides how many are issued.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use crate::error::Result;
use crate::query::{OrderKey, SelectQuery};
use crate::record::Record;
use crate::registry::{EntityRegistry, JoinTableDef, RelationKind};
use crate::value::Value;
use async_trait::async_trait;
use serde::Serialize;

/// How target rows of an association are matched to their owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    /// Keys are target identifiers read from the owners' foreign keys.
    Identity,
    /// Keys are owner identifiers matched against a foreign key on the target.
    ForeignKey { attribute: String, column: String },
    /// Keys are owner identifiers matched through a join table.
    JoinTable(JoinTableDef),
}

impl Link {
    /// Resolve the link for `owner.attribute` from the registry.
    pub fn resolve(registry: &EntityRegistry, owner: &str, attribute: &str) -> Result<Self> {
        let relation = registry.relation(owner, attribute)?;
        match relation.kind {
            RelationKind::ManyToOne => Ok(Link::Identity),
            RelationKind::OneToOne if relation.owning => Ok(Link::Identity),
            RelationKind::OneToOne | RelationKind::OneToMany => {
                let back = registry.back_reference(owner, attribute)?;
                let column = registry.inverse_join_column(owner, attribute)?;
                Ok(Link::ForeignKey {
                    attribute: back.name.clone(),
                    column,
                })
            }
            RelationKind::ManyToMany => Ok(Link::JoinTable(registry.join_table(owner, attribute)?)),
        }
    }
}

/// Criteria for loading the targets of one association for a set of owners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedQuery {
    pub owner: String,
    pub attribute: String,
    pub target: String,
    pub link: Link,
    pub keys: Vec<Value>,
    pub order: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: u64,
}

/// A target row together with the key that ties it to its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    /// Owner identifier, or the target identifier for [`Link::Identity`].
    pub owner_key: Value,
    pub record: Record,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Select one page of root records.
    async fn select(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<Vec<Record>>;

    /// Count all root records matching the query's predicate.
    async fn count(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<i64>;

    /// Load association targets for a batch of owner keys.
    async fn fetch_related(
        &self,
        registry: &EntityRegistry,
        query: &RelatedQuery,
    ) -> Result<Vec<Related>>;

    /// Whether `attribute` is already loaded on `record`, without loading it.
    fn is_loaded(&self, record: &Record, attribute: &str) -> bool {
        record.is_loaded(attribute)
    }
}
