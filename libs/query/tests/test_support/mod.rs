#![allow(dead_code)]

use async_trait::async_trait;
use sift_query::query::SelectQuery;
use sift_query::store::{Related, RelatedQuery};
use sift_query::{EntityRegistry, MemoryStore, Record, Result, ScalarType, Store};
use std::sync::atomic::{AtomicUsize, Ordering};

/// `Entity1 -< Entity2 -< Entity3`, every association bidirectional.
pub fn entity_registry() -> EntityRegistry {
    EntityRegistry::builder()
        .entity("Entity1", "entity1", |e| {
            e.id("id", ScalarType::Integer)
                .scalar("name", ScalarType::Text)
                .one_to_many("entity2s", "Entity2")
        })
        .entity("Entity2", "entity2", |e| {
            e.id("id", ScalarType::Integer)
                .scalar("name", ScalarType::Text)
                .many_to_one("entity1", "Entity1")
                .one_to_many("entity3s", "Entity3")
        })
        .entity("Entity3", "entity3", |e| {
            e.id("id", ScalarType::Integer)
                .scalar("name", ScalarType::Text)
                .many_to_one("entity2", "Entity2")
        })
        .build()
        .expect("test registry must build")
}

/// Two `Entity1` rows: `one` with three children, one of whose grandchildren
/// is `e5`, and `two` with a single child.
pub fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert(Record::new("Entity1", "id", 1).with("name", "one"));
    store.insert(Record::new("Entity1", "id", 2).with("name", "two"));

    for (id, name, parent) in [(10, "a", 1), (11, "b", 1), (12, "c", 1), (20, "d", 2)] {
        store.insert(
            Record::new("Entity2", "id", id)
                .with("name", name)
                .with_reference("entity1", parent),
        );
    }
    for (id, name, parent) in [
        (100, "e03", 10),
        (101, "e5", 11),
        (102, "e13", 12),
        (103, "e1", 20),
        (104, "e2", 20),
    ] {
        store.insert(
            Record::new("Entity3", "id", id)
                .with("name", name)
                .with_reference("entity2", parent),
        );
    }
    store
}

/// Store wrapper that counts round trips by kind.
pub struct CountingStore<S> {
    pub inner: S,
    selects: AtomicUsize,
    counts: AtomicUsize,
    related: AtomicUsize,
}

impl<S: Store> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            selects: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
            related: AtomicUsize::new(0),
        }
    }

    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn related(&self) -> usize {
        self.related.load(Ordering::SeqCst)
    }

    pub fn round_trips(&self) -> usize {
        self.selects() + self.counts() + self.related()
    }
}

#[async_trait]
impl<S: Store> Store for CountingStore<S> {
    async fn select(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<Vec<Record>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.select(registry, query).await
    }

    async fn count(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<i64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.inner.count(registry, query).await
    }

    async fn fetch_related(
        &self,
        registry: &EntityRegistry,
        query: &RelatedQuery,
    ) -> Result<Vec<Related>> {
        self.related.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_related(registry, query).await
    }

    fn is_loaded(&self, record: &Record, attribute: &str) -> bool {
        self.inner.is_loaded(record, attribute)
    }
}

pub fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.field("name").to_string())
        .collect()
}
