//! Loads the associations named by a fetch plan onto a root page
//!
//! Paths are processed shallowest first. At each path the owners are gathered
//! across every record already loaded at that depth; each join fetch is then
//! one batched round trip keyed by the owners' identifiers, and each query
//! fetch is one bounded, sorted round trip per owner.

use super::plan::{entity_at, Fetch, FetchPlan};
use crate::error::Result;
use crate::query::resolve_order;
use crate::record::{Loaded, Record};
use crate::registry::EntityRegistry;
use crate::store::{Link, Related, RelatedQuery, Store};
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub struct FetchExecutor<'a> {
    store: &'a dyn Store,
    registry: &'a EntityRegistry,
}

/// Records reached from `roots` by following the loaded associations in `path`.
fn owners_at<'r>(roots: &'r mut [Record], path: &str) -> Vec<&'r mut Record> {
    let mut current: Vec<&'r mut Record> = roots.iter_mut().collect();
    if path.is_empty() {
        return current;
    }
    for seg in path.split('.') {
        current = current
            .into_iter()
            .flat_map(|record| record.related_mut(seg))
            .collect();
    }
    current
}

fn owner_key(record: &Record, attribute: &str, link: &Link) -> Value {
    match link {
        Link::Identity => record.reference(attribute).clone(),
        _ => record.id.clone(),
    }
}

fn distinct_keys<'v>(keys: impl Iterator<Item = &'v Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    keys.filter(|k| !k.is_null())
        .filter(|k| seen.insert(k.key()))
        .cloned()
        .collect()
}

fn loaded(records: Vec<Record>, to_many: bool) -> Loaded {
    if to_many {
        Loaded::Many(records)
    } else {
        Loaded::One(records.into_iter().next().map(Box::new))
    }
}

impl<'a> FetchExecutor<'a> {
    pub fn new(store: &'a dyn Store, registry: &'a EntityRegistry) -> Self {
        Self { store, registry }
    }

    /// Load every association named in `plan` onto `roots`, which are
    /// instances of `entity`. Any failing round trip aborts the whole load.
    pub async fn execute(
        &self,
        entity: &str,
        roots: &mut [Record],
        plan: &FetchPlan,
    ) -> Result<()> {
        if plan.is_empty() || roots.is_empty() {
            return Ok(());
        }

        for path in plan.paths() {
            let owner = entity_at(self.registry, entity, &path)?;
            for fetch in plan.joins_at(&path) {
                let mut owners = owners_at(roots, &path);
                self.load_joined(&owner, &mut owners, fetch).await?;
            }
            for fetch in plan.queries_at(&path) {
                let mut owners = owners_at(roots, &path);
                self.load_queried(&owner, &mut owners, fetch).await?;
            }
        }
        Ok(())
    }

    /// One batched round trip for all owners of `fetch`.
    async fn load_joined(
        &self,
        owner: &str,
        owners: &mut [&mut Record],
        fetch: &Fetch,
    ) -> Result<()> {
        let relation = self.registry.relation(owner, &fetch.name)?;
        let to_many = relation.kind.is_to_many();
        let link = Link::resolve(self.registry, owner, &fetch.name)?;

        let pending: Vec<usize> = (0..owners.len())
            .filter(|&i| !self.store.is_loaded(&*owners[i], &fetch.name))
            .collect();
        if pending.is_empty() {
            debug!(owner, fetch = %fetch.name, "Association already loaded, skipping");
            return Ok(());
        }

        let keys = distinct_keys(pending.iter().map(|&i| match link {
            Link::Identity => owners[i].reference(&fetch.name),
            _ => &owners[i].id,
        }));

        let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();
        if !keys.is_empty() {
            debug!(
                owner,
                fetch = %fetch.name,
                keys = keys.len(),
                "Batch loading joined association"
            );
            let related = self
                .store
                .fetch_related(
                    self.registry,
                    &RelatedQuery {
                        owner: owner.to_string(),
                        attribute: fetch.name.clone(),
                        target: relation.target.clone(),
                        link: link.clone(),
                        keys,
                        order: Vec::new(),
                        limit: None,
                        offset: 0,
                    },
                )
                .await?;
            for Related { owner_key, record } in related {
                grouped.entry(owner_key.key()).or_default().push(record);
            }
        }

        for i in pending {
            let key = owner_key(&*owners[i], &fetch.name, &link);
            let records = if key.is_null() {
                Vec::new()
            } else {
                grouped.get(&key.key()).cloned().unwrap_or_default()
            };
            owners[i].set_relation(&fetch.name, loaded(records, to_many));
        }
        Ok(())
    }

    /// One bounded, sorted round trip per owner of `fetch`.
    async fn load_queried(
        &self,
        owner: &str,
        owners: &mut [&mut Record],
        fetch: &Fetch,
    ) -> Result<()> {
        let relation = self.registry.relation(owner, &fetch.name)?;
        let link = Link::resolve(self.registry, owner, &fetch.name)?;
        let order = resolve_order(self.registry, &relation.target, &fetch.sorting)?;

        for record in owners.iter_mut() {
            if self.store.is_loaded(record, &fetch.name) {
                continue;
            }
            let key = owner_key(record, &fetch.name, &link);
            if key.is_null() {
                record.set_relation(&fetch.name, Loaded::Many(Vec::new()));
                continue;
            }
            debug!(
                owner,
                fetch = %fetch.name,
                id = %record.id,
                offset = fetch.offset,
                limit = ?fetch.limit,
                "Loading bounded association"
            );
            let related = self
                .store
                .fetch_related(
                    self.registry,
                    &RelatedQuery {
                        owner: owner.to_string(),
                        attribute: fetch.name.clone(),
                        target: relation.target.clone(),
                        link: link.clone(),
                        keys: vec![key],
                        order: order.clone(),
                        limit: fetch.limit,
                        offset: fetch.offset,
                    },
                )
                .await?;
            let records = related.into_iter().map(|r| r.record).collect();
            record.set_relation(&fetch.name, Loaded::Many(records));
        }
        Ok(())
    }
}
