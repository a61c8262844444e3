//! Query entry points
//!
//! A request is compiled completely (filter, sort, fetch plan, limits)
//! before the first round trip. Execution then runs strictly in order:
//! root page, total count, then the fetch plan path by path.

use crate::config::QueryConfig;
use crate::error::Result;
use crate::fetch::{FetchExecutor, FetchPlan};
use crate::filter::FilterCompiler;
use crate::pager::Pager;
use crate::query::{resolve_order, Page, SelectQuery};
use crate::record::Record;
use crate::registry::EntityRegistry;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// A fully compiled request, ready to execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prepared {
    pub select: SelectQuery,
    /// Count form of `select`, absent when counting is disabled.
    pub count: Option<SelectQuery>,
    pub plan: FetchPlan,
}

/// Compile and validate a request against `registry` and `config`.
pub fn prepare(
    registry: &EntityRegistry,
    config: &QueryConfig,
    filter: &str,
    pager: &Pager,
    fetch: &str,
    entity: &str,
) -> Result<Prepared> {
    pager.validate_limits(config)?;

    let compiled = FilterCompiler::new(registry, config).compile(filter, entity)?;
    let plan = FetchPlan::parse(fetch)?;
    plan.validate(entity, registry, config)?;

    let order = resolve_order(registry, entity, pager.sort())?;
    let select = SelectQuery::new(entity, compiled)
        .with_order(order)
        .paged(pager.size(), pager.offset());
    let count = pager.count_enabled().then(|| select.count());
    Ok(Prepared {
        select,
        count,
        plan,
    })
}

pub struct QueryService<'a> {
    store: &'a dyn Store,
    registry: &'a EntityRegistry,
    config: &'a QueryConfig,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a dyn Store, registry: &'a EntityRegistry, config: &'a QueryConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Compile and validate a request without touching the store.
    pub fn prepare(&self, filter: &str, pager: &Pager, fetch: &str, entity: &str) -> Result<Prepared> {
        prepare(self.registry, self.config, filter, pager, fetch, entity)
    }

    /// Select one page of `entity` and load the associations named by `fetch`.
    #[tracing::instrument(name = "query", skip_all, fields(entity = %entity))]
    pub async fn query_records(
        &self,
        filter: &str,
        pager: &Pager,
        fetch: &str,
        entity: &str,
    ) -> Result<Page<Record>> {
        let prepared = self.prepare(filter, pager, fetch, entity)?;

        let mut items = self.store.select(self.registry, &prepared.select).await?;
        let total = match &prepared.count {
            Some(count) => Some(self.store.count(self.registry, count).await?),
            None => None,
        };
        FetchExecutor::new(self.store, self.registry)
            .execute(entity, &mut items, &prepared.plan)
            .await?;

        debug!(items = items.len(), total = ?total, "Query complete");
        Ok(Page::new(items, pager.page(), pager.size(), total))
    }

    /// Like [`query_records`](Self::query_records), materializing each record as `T`.
    pub async fn query<T: DeserializeOwned>(
        &self,
        filter: &str,
        pager: &Pager,
        fetch: &str,
        entity: &str,
    ) -> Result<Page<T>> {
        self.query_records(filter, pager, fetch, entity)
            .await?
            .try_map(|record| record.to_typed())
    }

    /// Number of `entity` rows matching `filter`.
    #[tracing::instrument(name = "count", skip_all, fields(entity = %entity))]
    pub async fn count(&self, filter: &str, entity: &str) -> Result<i64> {
        let compiled = FilterCompiler::new(self.registry, self.config).compile(filter, entity)?;
        self.store
            .count(self.registry, &SelectQuery::new(entity, compiled))
            .await
    }
}
