//! Sift - a compact filter, sort and fetch-plan language for relational data
//!
//! Callers embed three short strings in a request and get back one page of
//! root records with the requested associations loaded:
//!
//! ```text
//! filter:  count{orders}::gte:2 and (name::istartswith:a or not city:Berlin)
//! sort:    name,-created
//! fetch:   address orders[1:5](total:desc){ items }
//! ```
//!
//! # Pipeline
//!
//! ```text
//! Filter String
//!      |
//!   Scanner -> tokens
//!      |
//! Expression Compiler + Combinator -> Predicate tree (joins memoized per path)
//!      |
//! SelectQuery -> Store (SQL WHERE, or GROUP BY + HAVING for aggregates)
//!      |
//! Fetch Plan -> Fetch Executor -> one batched round trip per join path,
//!                                 one bounded round trip per owner for query paths
//! ```
//!
//! Entity metadata comes from an explicit [`EntityRegistry`] built once at
//! startup. Stores implement [`Store`]; [`MemoryStore`] evaluates queries in
//! process and `PgStore` (feature `postgres`) runs them on PostgreSQL.

pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod pager;
pub mod path;
pub mod query;
pub mod record;
pub mod registry;
pub mod service;
pub mod sql;
pub mod store;
pub mod value;

pub use config::QueryConfig;
pub use error::{Error, ErrorKind, Result};
pub use fetch::{Fetch, FetchExecutor, FetchKind, FetchPlan};
pub use filter::{compile_filter, CompiledFilter, FilterCompiler, Predicate};
pub use pager::Pager;
pub use query::{Page, SelectQuery, SortDirection, SortKey};
pub use record::{Loaded, Record};
pub use registry::{EntityRegistry, RelationKind};
pub use service::{prepare, Prepared, QueryService};
pub use store::{MemoryStore, Store};
#[cfg(feature = "postgres")]
pub use store::PgStore;
pub use value::{ScalarType, Value};
