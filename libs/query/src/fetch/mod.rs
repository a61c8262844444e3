//! Fetch plans and their execution

mod executor;
mod plan;

pub use executor::FetchExecutor;
pub use plan::{entity_at, Fetch, FetchKind, FetchPlan};
