//! Sift CLI - compile, explain and run filter/fetch queries against a schema

mod logging;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use sift_query::sql::SqlBuilder;
use sift_query::{prepare, EntityRegistry, FetchPlan, Pager, PgStore, QueryConfig, QueryService};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sift", version, about = "Filter, sort and fetch-plan query tool")]
struct Cli {
    /// Query limits file (TOML); `SIFT_*` environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the SQL, bind values and fetch plan a request compiles to
    Explain(RequestArgs),
    /// Run a request against PostgreSQL and print the page as JSON
    Query {
        #[command(flatten)]
        request: RequestArgs,

        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        #[arg(long, default_value_t = 5)]
        max_connections: u32,
    },
    /// Parse a fetch plan and print its join and query paths
    CheckFetch {
        #[arg(long)]
        plan: String,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Entity schema document (JSON)
    #[arg(long)]
    schema: PathBuf,

    #[arg(long)]
    entity: String,

    #[arg(long, default_value = "")]
    filter: String,

    #[arg(long, default_value = "")]
    fetch: String,

    /// Paging query string, e.g. `page=2&size=10&sort=-created`
    #[arg(long, default_value = "")]
    params: String,
}

fn parse_params(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut items = Vec::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).with_context(|| format!("Invalid parameter '{pair}'"))?;
        let value =
            urlencoding::decode(value).with_context(|| format!("Invalid parameter '{pair}'"))?;
        items.push((key.into_owned(), value.into_owned()));
    }
    Ok(items)
}

fn load_registry(path: &Path) -> anyhow::Result<EntityRegistry> {
    let document = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema {}", path.display()))?;
    EntityRegistry::from_json(&document)
        .with_context(|| format!("Invalid schema {}", path.display()))
}

fn explain(request: &RequestArgs, config: &QueryConfig) -> anyhow::Result<serde_json::Value> {
    let registry = load_registry(&request.schema)?;
    let pager = Pager::from_items(&parse_params(&request.params)?, config)?;
    let prepared = prepare(
        &registry,
        config,
        &request.filter,
        &pager,
        &request.fetch,
        &request.entity,
    )?;

    let builder = SqlBuilder::new(&registry);
    let (sql, binds) = builder.build_select(&prepared.select)?;
    let count = match &prepared.count {
        Some(count) => {
            let (sql, binds) = builder.build_count(count)?;
            json!({ "sql": sql, "binds": format!("{binds:?}") })
        }
        None => serde_json::Value::Null,
    };
    Ok(json!({
        "select": { "sql": sql, "binds": format!("{binds:?}") },
        "count": count,
        "fetch": {
            "join_paths": prepared.plan.join_paths(),
            "query_paths": prepared.plan.query_paths(),
            "plan": prepared.plan,
        },
    }))
}

async fn run_query(
    request: &RequestArgs,
    config: &QueryConfig,
    database_url: &str,
    max_connections: u32,
) -> anyhow::Result<serde_json::Value> {
    let registry = load_registry(&request.schema)?;
    let pager = Pager::from_items(&parse_params(&request.params)?, config)?;
    let store = PgStore::connect(database_url, max_connections)
        .await
        .context("Failed to connect to database")?;

    let service = QueryService::new(&store, &registry, config);
    let page = service
        .query_records(&request.filter, &pager, &request.fetch, &request.entity)
        .await?;
    tracing::info!(
        entity = %request.entity,
        items = page.items.len(),
        total = ?page.total,
        "Query executed"
    );
    Ok(serde_json::to_value(page)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.json);

    let config = QueryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let output = match &cli.command {
        Command::Explain(request) => explain(request, &config)?,
        Command::Query {
            request,
            database_url,
            max_connections,
        } => run_query(request, &config, database_url, *max_connections).await?,
        Command::CheckFetch { plan } => {
            let parsed = FetchPlan::parse(plan)?;
            if parsed.is_empty() {
                bail!("Fetch plan '{plan}' names no associations");
            }
            json!({
                "join_paths": parsed.join_paths(),
                "query_paths": parsed.query_paths(),
                "plan": parsed,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_url_decoded() {
        let items = parse_params("page=2&size=10&sort=name%2C-created").unwrap();
        assert_eq!(
            items,
            vec![
                ("page".to_string(), "2".to_string()),
                ("size".to_string(), "10".to_string()),
                ("sort".to_string(), "name,-created".to_string()),
            ]
        );
        assert!(parse_params("").unwrap().is_empty());
    }
}
