//! Logging setup for the CLI.
//!
//! Logs go to stderr so that stdout carries only command output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Keep sqlx quiet unless asked for
        EnvFilter::new(format!("sift={level},sift_query={level},sqlx=warn"))
    })
}

pub fn init_logging(level: &str, json: bool) {
    let subscriber = tracing_subscriber::registry().with(build_env_filter(level));
    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
