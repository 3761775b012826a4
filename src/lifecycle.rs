//! Process-wide startup: logging initialization and periodic maintenance
//! tasks. Adapted from the teacher's `lifecycle.rs`, with the Tauri setup/
//! run-event hooks replaced by a plain async maintenance loop since this
//! crate has no GUI shell to manage.

use crate::config::Config;
use crate::repository::JobRepository;
use std::time::Duration;
use tracing::{info, warn};

/// Initializes `tracing_subscriber` with the default directives
/// `sqlx=warn,ims_crawler=debug,info`, a compact formatter, and targets
/// disabled, honoring `RUST_LOG` overrides via `EnvFilter::from_default_env()`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sqlx=warn".parse().unwrap())
                .add_directive("ims_crawler=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .compact()
        .with_target(false)
        .with_ansi(true)
        .init();
}

/// Background task that periodically evicts expired cached query jobs, the
/// way the reference `crawl_jobs` use case's TTL cleanup runs out-of-band
/// from any single request.
pub async fn run_query_cache_cleanup(config: Config, job_repo: JobRepository) {
    if !config.query_cache_cleanup_enabled {
        info!("query cache cleanup disabled, skipping background task");
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        match job_repo.delete_expired_jobs(config.query_cache_hours).await {
            Ok(deleted) if deleted > 0 => info!(deleted, "evicted expired cached jobs"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "query cache cleanup failed"),
        }
    }
}
