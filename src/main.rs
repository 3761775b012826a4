//! Demonstration entry point: runs one crawl job for a user/query pair and
//! streams progress events to stdout as newline-delimited JSON. An HTTP/RPC
//! front end is out of scope here; this binary exists to exercise the
//! orchestrator end to end against a real `DATABASE_PATH`.

use ims_crawler::adapters::crawler::IMSCrawler;
use ims_crawler::adapters::embedding::MockEmbeddingAdapter;
use ims_crawler::config::Config;
use ims_crawler::db;
use ims_crawler::domain::models::CreateJobOptions;
use ims_crawler::lifecycle;
use ims_crawler::ports::credential_port::PlaintextDecryptor;
use ims_crawler::ports::{CrawlerPort, EmbeddingPort};
use ims_crawler::repository::{CredentialsRepository, IssueRepository, JobRepository};
use ims_crawler::service::JobOrchestrator;
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lifecycle::init_logging();
    let config = Config::from_env();

    let mut args = std::env::args().skip(1);
    let user_id = args.next().unwrap_or_else(|| "demo-user".to_string());
    let raw_query = args.next().unwrap_or_else(|| "authentication error".to_string());

    let pool = db::init_db(&config.database_path).await?;
    let job_repo = JobRepository::new(pool.clone());
    let issue_repo = IssueRepository::new(pool.clone());
    let credentials_repo = CredentialsRepository::new(pool);

    tokio::spawn(lifecycle::run_query_cache_cleanup(config.clone(), job_repo.clone()));

    let crawler: Arc<dyn CrawlerPort> = Arc::new(IMSCrawler::new(
        Arc::new(PlaintextDecryptor),
        config.login_timeout,
        config.navigation_timeout,
        config.max_pages,
    ));
    let embedding: Arc<dyn EmbeddingPort> = Arc::new(MockEmbeddingAdapter::new(config.embedding_dimensions));

    let orchestrator = Arc::new(JobOrchestrator::new(config, crawler, embedding, credentials_repo, issue_repo, job_repo));

    let (job, is_cached) = orchestrator.create_job(&user_id, &raw_query, CreateJobOptions::default()).await?;
    if is_cached {
        println!("{}", serde_json::to_string(&job.result_issue_ids)?);
        return Ok(());
    }

    let mut rx = orchestrator.execute_job(job.id.clone());
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => error!(error = %e, "failed to serialize progress event"),
        }
    }

    let final_status = orchestrator.get_status(&job.id).await?;
    println!("{}", serde_json::to_string(&final_status.status)?);
    Ok(())
}
