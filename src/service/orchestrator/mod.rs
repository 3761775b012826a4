//! Job Orchestrator: owns crawl-job lifecycle, cache policy and cancellation,
//! and drives the ingestion pipeline once the scraper hands back full issues.
//! Grounded on `crawl_jobs.py`'s `CrawlJobsUseCase` and the teacher's
//! `JobProcessor`, unified the same way `execute_crawl_job` is.

mod canceler;

pub use canceler::JobCanceler;

use crate::config::Config;
use crate::domain::models::{CreateJobOptions, CrawlJob, JobStatus, UserCredentials};
use crate::domain::ProgressEvent;
use crate::error::{AppError, Result};
use crate::ports::{CrawlerPort, EmbeddingPort, SearchProgress};
use crate::repository::{CredentialsRepository, IssueRepository, JobRepository};
use crate::service::ingestion::IngestionPipeline;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Coordinates one user's crawl jobs: creation with cache lookup, async
/// execution with progress streaming, status queries, and cancellation.
pub struct JobOrchestrator {
    config: Config,
    crawler: Arc<dyn CrawlerPort>,
    embedding: Arc<dyn EmbeddingPort>,
    credentials_repo: CredentialsRepository,
    issue_repo: IssueRepository,
    job_repo: JobRepository,
    jobs: Arc<DashMap<String, CrawlJob>>,
    canceler: Arc<JobCanceler>,
}

impl JobOrchestrator {
    pub fn new(
        config: Config,
        crawler: Arc<dyn CrawlerPort>,
        embedding: Arc<dyn EmbeddingPort>,
        credentials_repo: CredentialsRepository,
        issue_repo: IssueRepository,
        job_repo: JobRepository,
    ) -> Self {
        Self {
            config,
            crawler,
            embedding,
            credentials_repo,
            issue_repo,
            job_repo,
            jobs: Arc::new(DashMap::new()),
            canceler: Arc::new(JobCanceler::new()),
        }
    }

    /// Creates a job or returns a cached completed one from the same
    /// `(user_id, raw_query)` pair within `IMS_QUERY_CACHE_HOURS`. Returns
    /// `(job, is_cached)`.
    pub async fn create_job(
        &self,
        user_id: &str,
        raw_query: &str,
        opts: CreateJobOptions,
    ) -> Result<(CrawlJob, bool)> {
        let cache_hours = self.config.query_cache_hours;

        if !opts.force_refresh && cache_hours > 0 {
            if let Some(cached) = self.job_repo.find_by_query(user_id, raw_query, cache_hours).await? {
                info!(job_id = %cached.id, %raw_query, "returning cached crawl job");
                self.jobs.insert(cached.id.clone(), cached.clone());
                return Ok((cached, true));
            }
        }

        if self.config.query_cache_cleanup_enabled {
            match self.job_repo.delete_expired_jobs(cache_hours).await {
                Ok(deleted) if deleted > 0 => info!(deleted, "cleaned up expired crawl jobs"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to clean up expired jobs"),
            }
        }

        let job = self.job_repo.create(user_id, raw_query, &opts).await?;
        self.jobs.insert(job.id.clone(), job.clone());
        info!(job_id = %job.id, %user_id, "created crawl job");
        Ok((job, false))
    }

    pub async fn get_status(&self, job_id: &str) -> Result<CrawlJob> {
        if let Some(job) = self.jobs.get(job_id) {
            return Ok(job.clone());
        }
        let job = self
            .job_repo
            .get_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(job_id.to_string()))?;
        self.jobs.insert(job_id.to_string(), job.clone());
        Ok(job)
    }

    /// Requests cooperative cancellation of a running job. No-op if the job
    /// is already terminal or unknown.
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        let mut job = self.get_status(job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }
        self.canceler.cancel(job_id);
        job.status = JobStatus::Failed;
        job.error_message = Some("Cancelled by user".to_string());
        job.completed_at = Some(Utc::now());
        self.jobs.insert(job_id.to_string(), job.clone());
        self.job_repo.save(&job).await?;
        info!(job_id, "cancelled crawl job");
        Ok(())
    }

    /// Spawns job execution and returns a receiver of progress events. The
    /// sender half lives with the spawned task; dropping the receiver simply
    /// stops delivery, it does not cancel the job.
    pub fn execute_job(self: &Arc<Self>, job_id: String) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_job(&job_id, &tx).await {
                warn!(job_id, error = %e, "crawl job failed");
                let _ = tx
                    .send(ProgressEvent::JobFailed {
                        job_id: job_id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
                this.mark_failed(&job_id, &e.to_string()).await;
            }
            this.canceler.remove(&job_id);
        });
        rx
    }

    async fn mark_failed(&self, job_id: &str, message: &str) {
        if let Ok(mut job) = self.get_status(job_id).await {
            job.status = JobStatus::Failed;
            job.error_message = Some(message.to_string());
            job.completed_at = Some(Utc::now());
            self.jobs.insert(job_id.to_string(), job.clone());
            let _ = self.job_repo.save(&job).await;
        }
    }

    async fn run_job(&self, job_id: &str, tx: &mpsc::Sender<ProgressEvent>) -> Result<()> {
        let mut job = self.get_status(job_id).await?;
        job.status = JobStatus::Authenticating;
        job.current_step = "authenticating".to_string();
        job.progress_percentage = 5;
        job.started_at = Some(Utc::now());
        self.jobs.insert(job_id.to_string(), job.clone());
        self.job_repo.save(&job).await?;

        let _ = tx
            .send(ProgressEvent::JobStarted {
                job_id: job_id.to_string(),
                timestamp: Utc::now(),
            })
            .await;

        let credentials = self
            .credentials_repo
            .find_by_user_id(&job.user_id)
            .await?
            .ok_or_else(|| AppError::validation(format!("credentials not found for user {}", job.user_id)))?;

        if !self.crawler.is_authenticated().await {
            let _ = tx
                .send(ProgressEvent::Authenticating {
                    message: "authenticating".to_string(),
                })
                .await;
            if !self.crawler.authenticate(&credentials).await? {
                return Err(AppError::authentication("authentication failed"));
            }
        }
        let _ = tx
            .send(ProgressEvent::Authenticated {
                message: "authenticated".to_string(),
            })
            .await;

        job.status = JobStatus::Parsing;
        job.current_step = "searching".to_string();
        job.progress_percentage = 15;
        self.jobs.insert(job_id.to_string(), job.clone());

        let _ = tx
            .send(ProgressEvent::Searching {
                message: format!("searching for issues: {}", job.raw_query),
            })
            .await;

        let cancel_flag = self.canceler.flag_for(job_id);
        let on_search_progress: SearchProgress = {
            let tx = tx.clone();
            Box::new(move |event| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            })
        };

        let product_codes = if job.product_codes.is_empty() { None } else { Some(job.product_codes.as_slice()) };
        let issues = self
            .crawler
            .search_issues(&job.raw_query, &credentials, product_codes, &on_search_progress)
            .await?;

        job.issues_found = issues.len() as i64;
        self.jobs.insert(job_id.to_string(), job.clone());

        let _ = tx
            .send(ProgressEvent::SearchCompleted {
                total_issues: issues.len() as u32,
                total_pages: 0,
                message: format!("found {} issues", issues.len()),
            })
            .await;

        if cancel_flag.load(Ordering::Relaxed) {
            job.status = JobStatus::Failed;
            job.error_message = Some("Cancelled by user".to_string());
            job.completed_at = Some(Utc::now());
            self.jobs.insert(job_id.to_string(), job.clone());
            self.job_repo.save(&job).await?;
            return Ok(());
        }

        job.status = JobStatus::Crawling;
        job.current_step = "crawling".to_string();
        job.progress_percentage = 40;
        self.jobs.insert(job_id.to_string(), job.clone());

        let batch_size = self.config.search_batch_size;
        let total_batches = if issues.is_empty() { 0 } else { (issues.len() + batch_size - 1) / batch_size };
        let _ = tx
            .send(ProgressEvent::CrawlingStarted {
                total_issues: issues.len() as u32,
                batch_size: batch_size as u32,
                total_batches: total_batches as u32,
                message: format!("starting parallel crawl of {} issues", issues.len()),
            })
            .await;

        let on_crawl_progress: SearchProgress = {
            let tx = tx.clone();
            Box::new(move |event| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            })
        };

        let crawled_issues = self
            .crawler
            .crawl_issues_parallel(issues, &credentials, batch_size, &cancel_flag, &on_crawl_progress)
            .await?;

        let _ = tx
            .send(ProgressEvent::CrawlFetchCompleted {
                fetched_count: crawled_issues.len() as u32,
                total_issues: job.issues_found as u32,
                message: format!("fetched {} issue details", crawled_issues.len()),
            })
            .await;

        job.status = JobStatus::Embedding;
        job.current_step = "embedding".to_string();
        job.progress_percentage = 75;
        self.jobs.insert(job_id.to_string(), job.clone());

        let pipeline = IngestionPipeline::new(self.config.clone(), self.issue_repo.clone(), Arc::clone(&self.embedding));
        let outcome = pipeline
            .run(crawled_issues, job.include_attachments, job.include_related_issues, &self.crawler, &credentials, tx)
            .await?;

        job.issues_crawled = outcome.saved_issue_ids.len() as i64;
        job.related_issues_crawled = outcome.related_issues_crawled;
        job.attachments_processed = outcome.attachments_processed;
        job.result_issue_ids = outcome.saved_issue_ids;
        job.status = JobStatus::Completed;
        job.current_step = "completed".to_string();
        job.progress_percentage = 100;
        job.completed_at = Some(Utc::now());
        self.jobs.insert(job_id.to_string(), job.clone());
        self.job_repo.save(&job).await?;

        self.crawler.close().await;

        let _ = tx
            .send(ProgressEvent::JobCompleted {
                job_id: job_id.to_string(),
                issues_found: job.issues_found as u32,
                issues_crawled: job.issues_crawled as u32,
                attachments_processed: job.attachments_processed as u32,
                timestamp: job.completed_at.unwrap_or_else(Utc::now),
                result_issue_ids: job.result_issue_ids.iter().map(|id| id.to_string()).collect(),
            })
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::crawler::IMSCrawler;
    use crate::adapters::embedding::mock::MockEmbeddingAdapter;
    use crate::ports::credential_port::PlaintextDecryptor;
    use crate::test_support::setup_test_db;

    async fn orchestrator() -> Arc<JobOrchestrator> {
        let pool = setup_test_db().await;
        let config = Config::default();
        let crawler: Arc<dyn CrawlerPort> = Arc::new(IMSCrawler::new(
            Arc::new(PlaintextDecryptor),
            config.login_timeout,
            config.navigation_timeout,
            config.max_pages,
        ));
        let embedding: Arc<dyn EmbeddingPort> = Arc::new(MockEmbeddingAdapter::new(8));
        Arc::new(JobOrchestrator::new(
            config,
            crawler,
            embedding,
            CredentialsRepository::new(pool.clone()),
            IssueRepository::new(pool.clone()),
            JobRepository::new(pool),
        ))
    }

    #[tokio::test]
    async fn create_job_without_cache_always_creates_new() {
        let orch = orchestrator().await;
        let (job1, cached1) = orch.create_job("u1", "auth error", CreateJobOptions::default()).await.unwrap();
        assert!(!cached1);

        let status = orch.get_status(&job1.id).await.unwrap();
        assert_eq!(status.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_unknown_job_errors() {
        let orch = orchestrator().await;
        let result = orch.cancel("does-not-exist").await;
        assert!(result.is_err());
    }
}
