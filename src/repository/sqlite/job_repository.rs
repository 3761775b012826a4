use super::parse_datetime;
use crate::domain::models::{CrawlJob, CreateJobOptions, JobStatus};
use crate::error::Result;
use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    user_id: String,
    raw_query: String,
    parsed_query: Option<String>,
    intent_tag: Option<String>,
    status: String,
    current_step: String,
    progress_percentage: i64,
    issues_found: i64,
    issues_crawled: i64,
    attachments_processed: i64,
    related_issues_crawled: i64,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    error_message: Option<String>,
    retry_count: i64,
    include_attachments: i64,
    include_related_issues: i64,
    max_issues: i64,
    product_codes: String,
    result_issue_ids: String,
}

impl From<JobRow> for CrawlJob {
    fn from(row: JobRow) -> Self {
        CrawlJob {
            id: row.id,
            user_id: row.user_id,
            raw_query: row.raw_query,
            parsed_query: row.parsed_query,
            intent_tag: row.intent_tag,
            status: JobStatus::from_str(&row.status).unwrap_or(JobStatus::Failed),
            current_step: row.current_step,
            progress_percentage: row.progress_percentage.clamp(0, 100) as u8,
            issues_found: row.issues_found,
            issues_crawled: row.issues_crawled,
            attachments_processed: row.attachments_processed,
            related_issues_crawled: row.related_issues_crawled,
            created_at: parse_datetime(&row.created_at),
            started_at: row.started_at.as_deref().map(parse_datetime),
            completed_at: row.completed_at.as_deref().map(parse_datetime),
            error_message: row.error_message,
            retry_count: row.retry_count,
            include_attachments: row.include_attachments != 0,
            include_related_issues: row.include_related_issues != 0,
            max_issues: row.max_issues,
            product_codes: serde_json::from_str(&row.product_codes).unwrap_or_default(),
            result_issue_ids: serde_json::from_str(&row.result_issue_ids).unwrap_or_default(),
        }
    }
}

/// Persists crawl jobs and implements the cache lookup described by the Job
/// Orchestrator's `CreateJob` contract. Grounded on the reference
/// `JobRepository`'s create/get/update-status shape.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str, raw_query: &str, opts: &CreateJobOptions) -> Result<CrawlJob> {
        let job = CrawlJob::new(user_id, raw_query, opts);
        self.insert(&job).await?;
        Ok(job)
    }

    async fn insert(&self, job: &CrawlJob) -> Result<()> {
        let product_codes = serde_json::to_string(&job.product_codes).unwrap_or_else(|_| "[]".into());
        let result_ids = serde_json::to_string(&job.result_issue_ids).unwrap_or_else(|_| "[]".into());
        sqlx::query(
            r#"
            INSERT INTO ims_crawl_jobs (
                id, user_id, raw_query, parsed_query, intent_tag, status,
                current_step, progress_percentage, issues_found, issues_crawled,
                attachments_processed, related_issues_crawled, created_at,
                started_at, completed_at, error_message, retry_count,
                include_attachments, include_related_issues, max_issues,
                product_codes, result_issue_ids
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.user_id)
        .bind(&job.raw_query)
        .bind(&job.parsed_query)
        .bind(&job.intent_tag)
        .bind(job.status.as_str())
        .bind(&job.current_step)
        .bind(job.progress_percentage as i64)
        .bind(job.issues_found)
        .bind(job.issues_crawled)
        .bind(job.attachments_processed)
        .bind(job.related_issues_crawled)
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|d| d.to_rfc3339()))
        .bind(job.completed_at.map(|d| d.to_rfc3339()))
        .bind(&job.error_message)
        .bind(job.retry_count)
        .bind(job.include_attachments as i64)
        .bind(job.include_related_issues as i64)
        .bind(job.max_issues)
        .bind(&product_codes)
        .bind(&result_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<CrawlJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM ims_crawl_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CrawlJob::from))
    }

    /// Exact-string cache match on `(user_id, raw_query)` for completed jobs
    /// younger than `max_age_hours`. The query string is not canonicalized,
    /// matching the reference implementation's documented ambiguity.
    pub async fn find_by_query(&self, user_id: &str, raw_query: &str, max_age_hours: i64) -> Result<Option<CrawlJob>> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM ims_crawl_jobs WHERE user_id = ? AND raw_query = ? AND status = 'completed' \
             AND created_at >= ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(raw_query)
        .bind(cutoff.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CrawlJob::from))
    }

    /// Deletes `completed`/`failed` jobs older than `max_age_hours` plus a
    /// grace factor. Callers are expected to swallow errors from this call
    /// rather than fail job creation because of them.
    pub async fn delete_expired_jobs(&self, max_age_hours: i64) -> Result<u64> {
        const GRACE_FACTOR: f64 = 1.5;
        let cutoff = Utc::now() - Duration::minutes((max_age_hours as f64 * 60.0 * GRACE_FACTOR) as i64);
        let result = sqlx::query(
            "DELETE FROM ims_crawl_jobs WHERE status IN ('completed','failed') AND created_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn save(&self, job: &CrawlJob) -> Result<()> {
        let product_codes = serde_json::to_string(&job.product_codes).unwrap_or_else(|_| "[]".into());
        let result_ids = serde_json::to_string(&job.result_issue_ids).unwrap_or_else(|_| "[]".into());
        sqlx::query(
            r#"
            UPDATE ims_crawl_jobs SET
                status = ?, current_step = ?, progress_percentage = ?,
                issues_found = ?, issues_crawled = ?, attachments_processed = ?,
                related_issues_crawled = ?, started_at = ?, completed_at = ?,
                error_message = ?, retry_count = ?, parsed_query = ?, intent_tag = ?,
                product_codes = ?, result_issue_ids = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(&job.current_step)
        .bind(job.progress_percentage as i64)
        .bind(job.issues_found)
        .bind(job.issues_crawled)
        .bind(job.attachments_processed)
        .bind(job.related_issues_crawled)
        .bind(job.started_at.map(|d| d.to_rfc3339()))
        .bind(job.completed_at.map(|d| d.to_rfc3339()))
        .bind(&job.error_message)
        .bind(job.retry_count)
        .bind(&job.parsed_query)
        .bind(&job.intent_tag)
        .bind(&product_codes)
        .bind(&result_ids)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn row_count_for_user(&self, user_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM ims_crawl_jobs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("c"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;

    #[tokio::test]
    async fn create_then_find_by_query_within_ttl() {
        let pool = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let mut job = repo
            .create("u1", "auth error", &CreateJobOptions::default())
            .await
            .unwrap();
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        repo.save(&job).await.unwrap();

        let found = repo.find_by_query("u1", "auth error", 24).await.unwrap();
        assert_eq!(found.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn find_by_query_is_exact_string_match() {
        let pool = setup_test_db().await;
        let repo = JobRepository::new(pool);
        let mut job = repo
            .create("u1", "auth error", &CreateJobOptions::default())
            .await
            .unwrap();
        job.status = JobStatus::Completed;
        repo.save(&job).await.unwrap();

        let found = repo.find_by_query("u1", "auth  error", 24).await.unwrap();
        assert!(found.is_none());
    }
}
