use serde::Serialize;

/// Tagged-union progress event. Each variant's payload is typed rather than
/// a free-form map; consumers treat unknown future event kinds as no-ops
/// since this serializes with `#[serde(tag = "event", content = "data")]`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    JobStarted {
        job_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Authenticating {
        message: String,
    },
    Authenticated {
        message: String,
    },
    Searching {
        message: String,
    },
    SearchStart {
        query: String,
        products_count: usize,
    },
    SearchCount {
        total_count: u32,
        total_pages: u32,
    },
    SearchPage {
        current_page: u32,
        total_pages: u32,
        page_issues: u32,
        fetched_count: u32,
        total_count: u32,
        progress_percent: u8,
    },
    SearchComplete {
        fetched_count: u32,
        total_count: u32,
        truncated: bool,
    },
    SearchCompleted {
        total_issues: u32,
        total_pages: u32,
        message: String,
    },
    CrawlingStarted {
        total_issues: u32,
        batch_size: u32,
        total_batches: u32,
        message: String,
    },
    CrawlStart {
        total_issues: u32,
        total_batches: u32,
        batch_size: u32,
    },
    CrawlBatchStart {
        batch_num: u32,
        total_batches: u32,
        batch_start: u32,
        batch_end: u32,
        total_issues: u32,
        progress_percent: u8,
    },
    CrawlBatchComplete {
        batch_num: u32,
        total_batches: u32,
        batch_success: u32,
        batch_fail: u32,
        crawled_count: u32,
        total_issues: u32,
        progress_percent: u8,
    },
    CrawlComplete {
        crawled_count: u32,
        total_issues: u32,
    },
    CrawlFetchCompleted {
        fetched_count: u32,
        total_issues: u32,
        message: String,
    },
    PhaseStarted {
        phase: String,
        message: String,
    },
    SavingProgress {
        saved_count: u32,
        total_issues: u32,
        message: String,
    },
    EmbeddingProgress {
        processed_count: u32,
        total_count: u32,
        message: String,
    },
    EmbeddingSaveProgress {
        saved_count: u32,
        total_count: u32,
        message: String,
    },
    EmbeddingFailed {
        error: String,
        message: String,
    },
    IssueSaveFailed {
        issue_id: String,
        error: String,
    },
    JobCompleted {
        job_id: String,
        issues_found: u32,
        issues_crawled: u32,
        attachments_processed: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
        result_issue_ids: Vec<String>,
    },
    JobFailed {
        job_id: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}
