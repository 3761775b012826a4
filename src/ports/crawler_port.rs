use crate::domain::models::{Issue, UserCredentials};
use crate::error::Result;
use async_trait::async_trait;

/// Progress callback fired during search pagination and parallel detail
/// fetch. Mirrors the reference crawler's `progress_callback` closures.
pub type SearchProgress = Box<dyn Fn(crate::domain::ProgressEvent) + Send + Sync>;

/// Capability interface over a crawling backend (HTTP session, headless
/// browser, or a test double). The HTTP Scraper is the primary
/// implementation; alternate backends would implement the same trait.
#[async_trait]
pub trait CrawlerPort: Send + Sync {
    async fn authenticate(&self, credentials: &UserCredentials) -> Result<bool>;

    async fn is_authenticated(&self) -> bool;

    async fn search_issues(
        &self,
        query: &str,
        credentials: &UserCredentials,
        product_codes: Option<&[String]>,
        on_progress: &SearchProgress,
    ) -> Result<Vec<Issue>>;

    async fn crawl_issues_parallel(
        &self,
        issues: Vec<Issue>,
        credentials: &UserCredentials,
        batch_size: usize,
        cancel: &std::sync::Arc<std::sync::atomic::AtomicBool>,
        on_progress: &SearchProgress,
    ) -> Result<Vec<Issue>>;

    async fn crawl_related_issues(
        &self,
        issue: &Issue,
        credentials: &UserCredentials,
        related_depth: u32,
    ) -> Result<Vec<Issue>>;

    async fn close(&self);
}
