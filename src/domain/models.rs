use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Pending,
    Rejected,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        }
    }

    /// Normalizes a raw IMS status string via case-insensitive substring
    /// matching, mirroring the reference crawler's fallback chain.
    pub fn from_raw(raw: &str) -> Self {
        let upper = raw.to_uppercase();
        if upper.contains("CLOSED") || upper.contains("CLOSED_P") {
            Self::Closed
        } else if upper.contains("RESOLVED") {
            Self::Resolved
        } else if upper.contains("PROGRESS") || upper.contains("ASSIGNED") {
            Self::InProgress
        } else if upper.contains("REJECT") {
            Self::Rejected
        } else if upper.contains("PENDING") || upper.contains("POSTPONED") {
            Self::Pending
        } else {
            Self::Open
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "pending" => Ok(Self::Pending),
            "rejected" => Ok(Self::Rejected),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuePriority {
    Critical,
    High,
    Medium,
    Low,
    Trivial,
}

impl IssuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Trivial => "trivial",
        }
    }

    /// Mirrors the reference crawler's priority normalization, including the
    /// literal Korean tokens it checks for alongside the English ones.
    pub fn from_raw(raw: &str) -> Self {
        let upper = raw.to_uppercase();
        if upper.contains("CRITICAL") || upper.contains("URGENT") || upper.contains("VERY HIGH") || raw.contains("긴급") {
            Self::Critical
        } else if upper.contains("HIGH") || raw.contains("높음") {
            Self::High
        } else if upper.contains("LOW") || raw.contains("낮음") {
            Self::Low
        } else if upper.contains("TRIVIAL") || raw.contains("사소") {
            Self::Trivial
        } else {
            Self::Medium
        }
    }
}

impl fmt::Display for IssuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssuePriority {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "trivial" => Ok(Self::Trivial),
            _ => Err(()),
        }
    }
}

pub const ACTION_LOG_CAP: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub user_id: String,
    pub ims_id: String,
    pub title: String,
    pub description: String,
    pub status: IssueStatus,
    pub priority: IssuePriority,
    pub status_raw: Option<String>,
    pub priority_raw: Option<String>,
    pub category: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub module: Option<String>,
    pub customer: Option<String>,
    pub issued_date: Option<DateTime<Utc>>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub project_key: Option<String>,
    pub issue_type: Option<String>,
    pub labels: Vec<String>,
    pub comment_count: i64,
    pub attachment_count: i64,
    pub issue_details: Option<String>,
    pub action_log: Option<String>,
    pub related_issue_ids: Vec<String>,
    pub source_url: Option<String>,
    pub crawled_at: DateTime<Utc>,
    pub custom_fields: serde_json::Value,
    /// Side-channel score attached by retrieval, not persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
}

impl Issue {
    /// Builds a fresh row from search-listing fields only; detail fetch
    /// overwrites most of these. Synthesizes the title when absent.
    pub fn from_search_row(user_id: &str, ims_id: &str, title: Option<String>) -> Self {
        let title = match title {
            Some(t) if !t.trim().is_empty() => t,
            _ => format!("Issue {ims_id}"),
        };
        Self {
            id: 0,
            user_id: user_id.to_string(),
            ims_id: ims_id.to_string(),
            title,
            description: String::new(),
            status: IssueStatus::Open,
            priority: IssuePriority::Medium,
            status_raw: None,
            priority_raw: None,
            category: None,
            product: None,
            version: None,
            module: None,
            customer: None,
            issued_date: None,
            reporter: None,
            assignee: None,
            project_key: None,
            issue_type: None,
            labels: Vec::new(),
            comment_count: 0,
            attachment_count: 0,
            issue_details: None,
            action_log: None,
            related_issue_ids: Vec::new(),
            source_url: None,
            crawled_at: Utc::now(),
            custom_fields: serde_json::Value::Null,
            hybrid_score: None,
            similarity_score: None,
        }
    }

    pub fn embedding_text(&self, attachment_texts: &[String]) -> String {
        let mut parts = vec![self.title.clone(), self.description.clone()];
        parts.extend(attachment_texts.iter().filter(|t| !t.is_empty()).cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct IssueEmbedding {
    pub issue_id: i64,
    pub vector: Vec<f32>,
    pub embedded_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    RelatesTo,
    Blocks,
    Duplicates,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatesTo => "relates_to",
            Self::Blocks => "blocks",
            Self::Duplicates => "duplicates",
        }
    }
}

impl FromStr for RelationKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relates_to" => Ok(Self::RelatesTo),
            "blocks" => Ok(Self::Blocks),
            "duplicates" => Ok(Self::Duplicates),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Authenticating,
    Parsing,
    Crawling,
    ProcessingAttachments,
    Embedding,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authenticating => "authenticating",
            Self::Parsing => "parsing",
            Self::Crawling => "crawling",
            Self::ProcessingAttachments => "processing_attachments",
            Self::Embedding => "embedding",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "authenticating" => Ok(Self::Authenticating),
            "parsing" => Ok(Self::Parsing),
            "crawling" => Ok(Self::Crawling),
            "processing_attachments" => Ok(Self::ProcessingAttachments),
            "embedding" => Ok(Self::Embedding),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

pub const MAX_RETRIES: i64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: String,
    pub user_id: String,
    pub raw_query: String,
    pub parsed_query: Option<String>,
    pub intent_tag: Option<String>,
    pub status: JobStatus,
    pub current_step: String,
    pub progress_percentage: u8,
    pub issues_found: i64,
    pub issues_crawled: i64,
    pub attachments_processed: i64,
    pub related_issues_crawled: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub include_attachments: bool,
    pub include_related_issues: bool,
    pub max_issues: i64,
    pub product_codes: Vec<String>,
    pub result_issue_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateJobOptions {
    pub max_issues: Option<i64>,
    pub include_attachments: bool,
    pub include_related: bool,
    pub product_codes: Vec<String>,
    pub force_refresh: bool,
}

impl CrawlJob {
    pub fn new(user_id: &str, raw_query: &str, opts: &CreateJobOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            raw_query: raw_query.to_string(),
            parsed_query: None,
            intent_tag: None,
            status: JobStatus::Pending,
            current_step: "queued".to_string(),
            progress_percentage: 0,
            issues_found: 0,
            issues_crawled: 0,
            attachments_processed: 0,
            related_issues_crawled: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            include_attachments: opts.include_attachments,
            include_related_issues: opts.include_related,
            max_issues: opts.max_issues.unwrap_or(100),
            product_codes: opts.product_codes.clone(),
            result_issue_ids: Vec::new(),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status.is_terminal() && self.status != JobStatus::Completed && self.retry_count < MAX_RETRIES
    }
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: String,
    pub ims_base_url: String,
    pub encrypted_username: Vec<u8>,
    pub encrypted_password: Vec<u8>,
    pub is_validated: bool,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub validation_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchIntentKind {
    Keyword,
    Status,
    Priority,
    Date,
    Assignee,
    Project,
    Complex,
    Semantic,
    ListAll,
}

impl SearchIntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword_search",
            Self::Status => "status_filter",
            Self::Priority => "priority_filter",
            Self::Date => "date_range",
            Self::Assignee => "assignee_filter",
            Self::Project => "project_filter",
            Self::Complex => "complex_query",
            Self::Semantic => "semantic_search",
            Self::ListAll => "list_all",
        }
    }
}

impl FromStr for SearchIntentKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword_search" => Ok(Self::Keyword),
            "status_filter" => Ok(Self::Status),
            "priority_filter" => Ok(Self::Priority),
            "date_range" => Ok(Self::Date),
            "assignee_filter" => Ok(Self::Assignee),
            "project_filter" => Ok(Self::Project),
            "complex_query" => Ok(Self::Complex),
            "semantic_search" => Ok(Self::Semantic),
            "list_all" => Ok(Self::ListAll),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchIntent {
    pub intent_type: SearchIntentKind,
    pub keywords: Vec<String>,
    pub status_filters: Vec<String>,
    pub priority_filters: Vec<String>,
    pub assignee_filters: Vec<String>,
    pub project_filters: Vec<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub semantic_query: Option<String>,
    pub include_related: bool,
    pub include_attachments: bool,
    pub max_results: i64,
    pub raw_query: String,
    pub parsed_ims_syntax: Option<String>,
    pub confidence_score: f32,
}

impl SearchIntent {
    pub fn is_simple_keyword_search(&self) -> bool {
        self.intent_type == SearchIntentKind::Keyword
            && self.status_filters.is_empty()
            && self.priority_filters.is_empty()
            && self.assignee_filters.is_empty()
            && self.project_filters.is_empty()
    }

    pub fn has_filters(&self) -> bool {
        !self.status_filters.is_empty()
            || !self.priority_filters.is_empty()
            || !self.assignee_filters.is_empty()
            || !self.project_filters.is_empty()
            || self.date_from.is_some()
            || self.date_to.is_some()
    }

    pub fn requires_semantic_search(&self) -> bool {
        self.intent_type == SearchIntentKind::Semantic || self.semantic_query.is_some()
    }
}
