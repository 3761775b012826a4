//! Shared test fixtures, gated behind `cfg(test)` so none of this ships in
//! release builds.

#[cfg(test)]
pub use fixtures::*;

#[cfg(test)]
pub mod fixtures {
    use crate::domain::models::{CreateJobOptions, Issue, IssuePriority, IssueStatus};
    use chrono::Utc;
    use sqlx::SqlitePool;

    /// Creates an in-memory SQLite database with migrations applied.
    pub async fn setup_test_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("failed to create test database");
        sqlx::migrate!()
            .run(&pool)
            .await
            .expect("failed to run migrations");
        pool
    }

    pub fn sample_issue(user_id: &str, ims_id: &str) -> Issue {
        Issue {
            id: 0,
            user_id: user_id.to_string(),
            ims_id: ims_id.to_string(),
            title: format!("Issue {ims_id}"),
            description: "sample description".to_string(),
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
            labels: vec![],
            comment_count: 0,
            attachment_count: 0,
            issue_details: None,
            action_log: None,
            related_issue_ids: vec![],
            source_url: None,
            crawled_at: Utc::now(),
            custom_fields: serde_json::Value::Object(Default::default()),
            hybrid_score: None,
            similarity_score: None,
        }
    }

    pub fn default_job_options() -> CreateJobOptions {
        CreateJobOptions::default()
    }
}
