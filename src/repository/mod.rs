pub mod sqlite;

pub use sqlite::credentials_repository::CredentialsRepository;
pub use sqlite::issue_repository::IssueRepository;
pub use sqlite::job_repository::JobRepository;
