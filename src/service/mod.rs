pub mod ingestion;
pub mod orchestrator;

pub use ingestion::{IngestionPipeline, IngestionResult};
pub use orchestrator::{JobCanceler, JobOrchestrator};
