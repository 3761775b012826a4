pub mod hybrid;
pub mod intent;

pub use hybrid::{hybrid_search, BM25Index, ScoredCandidate};
pub use intent::IntentParser;
