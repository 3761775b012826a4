use crate::error::Result;
use async_trait::async_trait;

/// Capability interface over a dense-embedding backend. This crate treats
/// embedding-model internals as a Non-goal; concrete adapters (Mock, a real
/// HTTP-based embedding service) are supplied by the caller.
#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;
}
