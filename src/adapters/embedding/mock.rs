use crate::error::Result;
use crate::ports::embedding_port::EmbeddingPort;
use async_trait::async_trait;

/// Deterministic embedding stand-in for tests: hashes the input text into a
/// fixed-dimension unit vector so that repeated calls on the same text are
/// stable and different texts diverge, without pulling in a real model.
pub struct MockEmbeddingAdapter {
    dimensions: usize,
}

impl MockEmbeddingAdapter {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let mut seed: u64 = 1469598103934665603;
        for byte in text.bytes() {
            seed ^= byte as u64;
            seed = seed.wrapping_mul(1099511628211);
            let idx = (seed as usize) % self.dimensions;
            vector[idx] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingPort for MockEmbeddingAdapter {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.hash_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let adapter = MockEmbeddingAdapter::new(32);
        let a = adapter.embed_text("hello world").await.unwrap();
        let b = adapter.embed_text("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn batch_matches_individual() {
        let adapter = MockEmbeddingAdapter::new(16);
        let batch = adapter
            .embed_batch(&["foo".to_string(), "bar".to_string()])
            .await
            .unwrap();
        let individual = adapter.embed_text("foo").await.unwrap();
        assert_eq!(batch[0], individual);
    }
}
