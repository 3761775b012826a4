use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LLMRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct LLMMessage {
    pub role: LLMRole,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: Option<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2048,
            model: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LLMStreamChunk {
    pub content: String,
    pub is_final: bool,
}

/// Capability interface over a language-model backend. Concrete variants
/// (Mock for tests, an HTTP-based adapter for real providers) implement this
/// trait; callers never depend on a specific backend.
#[async_trait]
pub trait LLMPort: Send + Sync {
    async fn generate(&self, messages: &[LLMMessage], config: &LLMConfig) -> Result<LLMResponse>;

    async fn generate_stream(
        &self,
        messages: &[LLMMessage],
        config: &LLMConfig,
    ) -> Result<BoxStream<'static, Result<LLMStreamChunk>>>;
}
