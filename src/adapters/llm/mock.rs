use crate::error::Result;
use crate::ports::llm_port::{LLMConfig, LLMMessage, LLMPort, LLMResponse, LLMStreamChunk};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};

/// Test double that echoes the last user message, optionally prefixed with
/// a canned response. Used by orchestrator/RAG tests that do not need a
/// real model call.
pub struct MockLLMAdapter {
    pub fixed_response: Option<String>,
}

impl MockLLMAdapter {
    pub fn new() -> Self {
        Self { fixed_response: None }
    }

    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            fixed_response: Some(text.into()),
        }
    }
}

impl Default for MockLLMAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMPort for MockLLMAdapter {
    async fn generate(&self, messages: &[LLMMessage], _config: &LLMConfig) -> Result<LLMResponse> {
        let content = self.fixed_response.clone().unwrap_or_else(|| {
            messages
                .last()
                .map(|m| format!("echo: {}", m.content))
                .unwrap_or_default()
        });
        Ok(LLMResponse {
            input_tokens: messages.iter().map(|m| m.content.split_whitespace().count() as u32).sum(),
            output_tokens: content.split_whitespace().count() as u32,
            content,
        })
    }

    async fn generate_stream(
        &self,
        messages: &[LLMMessage],
        config: &LLMConfig,
    ) -> Result<BoxStream<'static, Result<LLMStreamChunk>>> {
        let response = self.generate(messages, config).await?;
        let words: Vec<String> = response
            .content
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();
        let total = words.len();
        let chunks: Vec<Result<LLMStreamChunk>> = words
            .into_iter()
            .enumerate()
            .map(|(i, w)| {
                Ok(LLMStreamChunk {
                    content: if i + 1 == total { w } else { format!("{w} ") },
                    is_final: i + 1 == total,
                })
            })
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
