use crate::error::{AppError, Result};
use crate::ports::llm_port::{LLMConfig, LLMMessage, LLMPort, LLMResponse, LLMRole, LLMStreamChunk};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use rquest::Client;
use serde_json::json;
use std::time::Duration;

fn role_str(role: LLMRole) -> &'static str {
    match role {
        LLMRole::System => "system",
        LLMRole::User => "user",
        LLMRole::Assistant => "assistant",
    }
}

/// Generic chat-completions-style HTTP adapter, grounded on the reference
/// application's direct JSON POST-and-navigate pattern for calling a hosted
/// LLM API (build request body, POST with bearer header, walk the response
/// JSON). Works against any OpenAI-compatible `/chat/completions` endpoint;
/// streaming is emulated by splitting the non-streaming response, since this
/// crate does not depend on a provider-specific SDK.
pub struct HttpLLMAdapter {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpLLMAdapter {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl LLMPort for HttpLLMAdapter {
    async fn generate(&self, messages: &[LLMMessage], config: &LLMConfig) -> Result<LLMResponse> {
        let body = json!({
            "model": config.model.clone().unwrap_or_else(|| "default".to_string()),
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
            "messages": messages.iter().map(|m| json!({
                "role": role_str(m.role),
                "content": m.content,
            })).collect::<Vec<_>>(),
        });

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AppError::transport(format!(
                "LLM API returned status {}",
                resp.status()
            )));
        }

        let response_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::parse(e.to_string()))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AppError::parse("missing choices[0].message.content in LLM response"))?
            .to_string();

        let input_tokens = response_json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
        let output_tokens = response_json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(LLMResponse {
            content,
            input_tokens,
            output_tokens,
        })
    }

    async fn generate_stream(
        &self,
        messages: &[LLMMessage],
        config: &LLMConfig,
    ) -> Result<BoxStream<'static, Result<LLMStreamChunk>>> {
        let response = self.generate(messages, config).await?;
        let words: Vec<String> = response.content.split_whitespace().map(String::from).collect();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_parses_chat_completion_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"hello there"}}],"usage":{"prompt_tokens":12,"completion_tokens":3}}"#,
            )
            .create_async()
            .await;

        let adapter = HttpLLMAdapter::new(
            format!("{}/v1/chat/completions", server.url()),
            "test-key",
            Duration::from_secs(5),
        )
        .unwrap();

        let messages = vec![LLMMessage { role: LLMRole::User, content: "hi".to_string() }];
        let response = adapter.generate(&messages, &LLMConfig::default()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hello there");
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 3);
    }

    #[tokio::test]
    async fn generate_errors_on_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/v1/chat/completions").with_status(500).create_async().await;

        let adapter = HttpLLMAdapter::new(
            format!("{}/v1/chat/completions", server.url()),
            "test-key",
            Duration::from_secs(5),
        )
        .unwrap();

        let messages = vec![LLMMessage { role: LLMRole::User, content: "hi".to_string() }];
        let result = adapter.generate(&messages, &LLMConfig::default()).await;
        assert!(result.is_err());
    }
}
