//! Issue-bounded chat: answers questions using only the issues the caller
//! names, never general model knowledge. Grounded on
//! `ims_rag_integration.py`'s `IMSRAGIntegrationService`.

use crate::config::Config;
use crate::domain::models::Issue;
use crate::error::{AppError, Result};
use crate::ports::llm_port::{LLMConfig, LLMMessage, LLMPort, LLMRole};
use crate::repository::IssueRepository;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

const SYSTEM_PROMPT_HEADER: &str = "You are an AI assistant specialized in analyzing TmaxSoft IMS (Issue Management System) issues.\n\nYour knowledge is LIMITED to the following IMS issues that were searched/crawled by the user.\nYou MUST only answer questions based on the provided issue context.\nIf a question cannot be answered from the provided issues, say so clearly.\n\nIMPORTANT RULES:\n1. Only use information from the provided IMS issues\n2. When referencing issues, always cite the IMS ID\n3. Provide accurate technical information from the issue details\n4. If you're unsure, say so - don't make up information\n5. Respond in the same language as the user's question (Korean, Japanese, or English)\n\nAvailable IMS Issues for context:\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub referenced_issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatConversation {
    pub id: Uuid,
    pub issue_ids: Vec<i64>,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub conversation_id: Option<Uuid>,
    pub issue_ids: Vec<i64>,
    pub question: String,
    pub max_context_issues: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueContext {
    pub issue_id: i64,
    pub ims_id: String,
    pub title: String,
    pub status_raw: Option<String>,
    pub priority_raw: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub content: String,
    pub referenced_issues: Vec<IssueContext>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub created_at: DateTime<Utc>,
}

/// Tagged-union chat stream event matching the `start -> token* -> sources ->
/// done` (or `error`) sequence from the reference implementation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Start { conversation_id: Uuid, message_id: Uuid, issues_count: usize },
    Token { content: String, is_final: bool },
    Sources { sources: Vec<IssueContext> },
    Done { conversation_id: Uuid, message_id: Uuid, total_issues: usize },
    Error { message: String },
}

fn field_or(value: &Option<String>, fallback: &str) -> String {
    value.clone().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| fallback.to_string())
}

fn build_system_prompt(issues: &[Issue]) -> String {
    let mut contexts = Vec::with_capacity(issues.len());
    for issue in issues {
        let context = format!(
            "\n--- Issue: {} ---\nTitle: {}\nStatus: {}\nPriority: {}\nProduct: {}\nVersion: {}\nModule: {}\nCustomer: {}\nReporter: {}\nCreated: {}\n\nDescription:\n{}\n\nIssue Details:\n{}\n\nAction Notes:\n{}\n---\n",
            issue.ims_id,
            issue.title,
            field_or(&issue.status_raw, issue.status.as_str()),
            field_or(&issue.priority_raw, issue.priority.as_str()),
            field_or(&issue.product, "N/A"),
            field_or(&issue.version, "N/A"),
            field_or(&issue.module, "N/A"),
            field_or(&issue.customer, "N/A"),
            field_or(&issue.reporter, "N/A"),
            issue.crawled_at.format("%Y-%m-%d"),
            if issue.description.trim().is_empty() { "No description".to_string() } else { issue.description.clone() },
            field_or(&issue.issue_details, "No additional details"),
            field_or(&issue.action_log, "No action notes"),
        );
        contexts.push(context);
    }

    format!("{SYSTEM_PROMPT_HEADER}{}\n\nTotal issues in context: {}\n", contexts.join("\n"), issues.len())
}

fn extract_referenced_issues(content: &str, issues: &[Issue]) -> Vec<String> {
    issues.iter().filter(|i| content.contains(&i.ims_id)).map(|i| i.ims_id.clone()).collect()
}

/// Drives issue-bounded question answering and keeps an in-memory
/// conversation history per conversation id, the way the reference
/// service's `_conversations` map does.
pub struct RagChatService {
    config: Config,
    llm: Arc<dyn LLMPort>,
    issue_repo: IssueRepository,
    conversations: DashMap<Uuid, ChatConversation>,
}

impl RagChatService {
    pub fn new(config: Config, llm: Arc<dyn LLMPort>, issue_repo: IssueRepository) -> Self {
        Self { config, llm, issue_repo, conversations: DashMap::new() }
    }

    async fn context_issues(&self, request: &ChatRequest, user_id: &str) -> Result<Vec<Issue>> {
        let issues = self.issue_repo.find_by_ids_with_details(&request.issue_ids, user_id).await?;
        if issues.is_empty() {
            return Err(AppError::validation("no valid issues found for the provided ids"));
        }
        Ok(issues.into_iter().take(request.max_context_issues).collect())
    }

    fn get_or_create_conversation(&self, conversation_id: Option<Uuid>, issue_ids: &[i64]) -> ChatConversation {
        if let Some(id) = conversation_id {
            if let Some(existing) = self.conversations.get(&id) {
                return existing.clone();
            }
        }
        let now = Utc::now();
        let conversation = ChatConversation {
            id: Uuid::new_v4(),
            issue_ids: issue_ids.to_vec(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.conversations.insert(conversation.id, conversation.clone());
        conversation
    }

    fn build_llm_messages(&self, system_prompt: String, conversation: &ChatConversation, question: &str) -> Vec<LLMMessage> {
        let mut messages = vec![LLMMessage { role: LLMRole::System, content: system_prompt }];
        let window = self.config.chat_history_window;
        let start = conversation.messages.len().saturating_sub(window);
        for msg in &conversation.messages[start..] {
            let role = match msg.role {
                ChatRole::User => LLMRole::User,
                ChatRole::Assistant => LLMRole::Assistant,
            };
            messages.push(LLMMessage { role, content: msg.content.clone() });
        }
        messages.push(LLMMessage { role: LLMRole::User, content: question.to_string() });
        messages
    }

    pub async fn chat(&self, request: ChatRequest, user_id: &str) -> Result<ChatResponse> {
        let context_issues = self.context_issues(&request, user_id).await?;
        let system_prompt = build_system_prompt(&context_issues);
        let conversation = self.get_or_create_conversation(request.conversation_id, &request.issue_ids);
        let messages = self.build_llm_messages(system_prompt, &conversation, &request.question);

        let config = LLMConfig { temperature: 0.3, max_tokens: 2048, model: None };
        let response = self.llm.generate(&messages, &config).await?;

        let message_id = Uuid::new_v4();
        let now = Utc::now();
        self.append_exchange(&conversation.id, &request.question, &response.content, &context_issues, message_id, now);

        let referenced_issues = context_issues
            .iter()
            .map(|i| IssueContext {
                issue_id: i.id,
                ims_id: i.ims_id.clone(),
                title: i.title.clone(),
                status_raw: i.status_raw.clone(),
                priority_raw: i.priority_raw.clone(),
            })
            .collect();

        Ok(ChatResponse {
            conversation_id: conversation.id,
            message_id,
            content: response.content,
            referenced_issues,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            created_at: now,
        })
    }

    /// Streams `start -> token* -> sources -> done`, or a single `error`
    /// event, to `tx`. Errors are delivered as events rather than returned,
    /// mirroring the reference generator's try/except-around-the-whole-body
    /// shape.
    pub async fn chat_stream(&self, request: ChatRequest, user_id: &str, tx: &Sender<ChatStreamEvent>) {
        let context_issues = match self.context_issues(&request, user_id).await {
            Ok(issues) => issues,
            Err(e) => {
                let _ = tx.send(ChatStreamEvent::Error { message: e.to_string() }).await;
                return;
            }
        };

        let conversation = self.get_or_create_conversation(request.conversation_id, &request.issue_ids);
        let message_id = Uuid::new_v4();

        let _ = tx
            .send(ChatStreamEvent::Start {
                conversation_id: conversation.id,
                message_id,
                issues_count: context_issues.len(),
            })
            .await;

        let system_prompt = build_system_prompt(&context_issues);
        let messages = self.build_llm_messages(system_prompt, &conversation, &request.question);
        let config = LLMConfig { temperature: 0.3, max_tokens: 2048, model: None };

        let mut stream = match self.llm.generate_stream(&messages, &config).await {
            Ok(s) => s,
            Err(e) => {
                let _ = tx.send(ChatStreamEvent::Error { message: e.to_string() }).await;
                return;
            }
        };

        let mut full_content = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    full_content.push_str(&chunk.content);
                    let _ = tx
                        .send(ChatStreamEvent::Token { content: chunk.content, is_final: chunk.is_final })
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(ChatStreamEvent::Error { message: e.to_string() }).await;
                    return;
                }
            }
        }

        let now = Utc::now();
        self.append_exchange(&conversation.id, &request.question, &full_content, &context_issues, message_id, now);

        let sources = context_issues
            .iter()
            .map(|i| IssueContext {
                issue_id: i.id,
                ims_id: i.ims_id.clone(),
                title: i.title.clone(),
                status_raw: i.status_raw.clone(),
                priority_raw: i.priority_raw.clone(),
            })
            .collect();
        let _ = tx.send(ChatStreamEvent::Sources { sources }).await;
        let _ = tx
            .send(ChatStreamEvent::Done { conversation_id: conversation.id, message_id, total_issues: context_issues.len() })
            .await;
    }

    fn append_exchange(
        &self,
        conversation_id: &Uuid,
        question: &str,
        answer: &str,
        context_issues: &[Issue],
        message_id: Uuid,
        now: DateTime<Utc>,
    ) {
        if let Some(mut conversation) = self.conversations.get_mut(conversation_id) {
            conversation.messages.push(ChatMessage {
                id: Uuid::new_v4(),
                role: ChatRole::User,
                content: question.to_string(),
                created_at: now,
                referenced_issues: Vec::new(),
            });
            conversation.messages.push(ChatMessage {
                id: message_id,
                role: ChatRole::Assistant,
                content: answer.to_string(),
                created_at: now,
                referenced_issues: extract_referenced_issues(answer, context_issues),
            });
            conversation.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::mock::MockLLMAdapter;
    use crate::test_support::setup_test_db;

    #[tokio::test]
    async fn chat_errors_when_no_issues_found() {
        let pool = setup_test_db().await;
        let service = RagChatService::new(
            Config::default(),
            Arc::new(MockLLMAdapter::new()),
            IssueRepository::new(pool),
        );
        let request = ChatRequest {
            conversation_id: None,
            issue_ids: vec![999],
            question: "what is this about?".to_string(),
            max_context_issues: 10,
        };
        let result = service.chat(request, "u1").await;
        assert!(result.is_err());
    }

    #[test]
    fn system_prompt_enumerates_fields_with_fallbacks() {
        let issue = crate::test_support::sample_issue("u1", "1001");
        let prompt = build_system_prompt(&[issue]);
        assert!(prompt.contains("Issue: 1001"));
        assert!(prompt.contains("Product: N/A"));
        assert!(prompt.contains("Total issues in context: 1"));
    }

    #[test]
    fn referenced_issues_is_a_literal_substring_scan() {
        let mut issue = crate::test_support::sample_issue("u1", "1001");
        issue.ims_id = "ISSUE-42".to_string();
        let content = "This relates to ISSUE-42 and no other issue.";
        let refs = extract_referenced_issues(content, &[issue]);
        assert_eq!(refs, vec!["ISSUE-42".to_string()]);
    }
}
