//! Converts a natural-language query into a structured `SearchIntent` via an
//! LLM call, then renders IMS native search syntax. Grounded on
//! `nvidia_nim_parser.py`'s `parse_query`/`convert_to_ims_syntax`, with the
//! try/except JSON decode swapped for permissive brace-delimited extraction
//! so minor prose wrapped around the JSON payload does not trigger the
//! keyword-search fallback unnecessarily.

use crate::domain::models::{SearchIntent, SearchIntentKind};
use crate::ports::llm_port::{LLMConfig, LLMMessage, LLMPort, LLMRole};
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

const DEFAULT_MAX_RESULTS: i64 = 100;

#[derive(Debug, Deserialize, Default)]
struct ParsedIntent {
    intent_type: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    status_filters: Vec<String>,
    #[serde(default)]
    priority_filters: Vec<String>,
    #[serde(default)]
    assignee_filters: Vec<String>,
    #[serde(default)]
    project_filters: Vec<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    semantic_query: Option<String>,
    confidence_score: Option<f32>,
}

fn system_prompt(language: &str) -> String {
    format!(
        r#"You are an expert IMS (Issue Management System) query parser.

Your task is to convert natural language queries into structured JSON format.

Supported languages: English, Korean, Japanese
Current language: {language}

Output JSON schema:
{{
  "intent_type": "keyword_search|status_filter|priority_filter|date_range|assignee_filter|project_filter|complex_query|semantic_search",
  "keywords": ["word1", "word2"],
  "status_filters": ["open", "resolved", "closed"],
  "priority_filters": ["critical", "high", "medium", "low"],
  "assignee_filters": ["username"],
  "project_filters": ["project_key"],
  "date_from": "YYYY-MM-DD",
  "date_to": "YYYY-MM-DD",
  "semantic_query": "semantic search text",
  "confidence_score": 0.0-1.0
}}

Rules:
1. Extract ALL relevant filters from the query
2. Use "complex_query" for queries with multiple filters
3. Use "semantic_search" for conceptual/meaning-based queries
4. Set confidence_score based on query clarity (0.0-1.0)
5. Return ONLY valid JSON, no additional text"#
    )
}

fn user_prompt(query: &str) -> String {
    format!("Parse this query:\n\"{query}\"\n\nReturn structured JSON:")
}

/// Extracts the first balanced-looking JSON object in `text` by taking the
/// substring from the first `{` to the last `}`, tolerating minor prose the
/// model emits around the payload.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn keyword_fallback(raw_query: &str) -> SearchIntent {
    SearchIntent {
        intent_type: SearchIntentKind::Keyword,
        keywords: raw_query.split_whitespace().map(|s| s.to_string()).collect(),
        status_filters: vec![],
        priority_filters: vec![],
        assignee_filters: vec![],
        project_filters: vec![],
        date_from: None,
        date_to: None,
        semantic_query: None,
        include_related: true,
        include_attachments: true,
        max_results: DEFAULT_MAX_RESULTS,
        raw_query: raw_query.to_string(),
        parsed_ims_syntax: None,
        confidence_score: 0.5,
    }
}

pub struct IntentParser {
    llm: std::sync::Arc<dyn LLMPort>,
}

impl IntentParser {
    pub fn new(llm: std::sync::Arc<dyn LLMPort>) -> Self {
        Self { llm }
    }

    pub async fn parse_query(&self, raw_query: &str, language: &str) -> SearchIntent {
        let messages = vec![
            LLMMessage { role: LLMRole::System, content: system_prompt(language) },
            LLMMessage { role: LLMRole::User, content: user_prompt(raw_query) },
        ];
        let config = LLMConfig { temperature: 0.1, max_tokens: 1024, model: None };

        let response = match self.llm.generate(&messages, &config).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "intent parsing LLM call failed, falling back to keyword search");
                return keyword_fallback(raw_query);
            }
        };

        let json_slice = match extract_json_object(&response.content) {
            Some(s) => s,
            None => {
                warn!("intent parsing response had no JSON object, falling back to keyword search");
                return keyword_fallback(raw_query);
            }
        };

        let parsed: ParsedIntent = match serde_json::from_str(json_slice) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "intent parsing JSON decode failed, falling back to keyword search");
                return keyword_fallback(raw_query);
            }
        };

        let intent_type = parsed
            .intent_type
            .as_deref()
            .and_then(|s| SearchIntentKind::from_str(s).ok())
            .unwrap_or(SearchIntentKind::Keyword);

        SearchIntent {
            intent_type,
            keywords: parsed.keywords,
            status_filters: parsed.status_filters,
            priority_filters: parsed.priority_filters,
            assignee_filters: parsed.assignee_filters,
            project_filters: parsed.project_filters,
            date_from: parsed.date_from,
            date_to: parsed.date_to,
            semantic_query: parsed.semantic_query,
            include_related: true,
            include_attachments: true,
            max_results: DEFAULT_MAX_RESULTS,
            raw_query: raw_query.to_string(),
            parsed_ims_syntax: None,
            confidence_score: parsed.confidence_score.unwrap_or(0.7),
        }
    }

    /// Renders IMS native search syntax: per-field `OR`-joined groups,
    /// the groups themselves joined with `AND`, defaulting to a wildcard
    /// text search when every filter list is empty.
    pub fn convert_to_ims_syntax(&self, intent: &SearchIntent) -> String {
        let mut parts = Vec::new();

        if !intent.keywords.is_empty() {
            let joined = intent.keywords.iter().map(|k| format!("text~\"{k}\"")).collect::<Vec<_>>().join(" OR ");
            parts.push(format!("({joined})"));
        }
        if !intent.status_filters.is_empty() {
            let joined = intent.status_filters.iter().map(|s| format!("status=\"{s}\"")).collect::<Vec<_>>().join(" OR ");
            parts.push(format!("({joined})"));
        }
        if !intent.priority_filters.is_empty() {
            let joined = intent.priority_filters.iter().map(|p| format!("priority=\"{p}\"")).collect::<Vec<_>>().join(" OR ");
            parts.push(format!("({joined})"));
        }
        if !intent.assignee_filters.is_empty() {
            let joined = intent.assignee_filters.iter().map(|a| format!("assignee=\"{a}\"")).collect::<Vec<_>>().join(" OR ");
            parts.push(format!("({joined})"));
        }
        if !intent.project_filters.is_empty() {
            let joined = intent.project_filters.iter().map(|p| format!("project=\"{p}\"")).collect::<Vec<_>>().join(" OR ");
            parts.push(format!("({joined})"));
        }
        if let Some(from) = &intent.date_from {
            parts.push(format!("created >= \"{from}\""));
        }
        if let Some(to) = &intent.date_to {
            parts.push(format!("created <= \"{to}\""));
        }

        if parts.is_empty() {
            "text~*".to_string()
        } else {
            parts.join(" AND ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::mock::MockLLMAdapter;
    use std::sync::Arc;

    #[tokio::test]
    async fn malformed_response_falls_back_to_keyword_search() {
        let llm = Arc::new(MockLLMAdapter::with_response("not json at all"));
        let parser = IntentParser::new(llm);
        let intent = parser.parse_query("auth error today", "en").await;
        assert_eq!(intent.intent_type, SearchIntentKind::Keyword);
        assert_eq!(intent.confidence_score, 0.5);
        assert_eq!(intent.keywords, vec!["auth", "error", "today"]);
    }

    #[tokio::test]
    async fn wrapped_json_is_still_extracted() {
        let llm = Arc::new(MockLLMAdapter::with_response(
            "Sure, here you go:\n{\"intent_type\": \"priority_filter\", \"priority_filters\": [\"critical\"], \"confidence_score\": 0.9}\nHope that helps!",
        ));
        let parser = IntentParser::new(llm);
        let intent = parser.parse_query("critical bugs", "en").await;
        assert_eq!(intent.intent_type, SearchIntentKind::Priority);
        assert_eq!(intent.priority_filters, vec!["critical"]);
    }

    #[test]
    fn empty_intent_renders_wildcard() {
        let llm = Arc::new(MockLLMAdapter::with_response(""));
        let parser = IntentParser::new(llm);
        let intent = keyword_fallback("");
        let mut intent = intent;
        intent.keywords.clear();
        assert_eq!(parser.convert_to_ims_syntax(&intent), "text~*");
    }

    #[test]
    fn filters_join_with_and_across_fields() {
        let llm = Arc::new(MockLLMAdapter::with_response(""));
        let parser = IntentParser::new(llm);
        let mut intent = keyword_fallback("bug");
        intent.status_filters = vec!["open".to_string()];
        let syntax = parser.convert_to_ims_syntax(&intent);
        assert!(syntax.contains("AND"));
        assert!(syntax.contains("status=\"open\""));
    }
}
