use crate::domain::models::{Issue, IssuePriority, IssueStatus, ACTION_LOG_CAP};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

fn unescape_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#64;", "@")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Locates a `<td class="tableHeaderTitle">` whose text matches `label`
/// case-insensitively and returns the text of the next `<td>` sibling. This
/// is the primary, structural extraction path; regex is reserved for the
/// handful of fields the markup does not expose as a clean DOM pair.
pub fn get_table_field(doc: &Html, label: &str) -> Option<String> {
    static HEADER_SELECTOR: OnceLock<Selector> = OnceLock::new();
    let header_selector =
        HEADER_SELECTOR.get_or_init(|| Selector::parse("td.tableHeaderTitle").unwrap());

    let label_lower = label.to_lowercase();
    for header in doc.select(header_selector) {
        let text = collapse_whitespace(&header.text().collect::<String>());
        if text.to_lowercase().contains(&label_lower) {
            if let Some(value_td) = next_td_sibling(header) {
                let text = collapse_whitespace(&value_td.text().collect::<String>());
                let text = unescape_entities(&text);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn next_td_sibling(el: ElementRef) -> Option<ElementRef> {
    let mut sibling = el.next_sibling();
    while let Some(node) = sibling {
        if let Some(candidate) = ElementRef::wrap(node) {
            if candidate.value().name() == "td" {
                return Some(candidate);
            }
        }
        sibling = node.next_sibling();
    }
    None
}

pub fn extract_subject(doc: &Html, fallback_title: &str) -> String {
    if let Some(v) = get_table_field(doc, "Subject") {
        return v;
    }
    fallback_title.to_string()
}

/// Description lives in a labelled `<div id="IssueDescriptionDiv">` block
/// rather than a table cell, so it is pulled by id and stripped of markup.
pub fn extract_description(html: &str) -> Option<String> {
    static DESC_RE: OnceLock<Regex> = OnceLock::new();
    let desc_re = DESC_RE.get_or_init(|| {
        Regex::new(r#"(?is)id=['"]IssueDescriptionDiv['"][^>]*>(.*?)</div>"#).unwrap()
    });
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").unwrap());

    desc_re.captures(html).map(|caps| {
        let stripped = tag_re.replace_all(&caps[1], " ");
        collapse_whitespace(&unescape_entities(&stripped))
    })
}

/// Action log text is the concatenation of every `<div class="commDescTR">`
/// occurrence, capped at 10,000 characters, joined with `" | "`.
pub fn extract_action_log(doc: &Html, html: &str) -> Option<String> {
    static COMM_SELECTOR: OnceLock<Selector> = OnceLock::new();
    let comm_selector =
        COMM_SELECTOR.get_or_init(|| Selector::parse("div.commDescTR").unwrap());

    let mut parts: Vec<String> = doc
        .select(comm_selector)
        .map(|el| collapse_whitespace(&unescape_entities(&el.text().collect::<String>())))
        .filter(|t| t.len() > 5)
        .collect();

    if parts.is_empty() {
        static FALLBACK_RE: OnceLock<Regex> = OnceLock::new();
        let fallback_re = FALLBACK_RE.get_or_init(|| {
            Regex::new(r#"(?is)id=['"]CommentsDiv['"][^>]*>(.*?)</div>"#).unwrap()
        });
        static TAG_RE: OnceLock<Regex> = OnceLock::new();
        let tag_re = TAG_RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").unwrap());
        if let Some(caps) = fallback_re.captures(html) {
            let stripped = tag_re.replace_all(&caps[1], " ");
            let text = collapse_whitespace(&unescape_entities(&stripped));
            if text.len() > 10 {
                parts.push(text);
            }
        }
    }

    if parts.is_empty() {
        return None;
    }
    let joined = parts.join(" | ");
    Some(joined.chars().take(ACTION_LOG_CAP).collect())
}

/// Parses an issue detail page, falling back to `fallback` fields (from the
/// search row) for anything the label lookup could not find.
pub fn parse_issue_detail(html: &str, ims_id: &str, fallback: &Issue) -> Issue {
    let doc = Html::parse_document(html);
    let mut issue = fallback.clone();
    issue.ims_id = ims_id.to_string();

    issue.title = extract_subject(&doc, &fallback.title);
    if let Some(desc) = extract_description(html) {
        issue.description = desc;
    }
    issue.issue_details = Some(issue.description.clone());
    issue.action_log = extract_action_log(&doc, html);

    if let Some(v) = get_table_field(&doc, "Category") {
        issue.category = Some(v);
    }
    if let Some(v) = get_table_field(&doc, "Product") {
        issue.product = Some(v);
    }
    if let Some(v) = get_table_field(&doc, "Version") {
        issue.version = Some(v);
    }
    if let Some(v) = get_table_field(&doc, "Module") {
        issue.module = Some(v);
    }
    if let Some(v) = get_table_field(&doc, "Customer") {
        issue.customer = Some(v);
    }
    if let Some(v) = get_table_field(&doc, "Reporter").or_else(|| get_table_field(&doc, "Register")) {
        issue.reporter = Some(v);
    }
    if let Some(v) = get_table_field(&doc, "Project") {
        issue.project_key = Some(v);
    }

    let status_text = get_table_field(&doc, "Status");
    if let Some(ref raw) = status_text {
        issue.status = IssueStatus::from_raw(raw);
        issue.status_raw = Some(raw.clone());
    }

    let priority_text =
        get_table_field(&doc, "Priority").or_else(|| get_table_field(&doc, "Urgency"));
    if let Some(ref raw) = priority_text {
        issue.priority = IssuePriority::from_raw(raw);
        issue.priority_raw = Some(raw.clone());
    }

    static ACTION_ID_RE: OnceLock<Regex> = OnceLock::new();
    let action_id_re = ACTION_ID_RE.get_or_init(|| {
        Regex::new(r#"(?is)<input[^>]*name=['"]actionId['"][^>]*value=['"](\d+)['"][^>]*>"#).unwrap()
    });
    issue.comment_count = action_id_re.find_iter(html).count() as i64;

    issue
}
