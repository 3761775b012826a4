use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

#[derive(Debug, serde::Deserialize)]
struct RelationEntry {
    #[serde(rename = "issueId")]
    issue_id: Option<serde_json::Value>,
    #[serde(rename = "relationIssueId")]
    relation_issue_id: serde_json::Value,
}

/// Extracts related-issue ids from the `findRelationIssues.do` JSON array.
/// Entries whose `relationIssueId` is `0` denote the queried issue itself
/// and are excluded.
pub fn parse_related_ids_json(body: &str) -> Vec<String> {
    let entries: Vec<RelationEntry> = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|e| {
            let is_zero = matches!(&e.relation_issue_id, serde_json::Value::Number(n) if n.as_i64() == Some(0))
                || matches!(&e.relation_issue_id, serde_json::Value::String(s) if s == "0");
            if is_zero {
                return None;
            }
            e.issue_id
                .map(|v| v.to_string().trim_matches('"').to_string())
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PatchListParams {
    pub project_code: String,
    pub site_code: String,
    pub product_code: String,
    pub project_name: String,
    pub site_name: String,
}

/// Extracts the five `popupPatchList('project','site','product','projName','siteName')`
/// arguments from a detail page, if present.
pub fn parse_patch_list_params(html: &str) -> Option<PatchListParams> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"popupPatchList\s*\(\s*'([^']+)'\s*,\s*'([^']+)'\s*,\s*'([^']+)'\s*,\s*'([^']+)'\s*,\s*'([^']+)'\s*\)"#,
        )
        .unwrap()
    });
    let caps = re.captures(html)?;
    Some(PatchListParams {
        project_code: caps[1].to_string(),
        site_code: caps[2].to_string(),
        product_code: caps[3].to_string(),
        project_name: caps[4].to_string(),
        site_name: caps[5].to_string(),
    })
}

/// Extracts issue ids from a patch-list page: primarily from `href`
/// attributes containing `issueId=N`, falling back to scanning numeric cell
/// text of length 5-6 when no such links are present.
pub fn parse_patch_list_issue_ids(html: &str) -> Vec<String> {
    static LINK_SELECTOR: OnceLock<Selector> = OnceLock::new();
    let link_selector = LINK_SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap());
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    let id_re = ID_RE.get_or_init(|| Regex::new(r"issueId=(\d+)").unwrap());

    let doc = Html::parse_document(html);
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();

    for link in doc.select(link_selector) {
        let href = link.value().attr("href").unwrap_or("");
        if href.contains("issueView") {
            if let Some(caps) = id_re.captures(href) {
                let id = caps[1].to_string();
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
    }

    if ids.is_empty() {
        static CELL_SELECTOR: OnceLock<Selector> = OnceLock::new();
        let cell_selector = CELL_SELECTOR.get_or_init(|| Selector::parse("td").unwrap());
        for cell in doc.select(cell_selector) {
            let text = cell.text().collect::<String>();
            let text = text.trim();
            if text.chars().all(|c| c.is_ascii_digit()) && (5..=6).contains(&text.len()) {
                if seen.insert(text.to_string()) {
                    ids.push(text.to_string());
                }
            }
        }
    }

    ids
}

/// Concatenates related-issue sources and self-excludes/dedupes, preserving
/// first-seen order.
pub fn merge_related_ids(ims_id: &str, from_api: Vec<String>, from_patch: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    from_api
        .into_iter()
        .chain(from_patch)
        .filter(|id| id != ims_id)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
