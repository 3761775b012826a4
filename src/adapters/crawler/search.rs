use crate::domain::models::Issue;
use crate::domain::ProgressEvent;
use crate::error::Result;
use regex::Regex;
use rquest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;

const OPENFRAME_PRODUCTS: &[&str] = &[
    "128", "129", "130", "131", "132", "133", "134", "135", "136", "137", "138", "139", "140",
    "141", "142", "143", "144", "145", "146", "147",
];

pub fn default_products() -> Vec<String> {
    OPENFRAME_PRODUCTS.iter().map(|s| s.to_string()).collect()
}

/// Extracts the total hit count from a search-results page via the
/// reference crawler's four-method fallback chain: bracketed `[Total N]`
/// text, a hidden `totalCount` input, an inline `totalCount = N` JS
/// assignment, then a looser `Total: N` pattern.
pub fn extract_total_count(html: &str) -> u32 {
    static BRACKET_RE: OnceLock<Regex> = OnceLock::new();
    let bracket_re =
        BRACKET_RE.get_or_init(|| Regex::new(r"(?i)\[\s*total\s+(\d+)\s*\]").unwrap());
    if let Some(caps) = bracket_re.captures(html) {
        if let Ok(n) = caps[1].parse() {
            return n;
        }
    }

    static INPUT_SELECTOR: OnceLock<Selector> = OnceLock::new();
    let input_selector =
        INPUT_SELECTOR.get_or_init(|| Selector::parse("input#totalCount, input[name=totalCount]").unwrap());
    let doc = Html::parse_document(html);
    if let Some(el) = doc.select(input_selector).next() {
        if let Some(v) = el.value().attr("value") {
            if let Ok(n) = v.trim().parse() {
                return n;
            }
        }
    }

    static INLINE_RE: OnceLock<Regex> = OnceLock::new();
    let inline_re =
        INLINE_RE.get_or_init(|| Regex::new(r#"totalCount['"]?\s*[=:]\s*['"]?(\d+)"#).unwrap());
    if let Some(caps) = inline_re.captures(html) {
        if let Ok(n) = caps[1].parse() {
            return n;
        }
    }

    static LOOSE_RE: OnceLock<Regex> = OnceLock::new();
    let loose_re = LOOSE_RE.get_or_init(|| Regex::new(r"(?i)total[:\s]+(\d+)").unwrap());
    if let Some(caps) = loose_re.captures(html) {
        if let Ok(n) = caps[1].parse() {
            return n;
        }
    }

    0
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses a search-results page into search-row issues. Rows are
/// `<tr onclick="popBlankIssueView('<id>', ...)">`; cells 2..10 map to
/// category/product/version/module/subject/customer/project/reporter/date.
pub fn parse_search_results(html: &str, user_id: &str, base_url: &str) -> Vec<Issue> {
    static ROW_SELECTOR: OnceLock<Selector> = OnceLock::new();
    let row_selector = ROW_SELECTOR.get_or_init(|| Selector::parse("tr").unwrap());
    static CELL_SELECTOR: OnceLock<Selector> = OnceLock::new();
    let cell_selector = CELL_SELECTOR.get_or_init(|| Selector::parse("td").unwrap());
    static ID_RE: OnceLock<Regex> = OnceLock::new();
    let id_re =
        ID_RE.get_or_init(|| Regex::new(r#"popBlankIssueView\s*\(\s*['"](\d+)['"]"#).unwrap());

    let doc = Html::parse_document(html);
    let mut issues = Vec::new();

    for row in doc.select(row_selector) {
        let onclick = match row.value().attr("onclick") {
            Some(v) if v.contains("popBlankIssueView") => v,
            _ => continue,
        };
        let ims_id = match id_re.captures(onclick) {
            Some(c) => c[1].to_string(),
            None => continue,
        };

        let cells: Vec<String> = row
            .select(cell_selector)
            .map(|c| collapse_whitespace(&c.text().collect::<String>()))
            .collect();
        if cells.len() < 7 {
            continue;
        }

        let title = cells.get(6).cloned().filter(|s| !s.is_empty());
        let mut issue = Issue::from_search_row(user_id, &ims_id, title);
        issue.category = cells.get(2).cloned().filter(|s| !s.is_empty());
        issue.product = cells.get(3).cloned().filter(|s| !s.is_empty());
        issue.version = cells.get(4).cloned().filter(|s| !s.is_empty());
        issue.module = cells.get(5).cloned().filter(|s| !s.is_empty());
        issue.customer = cells.get(7).cloned().filter(|s| !s.is_empty());
        issue.project_key = cells.get(8).cloned().filter(|s| !s.is_empty());
        issue.reporter = cells.get(9).cloned().filter(|s| !s.is_empty());
        issue.source_url = Some(format!(
            "{base_url}/tody/ims/issue/issueView.do?issueId={ims_id}"
        ));
        issues.push(issue);
    }

    issues
}

pub struct SearchSession<'a> {
    pub client: &'a Client,
    pub base_url: &'a str,
    pub user_id: &'a str,
    pub user_name: &'a str,
    pub user_grade: &'a str,
    pub max_pages: usize,
}

/// Paginates the IMS search listing. The server ignores page-size hints and
/// always returns a small fixed page, so the total count is discovered from
/// the first page and pages are walked until the accumulated count reaches
/// the total, an empty page is returned, or `max_pages` is hit.
impl<'a> SearchSession<'a> {
    pub async fn search(
        &self,
        query: &str,
        product_codes: &[String],
        on_progress: &dyn Fn(ProgressEvent),
    ) -> Result<(Vec<Issue>, bool)> {
        on_progress(ProgressEvent::SearchStart {
            query: query.to_string(),
            products_count: product_codes.len(),
        });

        let mut all_issues: Vec<Issue> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut page: usize = 1;
        let mut total_count: Option<u32> = None;
        let mut total_pages: u32 = 1;
        let mut truncated = false;

        loop {
            if page > self.max_pages {
                truncated = true;
                break;
            }

            let mut params: Vec<(String, String)> = vec![
                ("reSearchYN".into(), "Y".into()),
                ("searchType".into(), "1".into()),
                ("pageIndex".into(), page.to_string()),
                ("pageSize".into(), "100".into()),
                ("keyword".into(), query.trim().to_string()),
                ("orderType".into(), "desc".into()),
                ("userId".into(), self.user_id.to_string()),
                ("userName".into(), self.user_name.to_string()),
                ("userGrade".into(), self.user_grade.to_string()),
            ];
            for code in product_codes {
                params.push(("productCodes".into(), code.clone()));
            }

            let url = format!("{}/tody/ims/issue/issueSearchList.do", self.base_url);
            let resp = self
                .client
                .get(&url)
                .query(&params)
                .header("Referer", self.base_url)
                .send()
                .await?;
            let html = resp.text().await?;

            if total_count.is_none() {
                let count = extract_total_count(&html);
                total_count = Some(count);
                total_pages = if count == 0 { 0 } else { (count + 9) / 10 };
                on_progress(ProgressEvent::SearchCount {
                    total_count: count,
                    total_pages,
                });
            }

            let page_issues = parse_search_results(&html, self.user_id, self.base_url);
            let page_count = page_issues.len() as u32;
            let progress_percent = if total_pages == 0 {
                100
            } else {
                (((page as u32) * 100) / total_pages).min(100) as u8
            };
            on_progress(ProgressEvent::SearchPage {
                current_page: page as u32,
                total_pages,
                page_issues: page_count,
                fetched_count: (all_issues.len() as u32) + page_count,
                total_count: total_count.unwrap_or(0),
                progress_percent,
            });

            if page_issues.is_empty() {
                break;
            }
            // Pagination duplicate prevention: the IMS search endpoint can
            // return overlapping rows across consecutive pages.
            for issue in page_issues {
                if seen_ids.insert(issue.ims_id.clone()) {
                    all_issues.push(issue);
                }
            }

            if all_issues.len() as u32 >= total_count.unwrap_or(0) {
                break;
            }
            page += 1;
        }

        on_progress(ProgressEvent::SearchComplete {
            fetched_count: all_issues.len() as u32,
            total_count: total_count.unwrap_or(0),
            truncated,
        });

        Ok((all_issues, truncated))
    }
}
