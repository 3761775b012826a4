pub mod detail;
pub mod http_client;
pub mod related;
pub mod search;

use crate::domain::models::{Issue, UserCredentials};
use crate::domain::ProgressEvent;
use crate::error::{AppError, Result};
use crate::ports::crawler_port::{CrawlerPort, SearchProgress};
use crate::ports::credential_port::CredentialDecryptor;
use async_trait::async_trait;
use rquest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

struct Session {
    client: Client,
    user_id: String,
    user_name: String,
    user_grade: String,
}

/// HTTP-session-backed crawler against a live IMS deployment. Mirrors the
/// reference `RequestsBasedCrawler`: lazy session construction, a durable
/// cookie jar, and a sticky `_authenticated` flag that lets later jobs in
/// the same process skip re-authentication.
pub struct IMSCrawler {
    decryptor: Arc<dyn CredentialDecryptor>,
    login_timeout: Duration,
    navigation_timeout: Duration,
    max_pages: usize,
    session: RwLock<Option<Session>>,
    authenticated: AtomicBool,
}

impl IMSCrawler {
    pub fn new(
        decryptor: Arc<dyn CredentialDecryptor>,
        login_timeout: Duration,
        navigation_timeout: Duration,
        max_pages: usize,
    ) -> Self {
        Self {
            decryptor,
            login_timeout,
            navigation_timeout,
            max_pages,
            session: RwLock::new(None),
            authenticated: AtomicBool::new(false),
        }
    }

    /// Normalizes the stored base URL (validating it parses, stripping any
    /// trailing slash) so downstream `format!("{base_url}/tody/...")` calls
    /// never produce a double slash.
    fn base_url(&self, credentials: &UserCredentials) -> String {
        let raw = if credentials.ims_base_url.is_empty() {
            "https://ims.tmaxsoft.com"
        } else {
            credentials.ims_base_url.as_str()
        };
        match url::Url::parse(raw) {
            Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
            Err(_) => raw.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CrawlerPort for IMSCrawler {
    async fn authenticate(&self, credentials: &UserCredentials) -> Result<bool> {
        if self.authenticated.load(Ordering::Relaxed) {
            return Ok(true);
        }

        let username = self.decryptor.decrypt(&credentials.encrypted_username)?;
        let password = self.decryptor.decrypt(&credentials.encrypted_password)?;
        let base_url = self.base_url(credentials);

        let client = http_client::create_session_client(self.login_timeout)?;
        let login_url = format!("{base_url}/tody/auth/login.do");

        // GET first to pick up any pre-auth cookies, matching the reference
        // crawler's request ordering.
        let _ = client.get(&login_url).send().await?;

        let resp = client
            .post(&login_url)
            .form(&[("id", username.as_str()), ("password", password.as_str())])
            .send()
            .await?;

        let final_url = resp.url().to_string();
        if final_url.contains("/login") || final_url.contains("/auth/login") || final_url.contains("/error")
        {
            self.authenticated.store(false, Ordering::Relaxed);
            return Ok(false);
        }

        let body = resp.text().await.unwrap_or_default();
        let user_name = extract_hidden_input(&body, "userName").unwrap_or_else(|| username.clone());
        let user_grade = extract_hidden_input(&body, "userGrade").unwrap_or_else(|| "TMAX".to_string());

        *self.session.write().unwrap() = Some(Session {
            client,
            user_id: username,
            user_name,
            user_grade,
        });
        self.authenticated.store(true, Ordering::Relaxed);
        Ok(true)
    }

    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }

    async fn search_issues(
        &self,
        query: &str,
        credentials: &UserCredentials,
        product_codes: Option<&[String]>,
        on_progress: &SearchProgress,
    ) -> Result<Vec<Issue>> {
        let base_url = self.base_url(credentials);
        let guard = self.session.read().unwrap();
        let session = guard
            .as_ref()
            .ok_or_else(|| AppError::Authentication("not authenticated".to_string()))?;

        let products: Vec<String> = match product_codes {
            Some(p) if !p.is_empty() => p.to_vec(),
            _ => search::default_products(),
        };

        let search_session = search::SearchSession {
            client: &session.client,
            base_url: &base_url,
            user_id: &session.user_id,
            user_name: &session.user_name,
            user_grade: &session.user_grade,
            max_pages: self.max_pages,
        };

        let (issues, _truncated) = search_session
            .search(query, &products, &|ev| on_progress(ev))
            .await?;
        Ok(issues)
    }

    async fn crawl_issues_parallel(
        &self,
        mut issues: Vec<Issue>,
        credentials: &UserCredentials,
        batch_size: usize,
        cancel: &Arc<AtomicBool>,
        on_progress: &SearchProgress,
    ) -> Result<Vec<Issue>> {
        issues.sort_by(|a, b| {
            let an: i64 = a.ims_id.parse().unwrap_or(0);
            let bn: i64 = b.ims_id.parse().unwrap_or(0);
            bn.cmp(&an)
        });

        let total = issues.len() as u32;
        let total_batches = if batch_size == 0 {
            1
        } else {
            ((total as usize) + batch_size - 1).max(1) / batch_size.max(1)
        }
        .max(1) as u32;

        on_progress(ProgressEvent::CrawlStart {
            total_issues: total,
            total_batches,
            batch_size: batch_size as u32,
        });

        let base_url = self.base_url(credentials);
        let mut results = Vec::with_capacity(issues.len());
        let mut crawled_count: u32 = 0;

        for (batch_num, chunk) in issues.chunks(batch_size.max(1)).enumerate() {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let batch_num = batch_num as u32 + 1;
            let batch_start = (batch_num - 1) * batch_size as u32 + 1;
            let batch_end = batch_start + chunk.len() as u32 - 1;
            let progress_percent = (((batch_num * 100) / total_batches) as u8).min(100);

            on_progress(ProgressEvent::CrawlBatchStart {
                batch_num,
                total_batches,
                batch_start,
                batch_end,
                total_issues: total,
                progress_percent,
            });

            let futures = chunk.iter().map(|issue| self.fetch_one_detail(issue, &base_url));
            let outcomes = futures::future::join_all(futures).await;

            let mut batch_success = 0u32;
            let mut batch_fail = 0u32;
            for (issue, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(detailed) => {
                        batch_success += 1;
                        results.push(detailed);
                    }
                    Err(_) => {
                        batch_fail += 1;
                        results.push(issue.clone());
                    }
                }
            }
            crawled_count += chunk.len() as u32;

            on_progress(ProgressEvent::CrawlBatchComplete {
                batch_num,
                total_batches,
                batch_success,
                batch_fail,
                crawled_count,
                total_issues: total,
                progress_percent,
            });
        }

        on_progress(ProgressEvent::CrawlComplete {
            crawled_count,
            total_issues: total,
        });

        Ok(results)
    }

    async fn crawl_related_issues(
        &self,
        issue: &Issue,
        credentials: &UserCredentials,
        related_depth: u32,
    ) -> Result<Vec<Issue>> {
        if related_depth == 0 {
            return Ok(Vec::new());
        }
        let base_url = self.base_url(credentials);
        let mut out = Vec::new();
        for related_id in &issue.related_issue_ids {
            match self
                .fetch_one_detail(&Issue::from_search_row(&issue.user_id, related_id, None), &base_url)
                .await
            {
                Ok(detailed) => out.push(detailed),
                Err(e) => {
                    tracing::warn!(related_id, error = %e, "failed to crawl related issue");
                }
            }
        }
        Ok(out)
    }

    async fn close(&self) {
        *self.session.write().unwrap() = None;
        self.authenticated.store(false, Ordering::Relaxed);
    }
}

impl IMSCrawler {
    async fn fetch_one_detail(&self, fallback: &Issue, base_url: &str) -> Result<Issue> {
        let guard = self.session.read().unwrap();
        let session = guard
            .as_ref()
            .ok_or_else(|| AppError::Authentication("not authenticated".to_string()))?;
        let client = session.client.clone();
        drop(guard);

        let url = format!("{base_url}/tody/ims/issue/issueView.do");
        let resp = client
            .post(&url)
            .timeout(self.navigation_timeout)
            .form(&[("issueId", fallback.ims_id.as_str()), ("menuCode", "issue_search")])
            .send()
            .await?;
        let html = resp.text().await?;

        let mut parsed = detail::parse_issue_detail(&html, &fallback.ims_id, fallback);

        let related_ids = self.fetch_related_ids(&client, base_url, &fallback.ims_id, &html).await;
        parsed.related_issue_ids = related_ids;

        Ok(parsed)
    }

    async fn fetch_related_ids(
        &self,
        client: &Client,
        base_url: &str,
        ims_id: &str,
        detail_html: &str,
    ) -> Vec<String> {
        let api_url = format!("{base_url}/tody/ims/issue/findRelationIssues.do?issueId={ims_id}");
        let from_api = match client.get(&api_url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => related::parse_related_ids_json(&body),
                Err(_) => Vec::new(),
            },
            Err(_) => Vec::new(),
        };

        let from_patch = if let Some(params) = related::parse_patch_list_params(detail_html) {
            let patch_url = format!(
                "{base_url}/tody/ims/patch/patchList.do?projectCode={}&siteCode={}&productCode={}&projectName={}&siteName={}",
                params.project_code, params.site_code, params.product_code, params.project_name, params.site_name
            );
            match client.get(&patch_url).send().await {
                Ok(resp) => match resp.text().await {
                    Ok(body) => related::parse_patch_list_issue_ids(&body),
                    Err(_) => Vec::new(),
                },
                Err(_) => Vec::new(),
            }
        } else {
            Vec::new()
        };

        related::merge_related_ids(ims_id, from_api, from_patch)
    }
}

fn extract_hidden_input(html: &str, name: &str) -> Option<String> {
    use scraper::{Html, Selector};
    let doc = Html::parse_document(html);
    let selector = Selector::parse(&format!("input[name={name}]")).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod base_url_tests {
    use super::*;
    use crate::ports::credential_port::PlaintextDecryptor;
    use std::sync::Arc;

    fn crawler() -> IMSCrawler {
        IMSCrawler::new(Arc::new(PlaintextDecryptor), Duration::from_secs(1), Duration::from_secs(1), 10)
    }

    fn credentials(base_url: &str) -> UserCredentials {
        UserCredentials {
            user_id: "u1".to_string(),
            ims_base_url: base_url.to_string(),
            encrypted_username: vec![],
            encrypted_password: vec![],
            is_validated: false,
            last_validated_at: None,
            validation_error: None,
        }
    }

    #[test]
    fn strips_trailing_slash() {
        let crawler = crawler();
        assert_eq!(crawler.base_url(&credentials("https://ims.example.com/")), "https://ims.example.com");
    }

    #[test]
    fn falls_back_to_default_when_empty() {
        let crawler = crawler();
        assert_eq!(crawler.base_url(&credentials("")), "https://ims.tmaxsoft.com");
    }
}
