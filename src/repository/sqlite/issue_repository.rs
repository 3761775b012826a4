use super::{parse_datetime, parse_datetime_opt};
use crate::domain::models::{Issue, IssuePriority, IssueStatus, RelationKind};
use crate::error::Result;
use crate::ports::EmbeddingPort;
use crate::retrieval::hybrid_search;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;

#[derive(sqlx::FromRow)]
struct IssueRow {
    id: i64,
    user_id: String,
    ims_id: String,
    title: String,
    description: String,
    status: String,
    priority: String,
    status_raw: Option<String>,
    priority_raw: Option<String>,
    category: Option<String>,
    product: Option<String>,
    version: Option<String>,
    module: Option<String>,
    customer: Option<String>,
    issued_date: Option<String>,
    reporter: Option<String>,
    assignee: Option<String>,
    project_key: Option<String>,
    issue_type: Option<String>,
    labels: String,
    comment_count: i64,
    attachment_count: i64,
    issue_details: Option<String>,
    action_log: Option<String>,
    related_issue_ids: String,
    source_url: Option<String>,
    crawled_at: String,
    custom_fields: String,
}

impl From<IssueRow> for Issue {
    fn from(row: IssueRow) -> Self {
        Issue {
            id: row.id,
            user_id: row.user_id,
            ims_id: row.ims_id,
            title: row.title,
            description: row.description,
            status: IssueStatus::from_str(&row.status).unwrap_or(IssueStatus::Open),
            priority: IssuePriority::from_str(&row.priority).unwrap_or(IssuePriority::Medium),
            status_raw: row.status_raw,
            priority_raw: row.priority_raw,
            category: row.category,
            product: row.product,
            version: row.version,
            module: row.module,
            customer: row.customer,
            issued_date: parse_datetime_opt(row.issued_date.as_deref()),
            reporter: row.reporter,
            assignee: row.assignee,
            project_key: row.project_key,
            issue_type: row.issue_type,
            labels: serde_json::from_str(&row.labels).unwrap_or_default(),
            comment_count: row.comment_count,
            attachment_count: row.attachment_count,
            issue_details: row.issue_details,
            action_log: row.action_log,
            related_issue_ids: serde_json::from_str(&row.related_issue_ids).unwrap_or_default(),
            source_url: row.source_url,
            crawled_at: parse_datetime(&row.crawled_at),
            custom_fields: serde_json::from_str(&row.custom_fields).unwrap_or(serde_json::Value::Null),
            hybrid_score: None,
            similarity_score: None,
        }
    }
}

/// Persists issues, embeddings, and relations for one or more users.
/// Grounded on the reference sqlite repository's upsert-by-natural-key
/// idiom, adapted from job rows to issue rows.
#[derive(Clone)]
pub struct IssueRepository {
    pool: SqlitePool,
}

impl IssueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upserts on `(user_id, ims_id)`; on conflict, updates every mutable
    /// column. Returns the internal id.
    pub async fn save(&self, issue: &Issue) -> Result<i64> {
        let labels = serde_json::to_string(&issue.labels).unwrap_or_else(|_| "[]".to_string());
        let related = serde_json::to_string(&issue.related_issue_ids).unwrap_or_else(|_| "[]".to_string());
        let custom_fields = issue.custom_fields.to_string();

        sqlx::query(
            r#"
            INSERT INTO ims_issues (
                user_id, ims_id, title, description, status, priority,
                status_raw, priority_raw, category, product, version, module,
                customer, issued_date, reporter, assignee, project_key,
                issue_type, labels, comment_count, attachment_count,
                issue_details, action_log, related_issue_ids, source_url,
                crawled_at, custom_fields
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(user_id, ims_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                priority = excluded.priority,
                status_raw = excluded.status_raw,
                priority_raw = excluded.priority_raw,
                category = excluded.category,
                product = excluded.product,
                version = excluded.version,
                module = excluded.module,
                customer = excluded.customer,
                issued_date = excluded.issued_date,
                reporter = excluded.reporter,
                assignee = excluded.assignee,
                project_key = excluded.project_key,
                issue_type = excluded.issue_type,
                labels = excluded.labels,
                comment_count = excluded.comment_count,
                attachment_count = excluded.attachment_count,
                issue_details = excluded.issue_details,
                action_log = excluded.action_log,
                related_issue_ids = excluded.related_issue_ids,
                source_url = excluded.source_url,
                crawled_at = excluded.crawled_at,
                custom_fields = excluded.custom_fields
            "#,
        )
        .bind(&issue.user_id)
        .bind(&issue.ims_id)
        .bind(&issue.title)
        .bind(&issue.description)
        .bind(issue.status.as_str())
        .bind(issue.priority.as_str())
        .bind(&issue.status_raw)
        .bind(&issue.priority_raw)
        .bind(&issue.category)
        .bind(&issue.product)
        .bind(&issue.version)
        .bind(&issue.module)
        .bind(&issue.customer)
        .bind(issue.issued_date.map(|d| d.to_rfc3339()))
        .bind(&issue.reporter)
        .bind(&issue.assignee)
        .bind(&issue.project_key)
        .bind(&issue.issue_type)
        .bind(&labels)
        .bind(issue.comment_count)
        .bind(issue.attachment_count)
        .bind(&issue.issue_details)
        .bind(&issue.action_log)
        .bind(&related)
        .bind(&issue.source_url)
        .bind(issue.crawled_at.to_rfc3339())
        .bind(&custom_fields)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id FROM ims_issues WHERE user_id = ? AND ims_id = ?")
            .bind(&issue.user_id)
            .bind(&issue.ims_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Upserts on `issue_id`; replaces the vector and snapshot text on
    /// conflict. Vectors are serialized as little-endian f32 BLOBs, SQLite's
    /// closest native representation.
    pub async fn save_embedding(&self, issue_id: i64, vector: &[f32], text: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        sqlx::query(
            r#"
            INSERT INTO ims_issue_embeddings (issue_id, embedding, embedded_text)
            VALUES (?, ?, ?)
            ON CONFLICT(issue_id) DO UPDATE SET
                embedding = excluded.embedding,
                embedded_text = excluded.embedded_text
            "#,
        )
        .bind(issue_id)
        .bind(bytes)
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_relation(&self, source_id: i64, target_id: i64, kind: RelationKind) -> Result<()> {
        sqlx::query(
            "INSERT INTO ims_issue_relations (source_id, target_id, relation_type) VALUES (?, ?, ?) \
             ON CONFLICT(source_id, target_id, relation_type) DO NOTHING",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Issue>> {
        let row = sqlx::query_as::<_, IssueRow>("SELECT * FROM ims_issues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Issue::from))
    }

    pub async fn find_by_user_id(&self, user_id: &str, limit: i64) -> Result<Vec<Issue>> {
        let rows = sqlx::query_as::<_, IssueRow>(
            "SELECT * FROM ims_issues WHERE user_id = ? ORDER BY crawled_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Issue::from).collect())
    }

    /// Nearest-neighbor search over cosine similarity, computed in Rust
    /// since SQLite has no native vector operator. Candidates are the
    /// user's full embedded set; `similarity_score = 1 - cosine_distance`
    /// is attached to each result.
    pub async fn search_by_vector(&self, vector: &[f32], user_id: &str, limit: i64) -> Result<Vec<Issue>> {
        let rows = sqlx::query(
            r#"
            SELECT i.*, e.embedding as emb
            FROM ims_issues i
            JOIN ims_issue_embeddings e ON e.issue_id = i.id
            WHERE i.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, Issue)> = Vec::with_capacity(rows.len());
        for row in rows {
            let issue_row = IssueRow {
                id: row.get("id"),
                user_id: row.get("user_id"),
                ims_id: row.get("ims_id"),
                title: row.get("title"),
                description: row.get("description"),
                status: row.get("status"),
                priority: row.get("priority"),
                status_raw: row.get("status_raw"),
                priority_raw: row.get("priority_raw"),
                category: row.get("category"),
                product: row.get("product"),
                version: row.get("version"),
                module: row.get("module"),
                customer: row.get("customer"),
                issued_date: row.get("issued_date"),
                reporter: row.get("reporter"),
                assignee: row.get("assignee"),
                project_key: row.get("project_key"),
                issue_type: row.get("issue_type"),
                labels: row.get("labels"),
                comment_count: row.get("comment_count"),
                attachment_count: row.get("attachment_count"),
                issue_details: row.get("issue_details"),
                action_log: row.get("action_log"),
                related_issue_ids: row.get("related_issue_ids"),
                source_url: row.get("source_url"),
                crawled_at: row.get("crawled_at"),
                custom_fields: row.get("custom_fields"),
            };
            let emb_bytes: Vec<u8> = row.get("emb");
            let candidate_vector = bytes_to_f32(&emb_bytes);
            let similarity = cosine_similarity(vector, &candidate_vector);
            let mut issue: Issue = issue_row.into();
            issue.similarity_score = Some(similarity);
            scored.push((similarity, issue));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit.max(0) as usize);
        Ok(scored.into_iter().map(|(_, i)| i).collect())
    }

    /// Retrieves a broader candidate set than `limit` for downstream hybrid
    /// ranking, alongside the embedded text and vector saved for each one;
    /// the actual ranking is delegated to the retrieval module.
    async fn find_candidates_for_hybrid(&self, user_id: &str, candidate_limit: i64) -> Result<(Vec<Issue>, Vec<String>, Vec<Vec<f32>>)> {
        let rows = sqlx::query(
            r#"
            SELECT i.*, e.embedding as emb, e.embedded_text as embedded_text
            FROM ims_issues i
            JOIN ims_issue_embeddings e ON e.issue_id = i.id
            WHERE i.user_id = ?
            ORDER BY i.crawled_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(candidate_limit)
        .fetch_all(&self.pool)
        .await?;

        let mut issues = Vec::with_capacity(rows.len());
        let mut texts = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let issue_row = IssueRow {
                id: row.get("id"),
                user_id: row.get("user_id"),
                ims_id: row.get("ims_id"),
                title: row.get("title"),
                description: row.get("description"),
                status: row.get("status"),
                priority: row.get("priority"),
                status_raw: row.get("status_raw"),
                priority_raw: row.get("priority_raw"),
                category: row.get("category"),
                product: row.get("product"),
                version: row.get("version"),
                module: row.get("module"),
                customer: row.get("customer"),
                issued_date: row.get("issued_date"),
                reporter: row.get("reporter"),
                assignee: row.get("assignee"),
                project_key: row.get("project_key"),
                issue_type: row.get("issue_type"),
                labels: row.get("labels"),
                comment_count: row.get("comment_count"),
                attachment_count: row.get("attachment_count"),
                issue_details: row.get("issue_details"),
                action_log: row.get("action_log"),
                related_issue_ids: row.get("related_issue_ids"),
                source_url: row.get("source_url"),
                crawled_at: row.get("crawled_at"),
                custom_fields: row.get("custom_fields"),
            };
            let emb_bytes: Vec<u8> = row.get("emb");
            let embedded_text: String = row.get("embedded_text");
            texts.push(embedded_text);
            vectors.push(bytes_to_f32(&emb_bytes));
            issues.push(Issue::from(issue_row));
        }
        Ok((issues, texts, vectors))
    }

    /// Hybrid (BM25 + cosine) search over a user's embedded issues: fetches
    /// `candidate_limit` candidates, embeds `query` via `embedding`, scores
    /// the candidates with `retrieval::hybrid_search`, and returns the top
    /// `limit` issues with `hybrid_score` populated.
    pub async fn search_hybrid(
        &self,
        query: &str,
        user_id: &str,
        limit: i64,
        candidate_limit: i64,
        embedding: &dyn EmbeddingPort,
    ) -> Result<Vec<Issue>> {
        let (issues, texts, vectors) = self.find_candidates_for_hybrid(user_id, candidate_limit).await?;
        if issues.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = embedding.embed_text(query).await?;
        let scored = hybrid_search(query, &texts, &query_vector, &vectors);

        let mut issues: Vec<Option<Issue>> = issues.into_iter().map(Some).collect();
        let mut results = Vec::with_capacity(limit.max(0) as usize);
        for candidate in scored.into_iter().take(limit.max(0) as usize) {
            if let Some(mut issue) = issues[candidate.index].take() {
                issue.hybrid_score = Some(candidate.hybrid);
                issue.similarity_score = Some(candidate.semantic);
                results.push(issue);
            }
        }
        Ok(results)
    }

    pub async fn get_embedded_ims_ids(&self, user_id: &str, ims_ids: &[String]) -> Result<HashSet<String>> {
        if ims_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let placeholders = ims_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT i.ims_id FROM ims_issues i JOIN ims_issue_embeddings e ON e.issue_id = i.id \
             WHERE i.user_id = ? AND i.ims_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(user_id);
        for id in ims_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("ims_id")).collect())
    }

    pub async fn find_by_ids_with_details(&self, ids: &[i64], user_id: &str) -> Result<Vec<Issue>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM ims_issues WHERE user_id = ? AND id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, IssueRow>(&sql).bind(user_id);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Issue::from).collect())
    }
}

fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;

    #[tokio::test]
    async fn save_upserts_on_user_and_ims_id() {
        let pool = setup_test_db().await;
        let repo = IssueRepository::new(pool);
        let mut issue = Issue::from_search_row("u1", "1001", Some("First title".into()));
        let id1 = repo.save(&issue).await.unwrap();

        issue.title = "Updated title".into();
        let id2 = repo.save(&issue).await.unwrap();
        assert_eq!(id1, id2);

        let fetched = repo.find_by_id(id1).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Updated title");
    }

    #[tokio::test]
    async fn save_relation_is_idempotent() {
        let pool = setup_test_db().await;
        let repo = IssueRepository::new(pool);
        let a = repo.save(&Issue::from_search_row("u1", "1", None)).await.unwrap();
        let b = repo.save(&Issue::from_search_row("u1", "2", None)).await.unwrap();

        repo.save_relation(a, b, RelationKind::RelatesTo).await.unwrap();
        repo.save_relation(a, b, RelationKind::RelatesTo).await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) as c FROM ims_issue_relations")
            .fetch_one(&repo.pool)
            .await
            .unwrap()
            .get("c");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn search_by_vector_ranks_closest_first() {
        let pool = setup_test_db().await;
        let repo = IssueRepository::new(pool);
        let id_a = repo.save(&Issue::from_search_row("u1", "a", None)).await.unwrap();
        let id_b = repo.save(&Issue::from_search_row("u1", "b", None)).await.unwrap();

        repo.save_embedding(id_a, &[1.0, 0.0], "a").await.unwrap();
        repo.save_embedding(id_b, &[0.0, 1.0], "b").await.unwrap();

        let results = repo.search_by_vector(&[1.0, 0.0], "u1", 5).await.unwrap();
        assert_eq!(results[0].ims_id, "a");
    }
}
