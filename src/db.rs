//! Database bootstrap: mirrors the teacher's `db.rs` shape with the Tauri
//! app-handle argument replaced by a plain filesystem path.

use crate::error::Result;
use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

pub async fn init_db(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db directory: {}", parent.display()))?;
        }
    }

    let db_url = format!("sqlite://{path}?mode=rwc");
    info!(db_url = %db_url, "connecting to database");

    let pool = SqlitePoolOptions::new().connect(&db_url).await?;

    sqlx::migrate!().run(&pool).await?;
    info!("database initialized");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_db_creates_parent_dir_and_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ims_crawler.db");
        let pool = init_db(path.to_str().unwrap()).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM sqlite_master WHERE type = 'table'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(row.0 > 0);
    }
}
