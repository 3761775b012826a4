use crate::domain::models::UserCredentials;
use crate::error::Result;
use sqlx::SqlitePool;

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    user_id: String,
    ims_base_url: String,
    encrypted_username: Vec<u8>,
    encrypted_password: Vec<u8>,
    is_validated: i64,
    last_validated_at: Option<String>,
    validation_error: Option<String>,
}

impl From<CredentialsRow> for UserCredentials {
    fn from(row: CredentialsRow) -> Self {
        UserCredentials {
            user_id: row.user_id,
            ims_base_url: row.ims_base_url,
            encrypted_username: row.encrypted_username,
            encrypted_password: row.encrypted_password,
            is_validated: row.is_validated != 0,
            last_validated_at: row.last_validated_at.as_deref().map(super::parse_datetime),
            validation_error: row.validation_error,
        }
    }
}

/// Stores per-user IMS credentials, pre-encrypted by the caller. This
/// repository never sees plaintext and performs no encryption itself —
/// that boundary lives with whatever holds the machine-bound key.
#[derive(Clone)]
pub struct CredentialsRepository {
    pool: SqlitePool,
}

impl CredentialsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, creds: &UserCredentials) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ims_user_credentials (
                user_id, ims_base_url, encrypted_username, encrypted_password,
                is_validated, last_validated_at, validation_error
            ) VALUES (?,?,?,?,?,?,?)
            ON CONFLICT(user_id) DO UPDATE SET
                ims_base_url = excluded.ims_base_url,
                encrypted_username = excluded.encrypted_username,
                encrypted_password = excluded.encrypted_password,
                is_validated = excluded.is_validated,
                last_validated_at = excluded.last_validated_at,
                validation_error = excluded.validation_error
            "#,
        )
        .bind(&creds.user_id)
        .bind(&creds.ims_base_url)
        .bind(&creds.encrypted_username)
        .bind(&creds.encrypted_password)
        .bind(creds.is_validated as i64)
        .bind(creds.last_validated_at.map(|d| d.to_rfc3339()))
        .bind(&creds.validation_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT * FROM ims_user_credentials WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserCredentials::from))
    }

    pub async fn mark_validated(&self, user_id: &str, validated: bool, error: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE ims_user_credentials SET is_validated = ?, last_validated_at = ?, validation_error = ? \
             WHERE user_id = ?",
        )
        .bind(validated as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(error)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM ims_user_credentials WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;

    fn sample(user_id: &str) -> UserCredentials {
        UserCredentials {
            user_id: user_id.to_string(),
            ims_base_url: "https://ims.example.com".to_string(),
            encrypted_username: vec![1, 2, 3],
            encrypted_password: vec![4, 5, 6],
            is_validated: false,
            last_validated_at: None,
            validation_error: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips() {
        let pool = setup_test_db().await;
        let repo = CredentialsRepository::new(pool);
        repo.upsert(&sample("u1")).await.unwrap();

        let found = repo.find_by_user_id("u1").await.unwrap().unwrap();
        assert_eq!(found.ims_base_url, "https://ims.example.com");
        assert!(!found.is_validated);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_row() {
        let pool = setup_test_db().await;
        let repo = CredentialsRepository::new(pool);
        repo.upsert(&sample("u1")).await.unwrap();

        let mut updated = sample("u1");
        updated.ims_base_url = "https://ims2.example.com".to_string();
        repo.upsert(&updated).await.unwrap();

        let found = repo.find_by_user_id("u1").await.unwrap().unwrap();
        assert_eq!(found.ims_base_url, "https://ims2.example.com");
    }

    #[tokio::test]
    async fn mark_validated_updates_flag_and_timestamp() {
        let pool = setup_test_db().await;
        let repo = CredentialsRepository::new(pool);
        repo.upsert(&sample("u1")).await.unwrap();
        repo.mark_validated("u1", true, None).await.unwrap();

        let found = repo.find_by_user_id("u1").await.unwrap().unwrap();
        assert!(found.is_validated);
        assert!(found.last_validated_at.is_some());
    }
}
