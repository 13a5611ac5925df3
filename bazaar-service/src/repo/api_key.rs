use std::ops::Deref;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Pool};
use uuid::Uuid;

use crate::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ApiKeyRecord {
    pub api_key_id: Uuid,
    pub name: String,
    pub prefix: String,
    /// hex-encoded sha256 of the secret; the secret itself is never stored
    pub secret_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ApiKeyRepo {
    async fn create(&self, key: &ApiKeyRecord, model_ids: &[Uuid]) -> Result<(), RepoError>;

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError>;

    async fn model_ids(&self, api_key_id: &Uuid) -> Result<Vec<Uuid>, RepoError>;

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<ApiKeyRecord>, RepoError>;

    /// Deletes the key only when it belongs to the given user; returns the
    /// affected row count.
    async fn delete(&self, api_key_id: &Uuid, user_id: &Uuid) -> Result<u64, RepoError>;
}

pub struct DbApiKeyRepo<DB: Database> {
    db_pool: Arc<Pool<DB>>,
}

impl<DB: Database> DbApiKeyRepo<DB> {
    pub fn new(db_pool: Arc<Pool<DB>>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ApiKeyRepo for DbApiKeyRepo<sqlx::Postgres> {
    async fn create(&self, key: &ApiKeyRecord, model_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;

        sqlx::query(
            r#"
              INSERT INTO api_keys
                (api_key_id, name, prefix, secret_hash, user_id, expires_at, created_at)
              VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(key.api_key_id)
        .bind(key.name.clone())
        .bind(key.prefix.clone())
        .bind(key.secret_hash.clone())
        .bind(key.user_id)
        .bind(key.expires_at)
        .bind(key.created_at)
        .execute(&mut *transaction)
        .await?;

        for model_id in model_ids {
            sqlx::query("INSERT INTO api_key_models (api_key_id, model_id) VALUES ($1, $2)")
                .bind(key.api_key_id)
                .bind(model_id)
                .execute(&mut *transaction)
                .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError> {
        sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT api_key_id, name, prefix, secret_hash, user_id, expires_at, created_at FROM api_keys WHERE prefix = $1",
        )
        .bind(prefix)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn model_ids(&self, api_key_id: &Uuid) -> Result<Vec<Uuid>, RepoError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT model_id FROM api_key_models WHERE api_key_id = $1")
                .bind(api_key_id)
                .fetch_all(self.db_pool.deref())
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<ApiKeyRecord>, RepoError> {
        sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT api_key_id, name, prefix, secret_hash, user_id, expires_at, created_at FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn delete(&self, api_key_id: &Uuid, user_id: &Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE api_key_id = $1 AND user_id = $2")
            .bind(api_key_id)
            .bind(user_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ApiKeyRepo for DbApiKeyRepo<sqlx::Sqlite> {
    async fn create(&self, key: &ApiKeyRecord, model_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;

        sqlx::query(
            r#"
              INSERT INTO api_keys
                (api_key_id, name, prefix, secret_hash, user_id, expires_at, created_at)
              VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(key.api_key_id)
        .bind(key.name.clone())
        .bind(key.prefix.clone())
        .bind(key.secret_hash.clone())
        .bind(key.user_id)
        .bind(key.expires_at)
        .bind(key.created_at)
        .execute(&mut *transaction)
        .await?;

        for model_id in model_ids {
            sqlx::query("INSERT INTO api_key_models (api_key_id, model_id) VALUES ($1, $2)")
                .bind(key.api_key_id)
                .bind(model_id)
                .execute(&mut *transaction)
                .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError> {
        sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT api_key_id, name, prefix, secret_hash, user_id, expires_at, created_at FROM api_keys WHERE prefix = $1",
        )
        .bind(prefix)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn model_ids(&self, api_key_id: &Uuid) -> Result<Vec<Uuid>, RepoError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT model_id FROM api_key_models WHERE api_key_id = $1")
                .bind(api_key_id)
                .fetch_all(self.db_pool.deref())
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<ApiKeyRecord>, RepoError> {
        sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT api_key_id, name, prefix, secret_hash, user_id, expires_at, created_at FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn delete(&self, api_key_id: &Uuid, user_id: &Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE api_key_id = $1 AND user_id = $2")
            .bind(api_key_id)
            .bind(user_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(result.rows_affected())
    }
}
