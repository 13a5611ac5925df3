use std::ops::Deref;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Pool};
use uuid::Uuid;

use crate::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UploadRecord {
    pub upload_id: Uuid,
    pub user_id: Uuid,
    pub upload_date: DateTime<Utc>,
    /// semicolon-joined relative file names
    pub files: String,
}

impl From<UploadRecord> for crate::model::Upload {
    fn from(value: UploadRecord) -> Self {
        Self {
            id: bazaar_common::model::UploadId(value.upload_id),
            user_id: bazaar_common::model::UserId(value.user_id),
            upload_date: value.upload_date,
            files: if value.files.is_empty() {
                Vec::new()
            } else {
                value.files.split(';').map(|s| s.to_string()).collect()
            },
        }
    }
}

#[async_trait]
pub trait UploadRepo {
    async fn create(&self, upload: &UploadRecord) -> Result<(), RepoError>;

    async fn get(&self, upload_id: &Uuid) -> Result<Option<UploadRecord>, RepoError>;

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<UploadRecord>, RepoError>;

    async fn delete(&self, upload_id: &Uuid) -> Result<(), RepoError>;
}

pub struct DbUploadRepo<DB: Database> {
    db_pool: Arc<Pool<DB>>,
}

impl<DB: Database> DbUploadRepo<DB> {
    pub fn new(db_pool: Arc<Pool<DB>>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UploadRepo for DbUploadRepo<sqlx::Postgres> {
    async fn create(&self, upload: &UploadRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO uploads (upload_id, user_id, upload_date, files) VALUES ($1, $2, $3, $4)",
        )
        .bind(upload.upload_id)
        .bind(upload.user_id)
        .bind(upload.upload_date)
        .bind(upload.files.clone())
        .execute(self.db_pool.deref())
        .await?;
        Ok(())
    }

    async fn get(&self, upload_id: &Uuid) -> Result<Option<UploadRecord>, RepoError> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, user_id, upload_date, files FROM uploads WHERE upload_id = $1",
        )
        .bind(upload_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<UploadRecord>, RepoError> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, user_id, upload_date, files FROM uploads WHERE user_id = $1 ORDER BY upload_date DESC",
        )
        .bind(user_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn delete(&self, upload_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM uploads WHERE upload_id = $1")
            .bind(upload_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UploadRepo for DbUploadRepo<sqlx::Sqlite> {
    async fn create(&self, upload: &UploadRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO uploads (upload_id, user_id, upload_date, files) VALUES ($1, $2, $3, $4)",
        )
        .bind(upload.upload_id)
        .bind(upload.user_id)
        .bind(upload.upload_date)
        .bind(upload.files.clone())
        .execute(self.db_pool.deref())
        .await?;
        Ok(())
    }

    async fn get(&self, upload_id: &Uuid) -> Result<Option<UploadRecord>, RepoError> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, user_id, upload_date, files FROM uploads WHERE upload_id = $1",
        )
        .bind(upload_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<UploadRecord>, RepoError> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT upload_id, user_id, upload_date, files FROM uploads WHERE user_id = $1 ORDER BY upload_date DESC",
        )
        .bind(user_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn delete(&self, upload_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM uploads WHERE upload_id = $1")
            .bind(upload_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }
}
