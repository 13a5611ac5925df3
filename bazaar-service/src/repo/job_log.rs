use std::ops::Deref;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Pool};
use uuid::Uuid;

use crate::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct JobLogRecord {
    pub id: i64,
    pub model_id: Uuid,
    pub job: String,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJobLogRecord {
    pub model_id: Uuid,
    pub job: String,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobLogRepo {
    async fn insert(&self, log: &NewJobLogRecord) -> Result<(), RepoError>;

    /// Logs of the given job kind across a set of models (a model plus its
    /// transitive dependencies), oldest first.
    async fn for_models(
        &self,
        model_ids: Vec<Uuid>,
        job: &str,
    ) -> Result<Vec<JobLogRecord>, RepoError>;
}

pub struct DbJobLogRepo<DB: Database> {
    db_pool: Arc<Pool<DB>>,
}

impl<DB: Database> DbJobLogRepo<DB> {
    pub fn new(db_pool: Arc<Pool<DB>>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl JobLogRepo for DbJobLogRepo<sqlx::Postgres> {
    async fn insert(&self, log: &NewJobLogRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO job_logs (model_id, job, level, message, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(log.model_id)
        .bind(log.job.clone())
        .bind(log.level.clone())
        .bind(log.message.clone())
        .bind(log.created_at)
        .execute(self.db_pool.deref())
        .await?;
        Ok(())
    }

    async fn for_models(
        &self,
        model_ids: Vec<Uuid>,
        job: &str,
    ) -> Result<Vec<JobLogRecord>, RepoError> {
        if model_ids.is_empty() {
            return Ok(Vec::new());
        }

        let params = (2..=model_ids.len() + 1)
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let query_str = format!(
            "SELECT id, model_id, job, level, message, created_at FROM job_logs WHERE job = $1 AND model_id IN ( {} ) ORDER BY id",
            params
        );

        let mut query = sqlx::query_as::<_, JobLogRecord>(&query_str).bind(job);
        for id in model_ids {
            query = query.bind(id);
        }

        query
            .fetch_all(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }
}

#[async_trait]
impl JobLogRepo for DbJobLogRepo<sqlx::Sqlite> {
    async fn insert(&self, log: &NewJobLogRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO job_logs (model_id, job, level, message, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(log.model_id)
        .bind(log.job.clone())
        .bind(log.level.clone())
        .bind(log.message.clone())
        .bind(log.created_at)
        .execute(self.db_pool.deref())
        .await?;
        Ok(())
    }

    async fn for_models(
        &self,
        model_ids: Vec<Uuid>,
        job: &str,
    ) -> Result<Vec<JobLogRecord>, RepoError> {
        if model_ids.is_empty() {
            return Ok(Vec::new());
        }

        let params = (2..=model_ids.len() + 1)
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let query_str = format!(
            "SELECT id, model_id, job, level, message, created_at FROM job_logs WHERE job = $1 AND model_id IN ( {} ) ORDER BY id",
            params
        );

        let mut query = sqlx::query_as::<_, JobLogRecord>(&query_str).bind(job);
        for id in model_ids {
            query = query.bind(id);
        }

        query
            .fetch_all(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }
}
