use std::ops::Deref;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Pool};
use uuid::Uuid;

use crate::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for crate::model::User {
    fn from(value: UserRecord) -> Self {
        Self {
            id: bazaar_common::model::UserId(value.user_id),
            username: value.username,
            email: value.email,
            is_admin: value.is_admin,
            verified: value.verified,
        }
    }
}

#[async_trait]
pub trait UserRepo {
    async fn create(&self, user: &UserRecord) -> Result<(), RepoError>;

    async fn get(&self, user_id: &Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn list(&self) -> Result<Vec<UserRecord>, RepoError>;

    async fn set_admin(&self, user_id: &Uuid, is_admin: bool) -> Result<(), RepoError>;

    async fn set_verified(&self, user_id: &Uuid, verified: bool) -> Result<(), RepoError>;

    async fn admin_count(&self) -> Result<i64, RepoError>;

    async fn delete(&self, user_id: &Uuid) -> Result<(), RepoError>;
}

pub struct DbUserRepo<DB: Database> {
    db_pool: Arc<Pool<DB>>,
}

impl<DB: Database> DbUserRepo<DB> {
    pub fn new(db_pool: Arc<Pool<DB>>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserRepo for DbUserRepo<sqlx::Postgres> {
    async fn create(&self, user: &UserRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
              INSERT INTO users
                (user_id, username, email, password_hash, is_admin, verified, created_at)
              VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(user.username.clone())
        .bind(user.email.clone())
        .bind(user.password_hash.clone())
        .bind(user.is_admin)
        .bind(user.verified)
        .bind(user.created_at)
        .execute(self.db_pool.deref())
        .await?;

        Ok(())
    }

    async fn get(&self, user_id: &Uuid) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users ORDER BY username")
            .fetch_all(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn set_admin(&self, user_id: &Uuid, is_admin: bool) -> Result<(), RepoError> {
        sqlx::query("UPDATE users SET is_admin = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(is_admin)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn set_verified(&self, user_id: &Uuid, verified: bool) -> Result<(), RepoError> {
        sqlx::query("UPDATE users SET verified = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(verified)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn admin_count(&self) -> Result<i64, RepoError> {
        let count: (i64,) =
            sqlx::query_as("SELECT count(*) FROM users WHERE is_admin = TRUE")
                .fetch_one(self.db_pool.deref())
                .await?;
        Ok(count.0)
    }

    async fn delete(&self, user_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepo for DbUserRepo<sqlx::Sqlite> {
    async fn create(&self, user: &UserRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
              INSERT INTO users
                (user_id, username, email, password_hash, is_admin, verified, created_at)
              VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(user.username.clone())
        .bind(user.email.clone())
        .bind(user.password_hash.clone())
        .bind(user.is_admin)
        .bind(user.verified)
        .bind(user.created_at)
        .execute(self.db_pool.deref())
        .await?;

        Ok(())
    }

    async fn get(&self, user_id: &Uuid) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, username, email, password_hash, is_admin, verified, created_at FROM users ORDER BY username")
            .fetch_all(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn set_admin(&self, user_id: &Uuid, is_admin: bool) -> Result<(), RepoError> {
        sqlx::query("UPDATE users SET is_admin = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(is_admin)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn set_verified(&self, user_id: &Uuid, verified: bool) -> Result<(), RepoError> {
        sqlx::query("UPDATE users SET verified = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(verified)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn admin_count(&self) -> Result<i64, RepoError> {
        let count: (i64,) =
            sqlx::query_as("SELECT count(*) FROM users WHERE is_admin = TRUE")
                .fetch_one(self.db_pool.deref())
                .await?;
        Ok(count.0)
    }

    async fn delete(&self, user_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }
}
