use std::ops::Deref;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Pool};
use uuid::Uuid;

use crate::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TeamRecord {
    pub team_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<TeamRecord> for crate::model::Team {
    fn from(value: TeamRecord) -> Self {
        Self {
            id: bazaar_common::model::TeamId(value.team_id),
            name: value.name,
        }
    }
}

/// Membership row joined with the member's user row.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TeamMemberRecord {
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub is_team_admin: bool,
}

impl From<TeamMemberRecord> for crate::model::TeamMember {
    fn from(value: TeamMemberRecord) -> Self {
        Self {
            user_id: bazaar_common::model::UserId(value.user_id),
            username: value.username,
            email: value.email,
            is_team_admin: value.is_team_admin,
        }
    }
}

/// Membership row joined with the team row, for a single user.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TeamMembershipRecord {
    pub team_id: Uuid,
    pub name: String,
    pub is_team_admin: bool,
}

impl From<TeamMembershipRecord> for crate::model::TeamMembership {
    fn from(value: TeamMembershipRecord) -> Self {
        Self {
            team_id: bazaar_common::model::TeamId(value.team_id),
            team_name: value.name,
            is_team_admin: value.is_team_admin,
        }
    }
}

#[async_trait]
pub trait TeamRepo {
    async fn create(&self, team: &TeamRecord) -> Result<(), RepoError>;

    async fn get(&self, team_id: &Uuid) -> Result<Option<TeamRecord>, RepoError>;

    async fn list(&self) -> Result<Vec<TeamRecord>, RepoError>;

    async fn delete(&self, team_id: &Uuid) -> Result<(), RepoError>;

    async fn upsert_member(
        &self,
        team_id: &Uuid,
        user_id: &Uuid,
        is_team_admin: bool,
    ) -> Result<(), RepoError>;

    async fn remove_member(&self, team_id: &Uuid, user_id: &Uuid) -> Result<(), RepoError>;

    async fn get_member(
        &self,
        team_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<TeamMemberRecord>, RepoError>;

    async fn members(&self, team_id: &Uuid) -> Result<Vec<TeamMemberRecord>, RepoError>;

    async fn memberships(&self, user_id: &Uuid) -> Result<Vec<TeamMembershipRecord>, RepoError>;

    async fn admin_count(&self, team_id: &Uuid) -> Result<i64, RepoError>;
}

pub struct DbTeamRepo<DB: Database> {
    db_pool: Arc<Pool<DB>>,
}

impl<DB: Database> DbTeamRepo<DB> {
    pub fn new(db_pool: Arc<Pool<DB>>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl TeamRepo for DbTeamRepo<sqlx::Postgres> {
    async fn create(&self, team: &TeamRecord) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO teams (team_id, name, created_at) VALUES ($1, $2, $3)")
            .bind(team.team_id)
            .bind(team.name.clone())
            .bind(team.created_at)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn get(&self, team_id: &Uuid) -> Result<Option<TeamRecord>, RepoError> {
        sqlx::query_as::<_, TeamRecord>(
            "SELECT team_id, name, created_at FROM teams WHERE team_id = $1",
        )
        .bind(team_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn list(&self) -> Result<Vec<TeamRecord>, RepoError> {
        sqlx::query_as::<_, TeamRecord>("SELECT team_id, name, created_at FROM teams ORDER BY name")
            .fetch_all(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn delete(&self, team_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM teams WHERE team_id = $1")
            .bind(team_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn upsert_member(
        &self,
        team_id: &Uuid,
        user_id: &Uuid,
        is_team_admin: bool,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
              INSERT INTO team_members (team_id, user_id, is_team_admin)
              VALUES ($1, $2, $3)
              ON CONFLICT (team_id, user_id) DO UPDATE
              SET is_team_admin = $3
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .bind(is_team_admin)
        .execute(self.db_pool.deref())
        .await?;
        Ok(())
    }

    async fn remove_member(&self, team_id: &Uuid, user_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn get_member(
        &self,
        team_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<TeamMemberRecord>, RepoError> {
        sqlx::query_as::<_, TeamMemberRecord>(
            r#"
              SELECT tm.team_id, tm.user_id, u.username, u.email, tm.is_team_admin
              FROM team_members tm
              JOIN users u ON u.user_id = tm.user_id
              WHERE tm.team_id = $1 AND tm.user_id = $2
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn members(&self, team_id: &Uuid) -> Result<Vec<TeamMemberRecord>, RepoError> {
        sqlx::query_as::<_, TeamMemberRecord>(
            r#"
              SELECT tm.team_id, tm.user_id, u.username, u.email, tm.is_team_admin
              FROM team_members tm
              JOIN users u ON u.user_id = tm.user_id
              WHERE tm.team_id = $1
              ORDER BY u.username
            "#,
        )
        .bind(team_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn memberships(&self, user_id: &Uuid) -> Result<Vec<TeamMembershipRecord>, RepoError> {
        sqlx::query_as::<_, TeamMembershipRecord>(
            r#"
              SELECT tm.team_id, t.name, tm.is_team_admin
              FROM team_members tm
              JOIN teams t ON t.team_id = tm.team_id
              WHERE tm.user_id = $1
              ORDER BY t.name
            "#,
        )
        .bind(user_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn admin_count(&self, team_id: &Uuid) -> Result<i64, RepoError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM team_members WHERE team_id = $1 AND is_team_admin = TRUE",
        )
        .bind(team_id)
        .fetch_one(self.db_pool.deref())
        .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl TeamRepo for DbTeamRepo<sqlx::Sqlite> {
    async fn create(&self, team: &TeamRecord) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO teams (team_id, name, created_at) VALUES ($1, $2, $3)")
            .bind(team.team_id)
            .bind(team.name.clone())
            .bind(team.created_at)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn get(&self, team_id: &Uuid) -> Result<Option<TeamRecord>, RepoError> {
        sqlx::query_as::<_, TeamRecord>(
            "SELECT team_id, name, created_at FROM teams WHERE team_id = $1",
        )
        .bind(team_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn list(&self) -> Result<Vec<TeamRecord>, RepoError> {
        sqlx::query_as::<_, TeamRecord>("SELECT team_id, name, created_at FROM teams ORDER BY name")
            .fetch_all(self.db_pool.deref())
            .await
            .map_err(|e| e.into())
    }

    async fn delete(&self, team_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM teams WHERE team_id = $1")
            .bind(team_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn upsert_member(
        &self,
        team_id: &Uuid,
        user_id: &Uuid,
        is_team_admin: bool,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
              INSERT INTO team_members (team_id, user_id, is_team_admin)
              VALUES ($1, $2, $3)
              ON CONFLICT (team_id, user_id) DO UPDATE
              SET is_team_admin = $3
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .bind(is_team_admin)
        .execute(self.db_pool.deref())
        .await?;
        Ok(())
    }

    async fn remove_member(&self, team_id: &Uuid, user_id: &Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn get_member(
        &self,
        team_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<TeamMemberRecord>, RepoError> {
        sqlx::query_as::<_, TeamMemberRecord>(
            r#"
              SELECT tm.team_id, tm.user_id, u.username, u.email, tm.is_team_admin
              FROM team_members tm
              JOIN users u ON u.user_id = tm.user_id
              WHERE tm.team_id = $1 AND tm.user_id = $2
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn members(&self, team_id: &Uuid) -> Result<Vec<TeamMemberRecord>, RepoError> {
        sqlx::query_as::<_, TeamMemberRecord>(
            r#"
              SELECT tm.team_id, tm.user_id, u.username, u.email, tm.is_team_admin
              FROM team_members tm
              JOIN users u ON u.user_id = tm.user_id
              WHERE tm.team_id = $1
              ORDER BY u.username
            "#,
        )
        .bind(team_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn memberships(&self, user_id: &Uuid) -> Result<Vec<TeamMembershipRecord>, RepoError> {
        sqlx::query_as::<_, TeamMembershipRecord>(
            r#"
              SELECT tm.team_id, t.name, tm.is_team_admin
              FROM team_members tm
              JOIN teams t ON t.team_id = tm.team_id
              WHERE tm.user_id = $1
              ORDER BY t.name
            "#,
        )
        .bind(user_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn admin_count(&self, team_id: &Uuid) -> Result<i64, RepoError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM team_members WHERE team_id = $1 AND is_team_admin = TRUE",
        )
        .bind(team_id)
        .fetch_one(self.db_pool.deref())
        .await?;
        Ok(count.0)
    }
}
