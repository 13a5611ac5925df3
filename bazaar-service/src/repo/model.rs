use std::ops::Deref;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Pool};
use uuid::Uuid;

use crate::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ModelRecord {
    pub model_id: Uuid,
    pub name: String,
    pub model_type: Option<String>,
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub access: String,
    pub default_permission: String,
    pub train_status: String,
    pub deploy_status: String,
    pub base_model_id: Option<Uuid>,
    pub published_date: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct ModelAttributeRecord {
    pub model_id: Uuid,
    pub key: String,
    pub value: String,
}

impl TryFrom<ModelRecord> for crate::model::Model {
    type Error = String;

    fn try_from(value: ModelRecord) -> Result<Self, Self::Error> {
        Ok(crate::model::Model {
            id: bazaar_common::model::ModelId(value.model_id),
            name: value.name,
            model_type: value
                .model_type
                .map(|t| t.parse())
                .transpose()
                .map_err(|e| format!("Invalid model type in DB: {e}"))?,
            owner_id: bazaar_common::model::UserId(value.owner_id),
            team_id: value.team_id.map(bazaar_common::model::TeamId),
            access: value
                .access
                .parse()
                .map_err(|e| format!("Invalid access in DB: {e}"))?,
            default_permission: value
                .default_permission
                .parse()
                .map_err(|e| format!("Invalid default permission in DB: {e}"))?,
            train_status: value
                .train_status
                .parse()
                .map_err(|e| format!("Invalid train status in DB: {e}"))?,
            deploy_status: value
                .deploy_status
                .parse()
                .map_err(|e| format!("Invalid deploy status in DB: {e}"))?,
            base_model_id: value.base_model_id.map(bazaar_common::model::ModelId),
            published_date: value.published_date,
            attributes: Vec::new(),
            dependencies: Vec::new(),
        })
    }
}

#[async_trait]
pub trait ModelRepo {
    /// Inserts the model row together with its attributes and dependency
    /// edges in a single transaction. Fails with `UniqueViolation` when the
    /// owner already has a model of the same name.
    async fn create(
        &self,
        model: &ModelRecord,
        attributes: &[ModelAttributeRecord],
        dependencies: &[Uuid],
    ) -> Result<(), RepoError>;

    async fn get(&self, model_id: &Uuid) -> Result<Option<ModelRecord>, RepoError>;

    async fn get_by_owner_and_name(
        &self,
        owner_id: &Uuid,
        name: &str,
    ) -> Result<Option<ModelRecord>, RepoError>;

    async fn list(&self) -> Result<Vec<ModelRecord>, RepoError>;

    async fn attributes(&self, model_id: &Uuid)
        -> Result<Vec<ModelAttributeRecord>, RepoError>;

    async fn upsert_attributes(
        &self,
        attributes: &[ModelAttributeRecord],
    ) -> Result<(), RepoError>;

    async fn dependencies(&self, model_id: &Uuid) -> Result<Vec<Uuid>, RepoError>;

    /// Models that directly depend on the given model.
    async fn dependents(&self, model_id: &Uuid) -> Result<Vec<ModelRecord>, RepoError>;

    async fn set_model_type(&self, model_id: &Uuid, model_type: &str) -> Result<(), RepoError>;

    async fn update_train_status(&self, model_id: &Uuid, status: &str) -> Result<(), RepoError>;

    async fn update_deploy_status(&self, model_id: &Uuid, status: &str)
        -> Result<(), RepoError>;

    /// Conditional update used by the reconciler: only flips the status when
    /// it still equals the previously read one. Returns the affected row
    /// count (0 when a callback got there first).
    async fn update_train_status_if(
        &self,
        model_id: &Uuid,
        status: &str,
        expected: &str,
    ) -> Result<u64, RepoError>;

    async fn update_deploy_status_if(
        &self,
        model_id: &Uuid,
        status: &str,
        expected: &str,
    ) -> Result<u64, RepoError>;

    async fn update_access(
        &self,
        model_id: &Uuid,
        access: &str,
        team_id: Option<Uuid>,
    ) -> Result<(), RepoError>;

    async fn update_default_permission(
        &self,
        model_id: &Uuid,
        default_permission: &str,
    ) -> Result<(), RepoError>;

    /// Models whose training started from the given base model and is still
    /// running; they block deletion of the base.
    async fn active_training_children_count(
        &self,
        base_model_id: &Uuid,
    ) -> Result<i64, RepoError>;

    /// All models in a transient lifecycle state the reconciler must check
    /// against the orchestrator.
    async fn in_lifecycle(&self) -> Result<Vec<ModelRecord>, RepoError>;

    async fn delete(&self, model_id: &Uuid) -> Result<(), RepoError>;
}

pub struct DbModelRepo<DB: Database> {
    db_pool: Arc<Pool<DB>>,
}

impl<DB: Database> DbModelRepo<DB> {
    pub fn new(db_pool: Arc<Pool<DB>>) -> Self {
        Self { db_pool }
    }
}

const MODEL_COLUMNS: &str = "model_id, name, model_type, owner_id, team_id, access, default_permission, train_status, deploy_status, base_model_id, published_date";

#[async_trait]
impl ModelRepo for DbModelRepo<sqlx::Postgres> {
    async fn create(
        &self,
        model: &ModelRecord,
        attributes: &[ModelAttributeRecord],
        dependencies: &[Uuid],
    ) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;

        sqlx::query(
            r#"
              INSERT INTO models
                (model_id, name, model_type, owner_id, team_id, access, default_permission, train_status, deploy_status, base_model_id, published_date)
              VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(model.model_id)
        .bind(model.name.clone())
        .bind(model.model_type.clone())
        .bind(model.owner_id)
        .bind(model.team_id)
        .bind(model.access.clone())
        .bind(model.default_permission.clone())
        .bind(model.train_status.clone())
        .bind(model.deploy_status.clone())
        .bind(model.base_model_id)
        .bind(model.published_date)
        .execute(&mut *transaction)
        .await?;

        for attribute in attributes {
            sqlx::query(
                "INSERT INTO model_attributes (model_id, key, value) VALUES ($1, $2, $3)",
            )
            .bind(attribute.model_id)
            .bind(attribute.key.clone())
            .bind(attribute.value.clone())
            .execute(&mut *transaction)
            .await?;
        }

        for dependency_id in dependencies {
            sqlx::query(
                "INSERT INTO model_dependencies (model_id, dependency_id) VALUES ($1, $2)",
            )
            .bind(model.model_id)
            .bind(dependency_id)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn get(&self, model_id: &Uuid) -> Result<Option<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE model_id = $1"
        ))
        .bind(model_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn get_by_owner_and_name(
        &self,
        owner_id: &Uuid,
        name: &str,
    ) -> Result<Option<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE owner_id = $1 AND name = $2"
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn list(&self) -> Result<Vec<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models ORDER BY published_date DESC"
        ))
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn attributes(
        &self,
        model_id: &Uuid,
    ) -> Result<Vec<ModelAttributeRecord>, RepoError> {
        sqlx::query_as::<_, ModelAttributeRecord>(
            "SELECT model_id, key, value FROM model_attributes WHERE model_id = $1 ORDER BY key",
        )
        .bind(model_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn upsert_attributes(
        &self,
        attributes: &[ModelAttributeRecord],
    ) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;
        for attribute in attributes {
            sqlx::query(
                r#"
                  INSERT INTO model_attributes (model_id, key, value)
                  VALUES ($1, $2, $3)
                  ON CONFLICT (model_id, key) DO UPDATE SET value = $3
                "#,
            )
            .bind(attribute.model_id)
            .bind(attribute.key.clone())
            .bind(attribute.value.clone())
            .execute(&mut *transaction)
            .await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    async fn dependencies(&self, model_id: &Uuid) -> Result<Vec<Uuid>, RepoError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT dependency_id FROM model_dependencies WHERE model_id = $1",
        )
        .bind(model_id)
        .fetch_all(self.db_pool.deref())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn dependents(&self, model_id: &Uuid) -> Result<Vec<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            r#"
              SELECT {MODEL_COLUMNS} FROM models
              WHERE model_id IN (SELECT model_id FROM model_dependencies WHERE dependency_id = $1)
            "#
        ))
        .bind(model_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn set_model_type(&self, model_id: &Uuid, model_type: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET model_type = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(model_type)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_train_status(&self, model_id: &Uuid, status: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET train_status = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(status)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_deploy_status(
        &self,
        model_id: &Uuid,
        status: &str,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET deploy_status = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(status)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_train_status_if(
        &self,
        model_id: &Uuid,
        status: &str,
        expected: &str,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("UPDATE models SET train_status = $2 WHERE model_id = $1 AND train_status = $3")
                .bind(model_id)
                .bind(status)
                .bind(expected)
                .execute(self.db_pool.deref())
                .await?;
        Ok(result.rows_affected())
    }

    async fn update_deploy_status_if(
        &self,
        model_id: &Uuid,
        status: &str,
        expected: &str,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("UPDATE models SET deploy_status = $2 WHERE model_id = $1 AND deploy_status = $3")
                .bind(model_id)
                .bind(status)
                .bind(expected)
                .execute(self.db_pool.deref())
                .await?;
        Ok(result.rows_affected())
    }

    async fn update_access(
        &self,
        model_id: &Uuid,
        access: &str,
        team_id: Option<Uuid>,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET access = $2, team_id = $3 WHERE model_id = $1")
            .bind(model_id)
            .bind(access)
            .bind(team_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_default_permission(
        &self,
        model_id: &Uuid,
        default_permission: &str,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET default_permission = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(default_permission)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn active_training_children_count(
        &self,
        base_model_id: &Uuid,
    ) -> Result<i64, RepoError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM models WHERE base_model_id = $1 AND train_status IN ('starting', 'in_progress')",
        )
        .bind(base_model_id)
        .fetch_one(self.db_pool.deref())
        .await?;
        Ok(count.0)
    }

    async fn in_lifecycle(&self) -> Result<Vec<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            r#"
              SELECT {MODEL_COLUMNS} FROM models
              WHERE train_status IN ('starting', 'in_progress')
                 OR deploy_status IN ('starting', 'in_progress', 'complete')
            "#
        ))
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn delete(&self, model_id: &Uuid) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;

        sqlx::query("DELETE FROM model_attributes WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM model_dependencies WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM job_logs WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM api_key_models WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM models WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ModelRepo for DbModelRepo<sqlx::Sqlite> {
    async fn create(
        &self,
        model: &ModelRecord,
        attributes: &[ModelAttributeRecord],
        dependencies: &[Uuid],
    ) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;

        sqlx::query(
            r#"
              INSERT INTO models
                (model_id, name, model_type, owner_id, team_id, access, default_permission, train_status, deploy_status, base_model_id, published_date)
              VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(model.model_id)
        .bind(model.name.clone())
        .bind(model.model_type.clone())
        .bind(model.owner_id)
        .bind(model.team_id)
        .bind(model.access.clone())
        .bind(model.default_permission.clone())
        .bind(model.train_status.clone())
        .bind(model.deploy_status.clone())
        .bind(model.base_model_id)
        .bind(model.published_date)
        .execute(&mut *transaction)
        .await?;

        for attribute in attributes {
            sqlx::query(
                "INSERT INTO model_attributes (model_id, key, value) VALUES ($1, $2, $3)",
            )
            .bind(attribute.model_id)
            .bind(attribute.key.clone())
            .bind(attribute.value.clone())
            .execute(&mut *transaction)
            .await?;
        }

        for dependency_id in dependencies {
            sqlx::query(
                "INSERT INTO model_dependencies (model_id, dependency_id) VALUES ($1, $2)",
            )
            .bind(model.model_id)
            .bind(dependency_id)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn get(&self, model_id: &Uuid) -> Result<Option<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE model_id = $1"
        ))
        .bind(model_id)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn get_by_owner_and_name(
        &self,
        owner_id: &Uuid,
        name: &str,
    ) -> Result<Option<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE owner_id = $1 AND name = $2"
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn list(&self) -> Result<Vec<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models ORDER BY published_date DESC"
        ))
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn attributes(
        &self,
        model_id: &Uuid,
    ) -> Result<Vec<ModelAttributeRecord>, RepoError> {
        sqlx::query_as::<_, ModelAttributeRecord>(
            "SELECT model_id, key, value FROM model_attributes WHERE model_id = $1 ORDER BY key",
        )
        .bind(model_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn upsert_attributes(
        &self,
        attributes: &[ModelAttributeRecord],
    ) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;
        for attribute in attributes {
            sqlx::query(
                r#"
                  INSERT INTO model_attributes (model_id, key, value)
                  VALUES ($1, $2, $3)
                  ON CONFLICT (model_id, key) DO UPDATE SET value = $3
                "#,
            )
            .bind(attribute.model_id)
            .bind(attribute.key.clone())
            .bind(attribute.value.clone())
            .execute(&mut *transaction)
            .await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    async fn dependencies(&self, model_id: &Uuid) -> Result<Vec<Uuid>, RepoError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT dependency_id FROM model_dependencies WHERE model_id = $1",
        )
        .bind(model_id)
        .fetch_all(self.db_pool.deref())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn dependents(&self, model_id: &Uuid) -> Result<Vec<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            r#"
              SELECT {MODEL_COLUMNS} FROM models
              WHERE model_id IN (SELECT model_id FROM model_dependencies WHERE dependency_id = $1)
            "#
        ))
        .bind(model_id)
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn set_model_type(&self, model_id: &Uuid, model_type: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET model_type = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(model_type)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_train_status(&self, model_id: &Uuid, status: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET train_status = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(status)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_deploy_status(
        &self,
        model_id: &Uuid,
        status: &str,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET deploy_status = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(status)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_train_status_if(
        &self,
        model_id: &Uuid,
        status: &str,
        expected: &str,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("UPDATE models SET train_status = $2 WHERE model_id = $1 AND train_status = $3")
                .bind(model_id)
                .bind(status)
                .bind(expected)
                .execute(self.db_pool.deref())
                .await?;
        Ok(result.rows_affected())
    }

    async fn update_deploy_status_if(
        &self,
        model_id: &Uuid,
        status: &str,
        expected: &str,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("UPDATE models SET deploy_status = $2 WHERE model_id = $1 AND deploy_status = $3")
                .bind(model_id)
                .bind(status)
                .bind(expected)
                .execute(self.db_pool.deref())
                .await?;
        Ok(result.rows_affected())
    }

    async fn update_access(
        &self,
        model_id: &Uuid,
        access: &str,
        team_id: Option<Uuid>,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET access = $2, team_id = $3 WHERE model_id = $1")
            .bind(model_id)
            .bind(access)
            .bind(team_id)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn update_default_permission(
        &self,
        model_id: &Uuid,
        default_permission: &str,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE models SET default_permission = $2 WHERE model_id = $1")
            .bind(model_id)
            .bind(default_permission)
            .execute(self.db_pool.deref())
            .await?;
        Ok(())
    }

    async fn active_training_children_count(
        &self,
        base_model_id: &Uuid,
    ) -> Result<i64, RepoError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM models WHERE base_model_id = $1 AND train_status IN ('starting', 'in_progress')",
        )
        .bind(base_model_id)
        .fetch_one(self.db_pool.deref())
        .await?;
        Ok(count.0)
    }

    async fn in_lifecycle(&self) -> Result<Vec<ModelRecord>, RepoError> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            r#"
              SELECT {MODEL_COLUMNS} FROM models
              WHERE train_status IN ('starting', 'in_progress')
                 OR deploy_status IN ('starting', 'in_progress', 'complete')
            "#
        ))
        .fetch_all(self.db_pool.deref())
        .await
        .map_err(|e| e.into())
    }

    async fn delete(&self, model_id: &Uuid) -> Result<(), RepoError> {
        let mut transaction = self.db_pool.begin().await?;

        sqlx::query("DELETE FROM model_attributes WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM model_dependencies WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM job_logs WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM api_key_models WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM models WHERE model_id = $1")
            .bind(model_id)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(())
    }
}
