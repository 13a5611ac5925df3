// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bazaar_common::model::*;
use bazaar_service_base::storage::blob::{BlobNamespace, BlobStorage};
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::model::*;
use crate::repo::model::{ModelAttributeRecord, ModelRecord, ModelRepo};
use crate::service::model::{ModelService, MODEL_DIR};
use crate::service::permission::PermissionService;
use crate::service::ModelServiceError;

pub const KNOWLEDGE_DB_FILE: &str = "knowledge.db";

/// Composes existing models into enterprise-search and
/// knowledge-extraction aggregates. Workflows never train; their
/// `train_status` is `complete` from the start.
pub struct WorkflowService {
    model_repo: Arc<dyn ModelRepo + Sync + Send>,
    blob_storage: Arc<dyn BlobStorage>,
    permission_service: Arc<PermissionService>,
    model_service: Arc<ModelService>,
    llm_providers: Vec<String>,
}

impl WorkflowService {
    pub fn new(
        model_repo: Arc<dyn ModelRepo + Sync + Send>,
        blob_storage: Arc<dyn BlobStorage>,
        permission_service: Arc<PermissionService>,
        model_service: Arc<ModelService>,
        llm_providers: Vec<String>,
    ) -> Self {
        Self {
            model_repo,
            blob_storage,
            permission_service,
            model_service,
            llm_providers,
        }
    }

    async fn require_component(
        &self,
        user: &User,
        model_id: &ModelId,
        expected_type: ModelType,
        role: &str,
    ) -> Result<ModelRecord, ModelServiceError> {
        let record = self
            .permission_service
            .require(user, model_id, ModelPermission::Read)
            .await?;
        if record.model_type.as_deref() != Some(expected_type.to_string().as_str()) {
            return Err(ModelServiceError::ArgValidation(vec![format!(
                "{role} model {model_id} must have type {expected_type}"
            )]));
        }
        Ok(record)
    }

    async fn create_composite(
        &self,
        user: &User,
        name: &str,
        model_type: ModelType,
        attributes: Vec<(String, String)>,
        dependencies: Vec<Uuid>,
    ) -> Result<Model, ModelServiceError> {
        let model_id = ModelId::new_v4();
        let record = ModelRecord {
            model_id: model_id.0,
            name: name.to_string(),
            model_type: Some(model_type.to_string()),
            owner_id: user.id.0,
            team_id: None,
            access: ModelAccess::Private.to_string(),
            default_permission: DefaultPermission::Read.to_string(),
            train_status: ModelStatus::Complete.to_string(),
            deploy_status: ModelStatus::NotStarted.to_string(),
            base_model_id: None,
            published_date: Utc::now(),
        };
        let attributes: Vec<ModelAttributeRecord> = attributes
            .into_iter()
            .map(|(key, value)| ModelAttributeRecord {
                model_id: model_id.0,
                key,
                value,
            })
            .collect();

        match self
            .model_repo
            .create(&record, &attributes, &dependencies)
            .await
        {
            Ok(()) => {}
            Err(bazaar_service_base::repo::RepoError::UniqueViolation(_)) => {
                return Err(ModelServiceError::DuplicateModelName(name.to_string()))
            }
            Err(other) => return Err(other.into()),
        }

        info!(model_id = %model_id, model_type = %model_type, "Created workflow model");
        let record = self.model_service.expect_model(&model_id).await?;
        self.model_service.to_model(record).await
    }

    /// Bundles a retrieval model with an optional guardrail and classifier
    /// under one permission surface.
    pub async fn enterprise_search(
        &self,
        user: &User,
        request: &EnterpriseSearchRequest,
    ) -> Result<Model, ModelServiceError> {
        if request.model_name.trim().is_empty() {
            return Err(ModelServiceError::ArgValidation(vec![
                "modelName must not be empty".to_string(),
            ]));
        }

        self.require_component(user, &request.retrieval_id, ModelType::Ndb, "retrieval")
            .await?;

        let mut attributes = vec![("retrieval_id".to_string(), request.retrieval_id.to_string())];
        let mut dependencies = vec![request.retrieval_id.0];

        if let Some(guardrail_id) = &request.guardrail_id {
            self.require_component(user, guardrail_id, ModelType::NlpToken, "guardrail")
                .await?;
            attributes.push(("guardrail_id".to_string(), guardrail_id.to_string()));
            dependencies.push(guardrail_id.0);
        }

        if let Some(classifier_id) = &request.classifier_id {
            self.require_component(user, classifier_id, ModelType::NlpText, "classifier")
                .await?;
            attributes.push(("classifier_id".to_string(), classifier_id.to_string()));
            dependencies.push(classifier_id.0);
        }

        self.create_composite(
            user,
            &request.model_name,
            ModelType::EnterpriseSearch,
            attributes,
            dependencies,
        )
        .await
    }

    /// Persists the question/keyword catalogue as an embedded SQLite store
    /// inside the new model's blob arena.
    pub async fn knowledge_extraction(
        &self,
        user: &User,
        request: &KnowledgeExtractionRequest,
    ) -> Result<Model, ModelServiceError> {
        let mut errors = Vec::new();
        if request.model_name.trim().is_empty() {
            errors.push("modelName must not be empty".to_string());
        }
        if request.questions.is_empty() {
            errors.push("at least one question is required".to_string());
        }

        let mut seen: HashSet<String> = HashSet::new();
        for question in &request.questions {
            let text = question.question.trim();
            if text.is_empty() {
                errors.push("questions must not be empty".to_string());
                continue;
            }
            if !seen.insert(text.to_lowercase()) {
                errors.push(format!("duplicate question: {text}"));
            }
        }

        let llm_provider = request
            .llm_provider
            .clone()
            .unwrap_or_else(|| "on-prem".to_string());
        if llm_provider != "on-prem" && !self.llm_providers.contains(&llm_provider) {
            errors.push(format!(
                "no API key configured for llm provider {llm_provider}"
            ));
        }

        if !errors.is_empty() {
            return Err(ModelServiceError::ArgValidation(errors));
        }

        let model_id = ModelId::new_v4();
        let knowledge_db = self.build_knowledge_db(&request.questions).await?;
        self.blob_storage
            .put(
                BlobNamespace::Model(model_id),
                &Path::new(MODEL_DIR).join(KNOWLEDGE_DB_FILE),
                &knowledge_db,
            )
            .await?;

        // the row is created after the arena content so a failed build
        // never leaves a committed model without its store
        let record = ModelRecord {
            model_id: model_id.0,
            name: request.model_name.clone(),
            model_type: Some(ModelType::KnowledgeExtraction.to_string()),
            owner_id: user.id.0,
            team_id: None,
            access: ModelAccess::Private.to_string(),
            default_permission: DefaultPermission::Read.to_string(),
            train_status: ModelStatus::Complete.to_string(),
            deploy_status: ModelStatus::NotStarted.to_string(),
            base_model_id: None,
            published_date: Utc::now(),
        };
        let attributes = vec![ModelAttributeRecord {
            model_id: model_id.0,
            key: "llm_provider".to_string(),
            value: llm_provider,
        }];

        match self.model_repo.create(&record, &attributes, &[]).await {
            Ok(()) => {}
            Err(bazaar_service_base::repo::RepoError::UniqueViolation(_)) => {
                self.blob_storage
                    .delete_namespace(BlobNamespace::Model(model_id))
                    .await?;
                return Err(ModelServiceError::DuplicateModelName(
                    request.model_name.clone(),
                ));
            }
            Err(other) => return Err(other.into()),
        }

        info!(model_id = %model_id, "Created knowledge extraction model");
        let record = self.model_service.expect_model(&model_id).await?;
        self.model_service.to_model(record).await
    }

    async fn build_knowledge_db(
        &self,
        questions: &[KnowledgeQuestion],
    ) -> Result<Vec<u8>, ModelServiceError> {
        let dir = tempfile::tempdir()
            .map_err(|e| ModelServiceError::Internal(e.to_string()))?;
        let path = dir.path().join(KNOWLEDGE_DB_FILE);

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| ModelServiceError::Internal(e.to_string()))?;

        sqlx::query("CREATE TABLE questions (id BLOB PRIMARY KEY, text TEXT NOT NULL)")
            .execute(&mut conn)
            .await
            .map_err(|e| ModelServiceError::Internal(e.to_string()))?;
        sqlx::query(
            "CREATE TABLE keywords (id BLOB PRIMARY KEY, question_id BLOB NOT NULL REFERENCES questions (id), text TEXT NOT NULL)",
        )
        .execute(&mut conn)
        .await
        .map_err(|e| ModelServiceError::Internal(e.to_string()))?;

        for question in questions {
            let question_id = Uuid::new_v4();
            sqlx::query("INSERT INTO questions (id, text) VALUES ($1, $2)")
                .bind(question_id)
                .bind(question.question.trim())
                .execute(&mut conn)
                .await
                .map_err(|e| ModelServiceError::Internal(e.to_string()))?;

            for keyword in &question.keywords {
                sqlx::query("INSERT INTO keywords (id, question_id, text) VALUES ($1, $2, $3)")
                    .bind(Uuid::new_v4())
                    .bind(question_id)
                    .bind(keyword)
                    .execute(&mut conn)
                    .await
                    .map_err(|e| ModelServiceError::Internal(e.to_string()))?;
            }
        }

        conn.close()
            .await
            .map_err(|e| ModelServiceError::Internal(e.to_string()))?;

        tokio::fs::read(&path)
            .await
            .map_err(|e| ModelServiceError::Internal(e.to_string()))
    }
}
