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
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::orchestrator::{JobKind, Orchestrator};
use crate::model::*;
use crate::repo::job_log::JobLogRepo;
use crate::repo::model::{ModelAttributeRecord, ModelRecord, ModelRepo};
use crate::repo::team::TeamRepo;
use crate::repo::user::UserRepo;
use crate::service::permission::PermissionService;
use crate::service::token::{ScopedTokenService, TokenScope};
use crate::service::ModelServiceError;

pub const CHUNKS_DIR: &str = "chunks";
pub const MODEL_ARCHIVE: &str = "model.zip";
pub const MODEL_DIR: &str = "model";
pub const METADATA_FILE: &str = "metadata.json";

/// Model CRUD, the chunked upload protocol, archive download and
/// access/permission updates.
pub struct ModelService {
    model_repo: Arc<dyn ModelRepo + Sync + Send>,
    user_repo: Arc<dyn UserRepo + Sync + Send>,
    team_repo: Arc<dyn TeamRepo + Sync + Send>,
    job_log_repo: Arc<dyn JobLogRepo + Sync + Send>,
    blob_storage: Arc<dyn BlobStorage>,
    token_service: Arc<ScopedTokenService>,
    orchestrator: Arc<dyn Orchestrator>,
    permission_service: Arc<PermissionService>,
}

impl ModelService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_repo: Arc<dyn ModelRepo + Sync + Send>,
        user_repo: Arc<dyn UserRepo + Sync + Send>,
        team_repo: Arc<dyn TeamRepo + Sync + Send>,
        job_log_repo: Arc<dyn JobLogRepo + Sync + Send>,
        blob_storage: Arc<dyn BlobStorage>,
        token_service: Arc<ScopedTokenService>,
        orchestrator: Arc<dyn Orchestrator>,
        permission_service: Arc<PermissionService>,
    ) -> Self {
        Self {
            model_repo,
            user_repo,
            team_repo,
            job_log_repo,
            blob_storage,
            token_service,
            orchestrator,
            permission_service,
        }
    }

    /// Rejects writes when free space falls below the configured floor.
    pub async fn ensure_storage_available(&self) -> Result<(), ModelServiceError> {
        let usage = self.blob_storage.usage().await?;
        if usage.is_under_pressure() {
            Err(ModelServiceError::InsufficientStorage)
        } else {
            Ok(())
        }
    }

    pub async fn to_model(&self, record: ModelRecord) -> Result<Model, ModelServiceError> {
        let attributes = self.model_repo.attributes(&record.model_id).await?;
        let dependencies = self.model_repo.dependencies(&record.model_id).await?;

        let mut model: Model = record
            .try_into()
            .map_err(ModelServiceError::Internal)?;
        model.attributes = attributes
            .into_iter()
            .map(|a| ModelAttribute {
                key: a.key,
                value: a.value,
            })
            .collect();
        model.dependencies = dependencies.into_iter().map(ModelId).collect();
        Ok(model)
    }

    pub async fn list(&self, user: &User) -> Result<Vec<ModelInfo>, ModelServiceError> {
        let records = self.model_repo.list().await?;
        let mut result = Vec::new();
        for record in records {
            let permission = self.permission_service.permission(user, &record).await?;
            if permission == ModelPermission::None {
                continue;
            }
            result.push(ModelInfo {
                model: self.to_model(record).await?,
                permission,
            });
        }
        Ok(result)
    }

    pub async fn get(
        &self,
        user: &User,
        model_id: &ModelId,
    ) -> Result<ModelInfo, ModelServiceError> {
        let record = self
            .permission_service
            .require(user, model_id, ModelPermission::Read)
            .await?;
        let permission = self.permission_service.permission(user, &record).await?;
        Ok(ModelInfo {
            model: self.to_model(record).await?,
            permission,
        })
    }

    /// Creates the model row in `upload_in_progress` and mints the
    /// upload-scoped token driving the chunk protocol.
    pub async fn upload_start(
        &self,
        user: &User,
        request: &UploadStartRequest,
    ) -> Result<UploadStartResponse, ModelServiceError> {
        if request.model_name.trim().is_empty() {
            return Err(ModelServiceError::ArgValidation(vec![
                "modelName must not be empty".to_string(),
            ]));
        }
        self.ensure_storage_available().await?;

        let model_id = ModelId::new_v4();
        let record = ModelRecord {
            model_id: model_id.0,
            name: request.model_name.clone(),
            model_type: None,
            owner_id: user.id.0,
            team_id: None,
            access: ModelAccess::Private.to_string(),
            default_permission: DefaultPermission::Read.to_string(),
            train_status: ModelStatus::UploadInProgress.to_string(),
            deploy_status: ModelStatus::NotStarted.to_string(),
            base_model_id: None,
            published_date: Utc::now(),
        };

        match self.model_repo.create(&record, &[], &[]).await {
            Ok(()) => {}
            Err(bazaar_service_base::repo::RepoError::UniqueViolation(_)) => {
                return Err(ModelServiceError::DuplicateModelName(
                    request.model_name.clone(),
                ))
            }
            Err(other) => return Err(other.into()),
        }

        let token = self.token_service.mint(&model_id, TokenScope::Upload)?;
        info!(model_id = %model_id, "Started chunked model upload");

        Ok(UploadStartResponse { model_id, token })
    }

    pub async fn upload_chunk(
        &self,
        token: &TokenSecret,
        chunk_idx: u64,
        data: Bytes,
    ) -> Result<ModelId, ModelServiceError> {
        let model_id = self.token_service.verify(token, TokenScope::Upload)?;
        let record = self.expect_model(&model_id).await?;
        if record.train_status != ModelStatus::UploadInProgress.to_string() {
            return Err(ModelServiceError::ArgValidation(vec![
                "model has no upload in progress".to_string(),
            ]));
        }

        self.blob_storage
            .put(
                BlobNamespace::Model(model_id),
                &Path::new(CHUNKS_DIR).join(chunk_idx.to_string()),
                &data,
            )
            .await?;
        Ok(model_id)
    }

    /// Requires a contiguous chunk range `0..N-1`, concatenates the chunks
    /// into the archive, unpacks it and applies the embedded metadata.
    pub async fn upload_commit(
        &self,
        token: &TokenSecret,
    ) -> Result<UploadCommitResponse, ModelServiceError> {
        let model_id = self.token_service.verify(token, TokenScope::Upload)?;
        let record = self.expect_model(&model_id).await?;
        if record.train_status != ModelStatus::UploadInProgress.to_string() {
            return Err(ModelServiceError::ArgValidation(vec![
                "model has no upload in progress".to_string(),
            ]));
        }

        let namespace = BlobNamespace::Model(model_id);
        let chunk_files = self
            .blob_storage
            .list(namespace.clone(), Path::new(CHUNKS_DIR))
            .await?;
        if chunk_files.is_empty() {
            return Err(ModelServiceError::ArgValidation(vec![
                "no chunks uploaded".to_string(),
            ]));
        }

        let mut indices = HashSet::new();
        for file in &chunk_files {
            let index: u64 = file
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| {
                    ModelServiceError::Internal(format!(
                        "unexpected chunk file {}",
                        file.display()
                    ))
                })?;
            indices.insert(index);
        }
        for index in 0..chunk_files.len() as u64 {
            if !indices.contains(&index) {
                return Err(ModelServiceError::MissingChunk(index));
            }
        }

        self.blob_storage
            .delete(namespace.clone(), Path::new(MODEL_ARCHIVE))
            .await?;
        for index in 0..chunk_files.len() as u64 {
            let chunk_path = Path::new(CHUNKS_DIR).join(index.to_string());
            // read one chunk at a time so large archives never stay resident
            let chunk = self
                .blob_storage
                .get(namespace.clone(), &chunk_path)
                .await?
                .ok_or(ModelServiceError::MissingChunk(index))?;
            self.blob_storage
                .append(namespace.clone(), Path::new(MODEL_ARCHIVE), &chunk)
                .await?;
        }

        self.blob_storage
            .unzip(namespace.clone(), Path::new(MODEL_ARCHIVE), Path::new(MODEL_DIR))
            .await?;

        let metadata = self
            .blob_storage
            .get(
                namespace.clone(),
                &Path::new(MODEL_DIR).join(METADATA_FILE),
            )
            .await?
            .ok_or_else(|| {
                ModelServiceError::ArgValidation(vec![format!(
                    "archive does not contain {METADATA_FILE}"
                )])
            })?;

        let metadata: ArchiveMetadata = serde_json::from_slice(&metadata).map_err(|e| {
            ModelServiceError::ArgValidation(vec![format!("invalid {METADATA_FILE}: {e}")])
        })?;
        let model_type: ModelType = metadata
            .model_type
            .parse()
            .map_err(|e: String| ModelServiceError::ArgValidation(vec![e]))?;

        self.blob_storage
            .put(
                namespace.clone(),
                Path::new(METADATA_FILE),
                &serde_json::to_vec(&metadata)
                    .map_err(|e| ModelServiceError::Internal(e.to_string()))?,
            )
            .await?;

        self.model_repo
            .set_model_type(&model_id.0, &model_type.to_string())
            .await?;
        let attributes: Vec<ModelAttributeRecord> = metadata
            .attributes
            .iter()
            .map(|(key, value)| ModelAttributeRecord {
                model_id: model_id.0,
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        self.model_repo.upsert_attributes(&attributes).await?;
        self.model_repo
            .update_train_status(&model_id.0, &ModelStatus::Complete.to_string())
            .await?;

        info!(model_id = %model_id, model_type = %model_type, "Committed model upload");

        Ok(UploadCommitResponse {
            model_id,
            model_type,
        })
    }

    pub async fn download(
        &self,
        user: &User,
        model_id: &ModelId,
    ) -> Result<Bytes, ModelServiceError> {
        self.permission_service
            .require(user, model_id, ModelPermission::Read)
            .await?;

        let namespace = BlobNamespace::Model(*model_id);
        if let Some(archive) = self
            .blob_storage
            .get(namespace.clone(), Path::new(MODEL_ARCHIVE))
            .await?
        {
            return Ok(archive);
        }

        // trained models have an unpacked tree but no archive yet
        let files = self
            .blob_storage
            .list(namespace.clone(), Path::new(MODEL_DIR))
            .await?;
        if files.is_empty() {
            return Err(ModelServiceError::ArchiveNotFound(*model_id));
        }

        self.blob_storage
            .zip_dir(namespace.clone(), Path::new(MODEL_DIR), Path::new(MODEL_ARCHIVE))
            .await?;
        self.blob_storage
            .get(namespace, Path::new(MODEL_ARCHIVE))
            .await?
            .ok_or(ModelServiceError::ArchiveNotFound(*model_id))
    }

    /// Deleting a model stops its jobs and reclaims both blob arenas; it is
    /// rejected while other models depend on it.
    pub async fn delete(&self, user: &User, model_id: &ModelId) -> Result<(), ModelServiceError> {
        let record = self
            .permission_service
            .require(user, model_id, ModelPermission::Owner)
            .await?;

        let dependents = self.model_repo.dependents(&model_id.0).await?;
        if !dependents.is_empty() {
            return Err(ModelServiceError::DeletionBlocked {
                used_by: dependents.len() as i64,
            });
        }

        let children = self
            .model_repo
            .active_training_children_count(&model_id.0)
            .await?;
        if children > 0 {
            return Err(ModelServiceError::DeletionBlockedByTraining { children });
        }

        let train_status: ModelStatus = record
            .train_status
            .parse()
            .map_err(ModelServiceError::Internal)?;
        let deploy_status: ModelStatus = record
            .deploy_status
            .parse()
            .map_err(ModelServiceError::Internal)?;

        if matches!(train_status, ModelStatus::Starting | ModelStatus::InProgress) {
            if let Err(err) = self
                .orchestrator
                .stop_job(&JobKind::Train.job_name(model_id))
                .await
            {
                warn!(model_id = %model_id, error = %err, "Failed to stop train job during delete");
            }
        }
        if deploy_status.is_active() {
            if let Err(err) = self
                .orchestrator
                .stop_job(&JobKind::Deploy.job_name(model_id))
                .await
            {
                warn!(model_id = %model_id, error = %err, "Failed to stop deploy job during delete");
            }
        }

        self.blob_storage
            .delete_namespace(BlobNamespace::Model(*model_id))
            .await?;
        self.blob_storage
            .delete_namespace(BlobNamespace::Data(*model_id))
            .await?;

        self.model_repo.delete(&model_id.0).await?;
        info!(model_id = %model_id, "Deleted model");
        Ok(())
    }

    pub async fn update_access(
        &self,
        user: &User,
        model_id: &ModelId,
        request: &UpdateAccessRequest,
    ) -> Result<Model, ModelServiceError> {
        self.permission_service
            .require(user, model_id, ModelPermission::Owner)
            .await?;

        let team_id = match request.access {
            ModelAccess::Protected => {
                let team_id = request.team_id.ok_or_else(|| {
                    ModelServiceError::ArgValidation(vec![
                        "protected access requires a team".to_string(),
                    ])
                })?;
                self.team_repo
                    .get(&team_id.0)
                    .await?
                    .ok_or_else(|| {
                        ModelServiceError::ArgValidation(vec![format!(
                            "unknown team {team_id}"
                        )])
                    })?;
                Some(team_id.0)
            }
            _ => None,
        };

        self.model_repo
            .update_access(&model_id.0, &request.access.to_string(), team_id)
            .await?;

        let record = self.expect_model(model_id).await?;
        self.to_model(record).await
    }

    pub async fn update_default_permission(
        &self,
        user: &User,
        model_id: &ModelId,
        request: &UpdateDefaultPermissionRequest,
    ) -> Result<Model, ModelServiceError> {
        self.permission_service
            .require(user, model_id, ModelPermission::Owner)
            .await?;
        self.model_repo
            .update_default_permission(&model_id.0, &request.default_permission.to_string())
            .await?;

        let record = self.expect_model(model_id).await?;
        self.to_model(record).await
    }

    pub async fn permissions(
        &self,
        user: &User,
        model_id: &ModelId,
    ) -> Result<Vec<ModelPermissionEntry>, ModelServiceError> {
        let record = self
            .permission_service
            .require(user, model_id, ModelPermission::Read)
            .await?;

        let mut entries = Vec::new();
        if let Some(owner) = self.user_repo.get(&record.owner_id).await? {
            entries.push(ModelPermissionEntry {
                user_id: UserId(owner.user_id),
                username: owner.username,
                permission: ModelPermission::Owner,
            });
        }

        let access: ModelAccess = record
            .access
            .parse()
            .map_err(ModelServiceError::Internal)?;
        let default_permission: DefaultPermission = record
            .default_permission
            .parse()
            .map_err(ModelServiceError::Internal)?;

        if access == ModelAccess::Protected {
            if let Some(team_id) = record.team_id {
                for member in self.team_repo.members(&team_id).await? {
                    if member.user_id == record.owner_id {
                        continue;
                    }
                    entries.push(ModelPermissionEntry {
                        user_id: UserId(member.user_id),
                        username: member.username,
                        permission: if member.is_team_admin {
                            ModelPermission::Owner
                        } else {
                            default_permission.into()
                        },
                    });
                }
            }
        }

        Ok(entries)
    }

    /// The model together with its transitive dependency closure, root
    /// first. Construction guarantees the graph is acyclic, the visited set
    /// only guards against diamonds.
    pub async fn dependency_closure(
        &self,
        model_id: &ModelId,
    ) -> Result<Vec<ModelRecord>, ModelServiceError> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::new();

        queue.push_back(model_id.0);
        visited.insert(model_id.0);

        while let Some(current) = queue.pop_front() {
            let record = self
                .model_repo
                .get(&current)
                .await?
                .ok_or(ModelServiceError::ModelNotFound(ModelId(current)))?;
            for dependency in self.model_repo.dependencies(&current).await? {
                if visited.insert(dependency) {
                    queue.push_back(dependency);
                }
            }
            result.push(record);
        }

        Ok(result)
    }

    /// Worst status across the model and its transitive dependencies, plus
    /// the aggregated warning/error job logs of the same set.
    pub async fn composite_status(
        &self,
        model_id: &ModelId,
        job: JobType,
    ) -> Result<StatusResponse, ModelServiceError> {
        let closure = self.dependency_closure(model_id).await?;

        let mut statuses = Vec::with_capacity(closure.len());
        for record in &closure {
            let status = match job {
                JobType::Train => &record.train_status,
                JobType::Deploy => &record.deploy_status,
            };
            statuses.push(
                status
                    .parse::<ModelStatus>()
                    .map_err(ModelServiceError::Internal)?,
            );
        }
        let status = ModelStatus::worst(statuses).unwrap_or(ModelStatus::NotStarted);

        let model_ids: Vec<Uuid> = closure.iter().map(|r| r.model_id).collect();
        let logs = self
            .job_log_repo
            .for_models(model_ids, &job.to_string())
            .await?;

        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        for log in logs {
            match log.level.parse::<JobLogLevel>() {
                Ok(JobLogLevel::Warning) => warnings.push(log.message),
                Ok(JobLogLevel::Error) => errors.push(log.message),
                Err(_) => {}
            }
        }

        Ok(StatusResponse {
            model_id: *model_id,
            status,
            warnings,
            errors,
        })
    }

    pub async fn logs(
        &self,
        model_id: &ModelId,
        job: JobType,
    ) -> Result<LogsResponse, ModelServiceError> {
        let closure = self.dependency_closure(model_id).await?;
        let model_ids: Vec<Uuid> = closure.iter().map(|r| r.model_id).collect();
        let records = self
            .job_log_repo
            .for_models(model_ids, &job.to_string())
            .await?;

        let mut logs = Vec::with_capacity(records.len());
        for record in records {
            logs.push(JobLogEntry {
                model_id: ModelId(record.model_id),
                job,
                level: record
                    .level
                    .parse()
                    .map_err(ModelServiceError::Internal)?,
                message: record.message,
            });
        }

        Ok(LogsResponse {
            model_id: *model_id,
            logs,
        })
    }

    pub async fn expect_model(
        &self,
        model_id: &ModelId,
    ) -> Result<ModelRecord, ModelServiceError> {
        self.model_repo
            .get(&model_id.0)
            .await?
            .ok_or(ModelServiceError::ModelNotFound(*model_id))
    }
}
