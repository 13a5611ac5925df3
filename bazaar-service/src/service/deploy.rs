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
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::clients::orchestrator::{JobDescriptor, JobKind, Orchestrator};
use crate::config::{OrchestratorConfig, VariablesConfig};
use crate::model::*;
use crate::repo::job_log::{JobLogRepo, NewJobLogRecord};
use crate::repo::model::{ModelRecord, ModelRepo};
use crate::service::license::LicenseVerifier;
use crate::service::model::{ModelService, MODEL_DIR};
use crate::service::permission::PermissionService;
use crate::service::token::{ScopedTokenService, TokenScope};
use crate::service::train::job_resources;
use crate::service::ModelServiceError;

pub const DEPLOY_CONFIG_FILE: &str = "deploy_config.json";

/// The config staged to `models/{id}/deploy_config.json` and read by the
/// inference job binary.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployJobConfig {
    pub model_id: ModelId,
    pub model_type: Option<ModelType>,
    /// Only the deployment root carries the caller-provided name.
    pub deployment_name: Option<String>,
    pub model_path: String,
    pub autoscaling_max: u32,
    pub model_bazaar_endpoint: String,
    pub job_token: String,
}

pub struct DeployService {
    model_repo: Arc<dyn ModelRepo + Sync + Send>,
    job_log_repo: Arc<dyn JobLogRepo + Sync + Send>,
    blob_storage: Arc<dyn BlobStorage>,
    token_service: Arc<ScopedTokenService>,
    license_verifier: Arc<dyn LicenseVerifier>,
    orchestrator: Arc<dyn Orchestrator>,
    permission_service: Arc<PermissionService>,
    model_service: Arc<ModelService>,
    orchestrator_config: OrchestratorConfig,
    variables: VariablesConfig,
}

impl DeployService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_repo: Arc<dyn ModelRepo + Sync + Send>,
        job_log_repo: Arc<dyn JobLogRepo + Sync + Send>,
        blob_storage: Arc<dyn BlobStorage>,
        token_service: Arc<ScopedTokenService>,
        license_verifier: Arc<dyn LicenseVerifier>,
        orchestrator: Arc<dyn Orchestrator>,
        permission_service: Arc<PermissionService>,
        model_service: Arc<ModelService>,
        orchestrator_config: OrchestratorConfig,
        variables: VariablesConfig,
    ) -> Self {
        Self {
            model_repo,
            job_log_repo,
            blob_storage,
            token_service,
            license_verifier,
            orchestrator,
            permission_service,
            model_service,
            orchestrator_config,
            variables,
        }
    }

    /// Deploys the model and its whole dependency closure; already-deployed
    /// members are skipped, so re-deploying an active model is a no-op.
    pub async fn deploy(
        &self,
        user: &User,
        model_id: &ModelId,
        request: &DeployRequest,
    ) -> Result<StatusResponse, ModelServiceError> {
        let root = self
            .permission_service
            .require(user, model_id, ModelPermission::Write)
            .await?;

        if root.train_status != ModelStatus::Complete.to_string() {
            return Err(ModelServiceError::TrainingIncomplete(*model_id));
        }

        let root_status: ModelStatus = root
            .deploy_status
            .parse()
            .map_err(ModelServiceError::Internal)?;
        if root_status.is_active() {
            return self
                .model_service
                .composite_status(model_id, JobType::Deploy)
                .await;
        }

        let autoscaling_max = request.autoscaling_max.unwrap_or(1).max(1);
        let resources = job_resources(request.job_options.as_ref());
        self.license_verifier.verify(resources.cpu_mhz).await?;

        // dependencies go first so the root never serves before the models
        // it relies on exist in the scheduler
        let mut closure = self.model_service.dependency_closure(model_id).await?;
        closure.reverse();

        for record in closure {
            let current: ModelStatus = record
                .deploy_status
                .parse()
                .map_err(ModelServiceError::Internal)?;
            if current.is_active() {
                continue;
            }

            let dep_id = ModelId(record.model_id);
            if record.train_status != ModelStatus::Complete.to_string() {
                return Err(ModelServiceError::TrainingIncomplete(dep_id));
            }

            let deployment_name = if record.model_id == model_id.0 {
                request.deployment_name.clone()
            } else {
                None
            };

            self.start_single(&record, deployment_name, autoscaling_max, request)
                .await?;
            info!(model_id = %dep_id, "Dispatched deploy job");
        }

        self.model_service
            .composite_status(model_id, JobType::Deploy)
            .await
    }

    async fn start_single(
        &self,
        record: &ModelRecord,
        deployment_name: Option<String>,
        autoscaling_max: u32,
        request: &DeployRequest,
    ) -> Result<(), ModelServiceError> {
        let model_id = ModelId(record.model_id);
        let job_token = self.token_service.mint(&model_id, TokenScope::Job)?;
        let namespace = BlobNamespace::Model(model_id);

        let model_path = self
            .blob_storage
            .location()
            .join(namespace.base_path())
            .join(MODEL_DIR)
            .to_string_lossy()
            .to_string();

        let config = DeployJobConfig {
            model_id,
            model_type: record
                .model_type
                .as_deref()
                .map(|t| t.parse())
                .transpose()
                .map_err(ModelServiceError::Internal)?,
            deployment_name,
            model_path,
            autoscaling_max,
            model_bazaar_endpoint: self.variables.model_bazaar_endpoint.to_string(),
            job_token: job_token.value.clone(),
        };
        self.blob_storage
            .put(
                namespace.clone(),
                Path::new(DEPLOY_CONFIG_FILE),
                &serde_json::to_vec_pretty(&config)
                    .map_err(|e| ModelServiceError::Internal(e.to_string()))?,
            )
            .await?;

        self.model_repo
            .update_deploy_status(&record.model_id, &ModelStatus::Starting.to_string())
            .await?;

        let mut env = std::collections::BTreeMap::new();
        env.insert(
            "MODEL_BAZAAR_ENDPOINT".to_string(),
            self.variables.model_bazaar_endpoint.to_string(),
        );
        env.insert("MODEL_ID".to_string(), model_id.to_string());
        env.insert("JOB_TOKEN".to_string(), job_token.value.clone());
        for (key, value) in self.variables.cloud_credentials.as_env() {
            env.insert(key, value);
        }

        let job = JobDescriptor {
            name: JobKind::Deploy.job_name(&model_id),
            kind: JobKind::Deploy,
            docker_image: self.orchestrator_config.deploy_image.clone(),
            args: vec![
                "--config".to_string(),
                format!(
                    "{}/{}",
                    self.blob_storage
                        .location()
                        .join(namespace.base_path())
                        .to_string_lossy(),
                    DEPLOY_CONFIG_FILE
                ),
            ],
            env,
            resources: job_resources(request.job_options.as_ref()),
            count: 1,
            autoscaling_max,
        };

        if let Err(err) = self.orchestrator.start_job(&job).await {
            error!(model_id = %model_id, error = %err, "Deploy job submission failed");
            self.model_repo
                .update_deploy_status(&record.model_id, &ModelStatus::Failed.to_string())
                .await?;
            return Err(err.into());
        }

        Ok(())
    }

    /// Stops the deployment unless a deployed model still depends on this
    /// one, directly or transitively.
    pub async fn stop(&self, user: &User, model_id: &ModelId) -> Result<(), ModelServiceError> {
        let record = self
            .permission_service
            .require(user, model_id, ModelPermission::Write)
            .await?;

        let status: ModelStatus = record
            .deploy_status
            .parse()
            .map_err(ModelServiceError::Internal)?;
        if !status.is_active() {
            return Err(ModelServiceError::ArgValidation(vec![
                "model is not deployed".to_string(),
            ]));
        }

        let blocking = self.active_dependents(&model_id.0).await?;
        if !blocking.is_empty() {
            return Err(ModelServiceError::StopBlocked(blocking));
        }

        self.orchestrator
            .stop_job(&JobKind::Deploy.job_name(model_id))
            .await?;
        self.model_repo
            .update_deploy_status(&model_id.0, &ModelStatus::Stopped.to_string())
            .await?;
        info!(model_id = %model_id, "Stopped deployment");
        Ok(())
    }

    /// Names of deployed models that (transitively) depend on the given one.
    async fn active_dependents(&self, model_id: &Uuid) -> Result<Vec<String>, ModelServiceError> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut queue = vec![*model_id];
        let mut blocking = Vec::new();

        while let Some(current) = queue.pop() {
            for dependent in self.model_repo.dependents(&current).await? {
                if !visited.insert(dependent.model_id) {
                    continue;
                }
                let status: ModelStatus = dependent
                    .deploy_status
                    .parse()
                    .map_err(ModelServiceError::Internal)?;
                if status.is_active() {
                    blocking.push(dependent.name.clone());
                }
                queue.push(dependent.model_id);
            }
        }

        blocking.sort();
        Ok(blocking)
    }

    pub async fn status(
        &self,
        user: &User,
        model_id: &ModelId,
    ) -> Result<StatusResponse, ModelServiceError> {
        self.permission_service
            .require(user, model_id, ModelPermission::Read)
            .await?;
        self.model_service
            .composite_status(model_id, JobType::Deploy)
            .await
    }

    pub async fn logs(
        &self,
        user: &User,
        model_id: &ModelId,
    ) -> Result<LogsResponse, ModelServiceError> {
        self.permission_service
            .require(user, model_id, ModelPermission::Read)
            .await?;
        self.model_service.logs(model_id, JobType::Deploy).await
    }

    pub async fn update_status(
        &self,
        request: &StatusUpdateRequest,
    ) -> Result<ModelId, ModelServiceError> {
        let model_id = self
            .token_service
            .verify(&request.token, TokenScope::Job)?;
        self.model_service.expect_model(&model_id).await?;

        if !matches!(
            request.status,
            ModelStatus::InProgress | ModelStatus::Complete | ModelStatus::Failed
        ) {
            return Err(ModelServiceError::ArgValidation(vec![format!(
                "jobs may not report status {}",
                request.status
            )]));
        }

        self.model_repo
            .update_deploy_status(&model_id.0, &request.status.to_string())
            .await?;
        Ok(model_id)
    }

    pub async fn log(&self, request: &JobLogRequest) -> Result<ModelId, ModelServiceError> {
        let model_id = self
            .token_service
            .verify(&request.token, TokenScope::Job)?;
        self.model_service.expect_model(&model_id).await?;

        self.job_log_repo
            .insert(&NewJobLogRecord {
                model_id: model_id.0,
                job: JobType::Deploy.to_string(),
                level: request.level.to_string(),
                message: request.message.clone(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(model_id)
    }
}
