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
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::clients::orchestrator::{
    JobDescriptor, JobKind, JobResources, Orchestrator,
};
use crate::config::{OrchestratorConfig, VariablesConfig};
use crate::model::*;
use crate::repo::job_log::{JobLogRepo, NewJobLogRecord};
use crate::repo::model::{ModelAttributeRecord, ModelRecord, ModelRepo};
use crate::repo::upload::{UploadRecord, UploadRepo};
use crate::service::license::LicenseVerifier;
use crate::service::model::ModelService;
use crate::service::permission::PermissionService;
use crate::service::token::{ScopedTokenService, TokenScope};
use crate::service::ModelServiceError;

pub const TRAIN_CONFIG_FILE: &str = "train_config.json";
pub const TRAIN_REPORTS_DIR: &str = "train_reports";

const DEFAULT_TRAIN_CPU_MHZ: i64 = 2400;
const DEFAULT_CORES: i64 = 1;
const MIN_MEMORY_MB: i64 = 1000;

const DOC_EXTENSIONS: [&str; 5] = ["pdf", "docx", "html", "txt", "csv"];

/// The config staged to `models/{id}/train_config.json` and read by the
/// training job binary.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobConfig {
    pub model_id: ModelId,
    pub model_type: ModelType,
    pub base_model_id: Option<ModelId>,
    pub model_options: Option<serde_json::Value>,
    pub data_paths: Vec<String>,
    pub license_key: String,
    pub model_bazaar_endpoint: String,
    pub job_token: String,
    pub llm_providers: HashMap<String, String>,
}

/// Internal, already-typed dispatch request shared by all train endpoints.
pub struct TrainDispatch {
    pub model_name: String,
    pub model_type: ModelType,
    pub base_model_id: Option<ModelId>,
    pub model_options: Option<serde_json::Value>,
    pub upload_ids: Vec<UploadId>,
    pub job_options: Option<JobOptions>,
}

pub fn job_resources(options: Option<&JobOptions>) -> JobResources {
    let options = options.cloned().unwrap_or_default();
    let memory = options.allocation_memory_mb.unwrap_or(MIN_MEMORY_MB).max(MIN_MEMORY_MB);
    JobResources {
        cpu_mhz: options.cpu_usage_mhz.unwrap_or(DEFAULT_TRAIN_CPU_MHZ),
        cores: options.allocation_cores.unwrap_or(DEFAULT_CORES),
        memory_mb: memory,
        memory_max_mb: options.allocation_memory_max_mb.unwrap_or(memory).max(memory),
    }
}

pub struct TrainService {
    model_repo: Arc<dyn ModelRepo + Sync + Send>,
    upload_repo: Arc<dyn UploadRepo + Sync + Send>,
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

impl TrainService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_repo: Arc<dyn ModelRepo + Sync + Send>,
        upload_repo: Arc<dyn UploadRepo + Sync + Send>,
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
            upload_repo,
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

    /// Stages a multi-file dataset below `uploads/{id}` so later training
    /// requests can reference it by id.
    pub async fn upload_data(
        &self,
        user: &User,
        files: Vec<(String, Vec<u8>)>,
        sub_dir: Option<String>,
    ) -> Result<Upload, ModelServiceError> {
        if files.is_empty() {
            return Err(ModelServiceError::ArgValidation(vec![
                "at least one file is required".to_string(),
            ]));
        }
        if let Some(sub_dir) = &sub_dir {
            if sub_dir.contains("..") || sub_dir.starts_with('/') {
                return Err(ModelServiceError::ArgValidation(vec![
                    "invalid sub directory".to_string(),
                ]));
            }
        }
        self.model_service.ensure_storage_available().await?;

        let upload_id = UploadId::new_v4();
        let namespace = BlobNamespace::Upload(upload_id);

        let mut names = Vec::new();
        for (name, data) in &files {
            let file_name = Path::new(name)
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    ModelServiceError::ArgValidation(vec![format!("invalid file name {name}")])
                })?;
            let path = match &sub_dir {
                Some(sub_dir) => Path::new(sub_dir).join(file_name),
                None => Path::new(file_name).to_path_buf(),
            };
            self.blob_storage.put(namespace.clone(), &path, data).await?;
            names.push(path.to_string_lossy().replace('\\', "/"));
        }

        let record = UploadRecord {
            upload_id: upload_id.0,
            user_id: user.id.0,
            upload_date: Utc::now(),
            files: names.join(";"),
        };
        self.upload_repo.create(&record).await?;

        Ok(record.into())
    }

    async fn resolve_upload(
        &self,
        user: &User,
        upload_id: &UploadId,
    ) -> Result<UploadRecord, ModelServiceError> {
        let record = self
            .upload_repo
            .get(&upload_id.0)
            .await?
            .ok_or(ModelServiceError::UploadNotFound(*upload_id))?;
        if record.user_id != user.id.0 && !user.is_admin {
            return Err(ModelServiceError::Unauthorized(format!(
                "upload {upload_id} does not belong to the caller"
            )));
        }
        Ok(record)
    }

    fn upload_path(&self, upload_id: &UploadId) -> String {
        self.blob_storage
            .location()
            .join(BlobNamespace::Upload(*upload_id).base_path())
            .to_string_lossy()
            .to_string()
    }

    fn job_env(&self, model_id: &ModelId, job_token: &TokenSecret) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            "MODEL_BAZAAR_ENDPOINT".to_string(),
            self.variables.model_bazaar_endpoint.to_string(),
        );
        env.insert("MODEL_ID".to_string(), model_id.to_string());
        env.insert("JOB_TOKEN".to_string(), job_token.value.clone());
        for (key, value) in self.variables.cloud_credentials.as_env() {
            env.insert(key, value);
        }
        env
    }

    /// The shared dispatch pipeline: validate, resolve data, check the
    /// license, stage the config, insert the row, then submit. The DB commit
    /// happens before the submission so the row always exists by the time
    /// the job can call back; a failed submission flips the row to `failed`.
    pub async fn dispatch(
        &self,
        user: &User,
        dispatch: TrainDispatch,
    ) -> Result<Model, ModelServiceError> {
        if dispatch.model_name.trim().is_empty() {
            return Err(ModelServiceError::ArgValidation(vec![
                "modelName must not be empty".to_string(),
            ]));
        }
        if dispatch.base_model_id.is_some() == dispatch.model_options.is_some() {
            return Err(ModelServiceError::ArgValidation(vec![
                "exactly one of baseModelId and modelOptions must be provided".to_string(),
            ]));
        }

        self.model_service.ensure_storage_available().await?;

        let mut data_paths = Vec::new();
        for upload_id in &dispatch.upload_ids {
            self.resolve_upload(user, upload_id).await?;
            data_paths.push(self.upload_path(upload_id));
        }

        let resources = job_resources(dispatch.job_options.as_ref());
        let license = self.license_verifier.verify(resources.cpu_mhz).await?;

        let model_id = ModelId::new_v4();
        let job_token = self.token_service.mint(&model_id, TokenScope::Job)?;

        // base model: same type, readable by the caller, fully trained;
        // its attributes and dependency edges are inherited by value
        let mut attributes: Vec<ModelAttributeRecord> = Vec::new();
        let mut dependencies: Vec<Uuid> = Vec::new();
        if let Some(base_model_id) = &dispatch.base_model_id {
            let base = self
                .permission_service
                .require(user, base_model_id, ModelPermission::Read)
                .await?;
            if base.model_type.as_deref() != Some(dispatch.model_type.to_string().as_str()) {
                return Err(ModelServiceError::ArgValidation(vec![format!(
                    "base model {base_model_id} has a different type"
                )]));
            }
            if base.train_status != ModelStatus::Complete.to_string() {
                return Err(ModelServiceError::TrainingIncomplete(*base_model_id));
            }

            attributes = self
                .model_repo
                .attributes(&base_model_id.0)
                .await?
                .into_iter()
                .map(|a| ModelAttributeRecord {
                    model_id: model_id.0,
                    key: a.key,
                    value: a.value,
                })
                .collect();
            dependencies = self.model_repo.dependencies(&base_model_id.0).await?;
        }

        let config = TrainJobConfig {
            model_id,
            model_type: dispatch.model_type,
            base_model_id: dispatch.base_model_id,
            model_options: dispatch.model_options,
            data_paths,
            license_key: license.key,
            model_bazaar_endpoint: self.variables.model_bazaar_endpoint.to_string(),
            job_token: job_token.value.clone(),
            llm_providers: self.variables.llm_providers.clone(),
        };
        self.blob_storage
            .put(
                BlobNamespace::Model(model_id),
                Path::new(TRAIN_CONFIG_FILE),
                &serde_json::to_vec_pretty(&config)
                    .map_err(|e| ModelServiceError::Internal(e.to_string()))?,
            )
            .await?;

        let record = ModelRecord {
            model_id: model_id.0,
            name: dispatch.model_name.clone(),
            model_type: Some(dispatch.model_type.to_string()),
            owner_id: user.id.0,
            team_id: None,
            access: ModelAccess::Private.to_string(),
            default_permission: DefaultPermission::Read.to_string(),
            train_status: ModelStatus::NotStarted.to_string(),
            deploy_status: ModelStatus::NotStarted.to_string(),
            base_model_id: dispatch.base_model_id.map(|id| id.0),
            published_date: Utc::now(),
        };

        match self.model_repo.create(&record, &attributes, &dependencies).await {
            Ok(()) => {}
            Err(bazaar_service_base::repo::RepoError::UniqueViolation(_)) => {
                return Err(ModelServiceError::DuplicateModelName(dispatch.model_name))
            }
            Err(other) => return Err(other.into()),
        }

        let job = JobDescriptor {
            name: JobKind::Train.job_name(&model_id),
            kind: JobKind::Train,
            docker_image: self.orchestrator_config.train_image.clone(),
            args: vec![
                "--config".to_string(),
                format!(
                    "{}/{}",
                    self.blob_storage
                        .location()
                        .join(BlobNamespace::Model(model_id).base_path())
                        .to_string_lossy(),
                    TRAIN_CONFIG_FILE
                ),
            ],
            env: self.job_env(&model_id, &job_token),
            resources,
            count: 1,
            autoscaling_max: 1,
        };

        match self.orchestrator.start_job(&job).await {
            Ok(()) => {
                self.model_repo
                    .update_train_status(&model_id.0, &ModelStatus::Starting.to_string())
                    .await?;
                info!(model_id = %model_id, "Dispatched train job");
            }
            Err(err) => {
                error!(model_id = %model_id, error = %err, "Train job submission failed");
                self.model_repo
                    .update_train_status(&model_id.0, &ModelStatus::Failed.to_string())
                    .await?;
                return Err(err.into());
            }
        }

        let record = self.model_service.expect_model(&model_id).await?;
        self.model_service.to_model(record).await
    }

    pub async fn train_ndb(
        &self,
        user: &User,
        request: NdbTrainRequest,
    ) -> Result<Model, ModelServiceError> {
        self.dispatch(
            user,
            TrainDispatch {
                model_name: request.model_name,
                model_type: ModelType::Ndb,
                base_model_id: request.base_model_id,
                model_options: to_options(request.model_options)?,
                upload_ids: request.upload_ids,
                job_options: request.job_options,
            },
        )
        .await
    }

    pub async fn retrain_ndb(
        &self,
        user: &User,
        request: RetrainRequest,
    ) -> Result<Model, ModelServiceError> {
        self.dispatch(
            user,
            TrainDispatch {
                model_name: request.model_name,
                model_type: ModelType::Ndb,
                base_model_id: Some(request.base_model_id),
                model_options: None,
                upload_ids: request.upload_ids,
                job_options: request.job_options,
            },
        )
        .await
    }

    pub async fn train_nlp_token(
        &self,
        user: &User,
        request: NlpTokenTrainRequest,
    ) -> Result<Model, ModelServiceError> {
        self.dispatch(
            user,
            TrainDispatch {
                model_name: request.model_name,
                model_type: ModelType::NlpToken,
                base_model_id: request.base_model_id,
                model_options: to_options(request.model_options)?,
                upload_ids: request.upload_ids,
                job_options: request.job_options,
            },
        )
        .await
    }

    pub async fn retrain_nlp_token(
        &self,
        user: &User,
        request: RetrainRequest,
    ) -> Result<Model, ModelServiceError> {
        self.dispatch(
            user,
            TrainDispatch {
                model_name: request.model_name,
                model_type: ModelType::NlpToken,
                base_model_id: Some(request.base_model_id),
                model_options: None,
                upload_ids: request.upload_ids,
                job_options: request.job_options,
            },
        )
        .await
    }

    pub async fn train_nlp_text(
        &self,
        user: &User,
        request: NlpTextTrainRequest,
    ) -> Result<Model, ModelServiceError> {
        self.dispatch(
            user,
            TrainDispatch {
                model_name: request.model_name,
                model_type: ModelType::NlpText,
                base_model_id: request.base_model_id,
                model_options: to_options(request.model_options)?,
                upload_ids: request.upload_ids,
                job_options: request.job_options,
            },
        )
        .await
    }

    /// Data generation trains a text model from synthesized samples; there
    /// is no base model variant.
    pub async fn datagen_nlp(
        &self,
        user: &User,
        request: NlpDatagenTrainRequest,
    ) -> Result<Model, ModelServiceError> {
        if request.model_options.task_prompt.trim().is_empty() {
            return Err(ModelServiceError::ArgValidation(vec![
                "taskPrompt must not be empty".to_string(),
            ]));
        }
        if let Some(provider) = &request.model_options.llm_provider {
            self.check_llm_provider(provider)?;
        }
        self.dispatch(
            user,
            TrainDispatch {
                model_name: request.model_name,
                model_type: ModelType::NlpText,
                base_model_id: None,
                model_options: to_options(Some(request.model_options))?,
                upload_ids: Vec::new(),
                job_options: request.job_options,
            },
        )
        .await
    }

    fn check_llm_provider(&self, provider: &str) -> Result<(), ModelServiceError> {
        if provider == "on-prem" || self.variables.llm_providers.contains_key(provider) {
            Ok(())
        } else {
            Err(ModelServiceError::ArgValidation(vec![format!(
                "no API key configured for llm provider {provider}"
            )]))
        }
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
            .composite_status(model_id, JobType::Train)
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
        self.model_service.logs(model_id, JobType::Train).await
    }

    /// Returns the report with the largest timestamp under
    /// `models/{id}/train_reports/`.
    pub async fn report(
        &self,
        user: &User,
        model_id: &ModelId,
    ) -> Result<serde_json::Value, ModelServiceError> {
        let record = self
            .permission_service
            .require(user, model_id, ModelPermission::Read)
            .await?;
        if record.train_status != ModelStatus::Complete.to_string() {
            return Err(ModelServiceError::TrainingIncomplete(*model_id));
        }

        let namespace = BlobNamespace::Model(*model_id);
        let reports = self
            .blob_storage
            .list(namespace.clone(), Path::new(TRAIN_REPORTS_DIR))
            .await?;

        let latest = reports
            .iter()
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?;
                let timestamp: i64 = stem.parse().ok()?;
                Some((timestamp, path.clone()))
            })
            .max_by_key(|(timestamp, _)| *timestamp);

        let Some((_, path)) = latest else {
            return Err(ModelServiceError::ArgValidation(vec![
                "no training report available".to_string(),
            ]));
        };

        let data = self
            .blob_storage
            .get(namespace, &path)
            .await?
            .ok_or_else(|| ModelServiceError::Internal("report disappeared".to_string()))?;
        serde_json::from_slice(&data)
            .map_err(|e| ModelServiceError::Internal(format!("invalid report: {e}")))
    }

    /// Job callback: the model id comes from the job-scoped token.
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
            .update_train_status(&model_id.0, &request.status.to_string())
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
                job: JobType::Train.to_string(),
                level: request.level.to_string(),
                message: request.message.clone(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(model_id)
    }

    /// Opens the single CSV of an upload and validates it for the requested
    /// classifier kind: header set equality, and for token classifiers a
    /// per-row source/target length match.
    pub async fn validate_trainable_csv(
        &self,
        user: &User,
        request: &ValidateCsvRequest,
    ) -> Result<CsvValidationResponse, ModelServiceError> {
        self.resolve_upload(user, &request.upload_id).await?;

        let namespace = BlobNamespace::Upload(request.upload_id);
        let files = self.blob_storage.list(namespace.clone(), Path::new("")).await?;
        let csv_files: Vec<_> = files
            .iter()
            .filter(|f| {
                f.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        if csv_files.len() != 1 {
            return Err(ModelServiceError::ArgValidation(vec![format!(
                "upload must contain exactly one CSV file, found {}",
                csv_files.len()
            )]));
        }

        let data = self
            .blob_storage
            .get(namespace, csv_files[0])
            .await?
            .ok_or_else(|| ModelServiceError::Internal("upload file disappeared".to_string()))?;

        let mut reader = csv::Reader::from_reader(data.as_ref());
        let headers = reader
            .headers()
            .map_err(|e| ModelServiceError::ArgValidation(vec![format!("invalid CSV: {e}")]))?
            .clone();
        let header_set: HashSet<&str> = headers.iter().collect();

        let (first, second) = match request.kind {
            TrainableCsvKind::TokenClassifier => ("source", "target"),
            TrainableCsvKind::TextClassifier => ("text", "labels"),
        };
        let expected: HashSet<&str> = [first, second].into_iter().collect();
        if header_set != expected {
            return Err(ModelServiceError::ArgValidation(vec![format!(
                "CSV header must be exactly {{{first}, {second}}}"
            )]));
        }

        let first_idx = headers.iter().position(|h| h == first).unwrap();
        let second_idx = headers.iter().position(|h| h == second).unwrap();

        let mut labels: HashSet<String> = HashSet::new();
        let mut rows = 0u64;
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                ModelServiceError::ArgValidation(vec![format!("invalid CSV row: {e}")])
            })?;
            rows += 1;

            match request.kind {
                TrainableCsvKind::TokenClassifier => {
                    let source = record.get(first_idx).unwrap_or("");
                    let target = record.get(second_idx).unwrap_or("");
                    if source.split(' ').count() != target.split(' ').count() {
                        return Err(ModelServiceError::ArgValidation(vec![format!(
                            "row {}: source and target have a different number of tokens",
                            line + 2
                        )]));
                    }
                    for tag in target.split(' ') {
                        if !tag.is_empty() && tag != "O" {
                            labels.insert(tag.to_string());
                        }
                    }
                }
                TrainableCsvKind::TextClassifier => {
                    for label in record.get(second_idx).unwrap_or("").split(',') {
                        let label = label.trim();
                        if !label.is_empty() {
                            labels.insert(label.to_string());
                        }
                    }
                }
            }
        }

        let mut labels: Vec<String> = labels.into_iter().collect();
        labels.sort();

        Ok(CsvValidationResponse { rows, labels })
    }

    /// Checks a staged document directory: allowed extensions only, and
    /// every category (top-level sub-directory) holds the minimum number of
    /// documents.
    pub async fn verify_doc_dir(
        &self,
        user: &User,
        request: &VerifyDocDirRequest,
    ) -> Result<DocDirReport, ModelServiceError> {
        self.resolve_upload(user, &request.upload_id).await?;

        let namespace = BlobNamespace::Upload(request.upload_id);
        let files = self.blob_storage.list(namespace, Path::new("")).await?;
        if files.is_empty() {
            return Err(ModelServiceError::ArgValidation(vec![
                "upload contains no documents".to_string(),
            ]));
        }

        let mut errors = Vec::new();
        let mut categories: BTreeMap<String, u32> = BTreeMap::new();
        for file in &files {
            let extension = file
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();
            if !DOC_EXTENSIONS.contains(&extension.as_str()) {
                errors.push(format!("unsupported file type: {}", file.display()));
                continue;
            }

            let mut components = file.components();
            let first = components
                .next()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .unwrap_or_default();
            let category = if components.next().is_some() {
                first
            } else {
                String::new()
            };
            *categories.entry(category).or_insert(0) += 1;
        }

        let min_docs = request.min_docs_per_category.unwrap_or(1);
        for (category, count) in &categories {
            if *count < min_docs {
                errors.push(format!(
                    "category {} has {} document(s), {} required",
                    if category.is_empty() { "<root>" } else { category },
                    count,
                    min_docs
                ));
            }
        }

        if !errors.is_empty() {
            return Err(ModelServiceError::ArgValidation(errors));
        }

        Ok(DocDirReport {
            categories: categories
                .into_iter()
                .map(|(name, count)| DocCategory { name, count })
                .collect(),
        })
    }
}

fn to_options<T: Serialize>(options: Option<T>) -> Result<Option<serde_json::Value>, ModelServiceError> {
    options
        .map(|o| serde_json::to_value(o))
        .transpose()
        .map_err(|e| ModelServiceError::Internal(e.to_string()))
}
