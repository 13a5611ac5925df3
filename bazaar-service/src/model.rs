use bazaar_common::model::*;
use chrono::Utc;
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct TeamMembership {
    pub team_id: TeamId,
    pub team_name: String,
    pub is_team_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UserInfo {
    pub user: User,
    pub teams: Vec<TeamMembership>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct TeamMember {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub is_team_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct ModelAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    /// Unknown while an archive upload is still in progress.
    pub model_type: Option<ModelType>,
    pub owner_id: UserId,
    pub team_id: Option<TeamId>,
    pub access: ModelAccess,
    pub default_permission: DefaultPermission,
    pub train_status: ModelStatus,
    pub deploy_status: ModelStatus,
    pub base_model_id: Option<ModelId>,
    pub published_date: chrono::DateTime<Utc>,
    pub attributes: Vec<ModelAttribute>,
    pub dependencies: Vec<ModelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model: Model,
    /// The caller's resolved permission on this model.
    pub permission: ModelPermission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct ModelPermissionEntry {
    pub user_id: UserId,
    pub username: String,
    pub permission: ModelPermission,
}

/// Aggregated status over a model and its transitive dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct StatusResponse {
    pub model_id: ModelId,
    pub status: ModelStatus,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct JobLogEntry {
    pub model_id: ModelId,
    pub job: JobType,
    pub level: JobLogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct LogsResponse {
    pub model_id: ModelId,
    pub logs: Vec<JobLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct Upload {
    pub id: UploadId,
    pub user_id: UserId,
    pub upload_date: chrono::DateTime<Utc>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UploadStartRequest {
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UploadStartResponse {
    pub model_id: ModelId,
    /// Upload-scoped token accepted by the chunk and commit endpoints for
    /// the next ten minutes.
    pub token: TokenSecret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UploadCommitResponse {
    pub model_id: ModelId,
    pub model_type: ModelType,
}

/// `metadata.json` embedded in uploaded model archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    #[serde(rename = "Type")]
    pub model_type: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UpdateAccessRequest {
    pub access: ModelAccess,
    pub team_id: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct UpdateDefaultPermissionRequest {
    pub default_permission: DefaultPermission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub name: String,
    pub prefix: String,
    pub creator_id: UserId,
    pub expires_at: chrono::DateTime<Utc>,
    pub created_at: chrono::DateTime<Utc>,
    pub model_ids: Vec<ModelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub model_ids: Vec<ModelId>,
    pub expires_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct CreatedApiKey {
    pub api_key: ApiKey,
    /// The full `prefix.secret` value; only returned once at creation.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct DeleteApiKeyRequest {
    pub api_key_id: ApiKeyId,
}

/// Resource hints forwarded to the orchestrator job descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object, Default)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct JobOptions {
    pub cpu_usage_mhz: Option<i64>,
    pub allocation_cores: Option<i64>,
    pub allocation_memory_mb: Option<i64>,
    pub allocation_memory_max_mb: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object, Default)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NdbOptions {
    pub retriever: Option<String>,
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object, Default)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NlpTokenOptions {
    pub target_labels: Vec<String>,
    pub source_column: Option<String>,
    pub target_column: Option<String>,
    pub default_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object, Default)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NlpTextOptions {
    pub text_column: Option<String>,
    pub label_column: Option<String>,
    pub n_target_classes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NlpDatagenOptions {
    pub task_prompt: String,
    pub llm_provider: Option<String>,
    pub samples_per_label: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NdbTrainRequest {
    pub model_name: String,
    pub base_model_id: Option<ModelId>,
    pub model_options: Option<NdbOptions>,
    pub upload_ids: Vec<UploadId>,
    pub job_options: Option<JobOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NlpTokenTrainRequest {
    pub model_name: String,
    pub base_model_id: Option<ModelId>,
    pub model_options: Option<NlpTokenOptions>,
    pub upload_ids: Vec<UploadId>,
    pub job_options: Option<JobOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NlpTextTrainRequest {
    pub model_name: String,
    pub base_model_id: Option<ModelId>,
    pub model_options: Option<NlpTextOptions>,
    pub upload_ids: Vec<UploadId>,
    pub job_options: Option<JobOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct NlpDatagenTrainRequest {
    pub model_name: String,
    pub model_options: NlpDatagenOptions,
    pub job_options: Option<JobOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct RetrainRequest {
    pub model_name: String,
    pub base_model_id: ModelId,
    pub upload_ids: Vec<UploadId>,
    pub job_options: Option<JobOptions>,
}

/// Status callback sent by a running job, authenticated by its job-scoped
/// token. The model id comes from the token, never from the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub token: TokenSecret,
    pub status: ModelStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct JobLogRequest {
    pub token: TokenSecret,
    pub level: JobLogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum TrainableCsvKind {
    TokenClassifier,
    TextClassifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct ValidateCsvRequest {
    pub upload_id: UploadId,
    pub kind: TrainableCsvKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct CsvValidationResponse {
    pub rows: u64,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct VerifyDocDirRequest {
    pub upload_id: UploadId,
    pub min_docs_per_category: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct DocCategory {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct DocDirReport {
    pub categories: Vec<DocCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object, Default)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Only applied to the root model; dependencies keep generated names.
    pub deployment_name: Option<String>,
    pub autoscaling_max: Option<u32>,
    pub job_options: Option<JobOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct EnterpriseSearchRequest {
    pub model_name: String,
    pub retrieval_id: ModelId,
    pub guardrail_id: Option<ModelId>,
    pub classifier_id: Option<ModelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct KnowledgeQuestion {
    pub question: String,
    #[serde(default)]
    #[oai(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct KnowledgeExtractionRequest {
    pub model_name: String,
    pub questions: Vec<KnowledgeQuestion>,
    pub llm_provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct BackupRequest {
    pub provider: Option<String>,
    pub interval_minutes: Option<u64>,
    pub backup_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct BackupResponse {
    pub job_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct BackupListResponse {
    pub backups: Vec<String>,
}

/// One scrape target of a deployed model endpoint, in the shape consumed by
/// service-discovery configs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct DeploymentTarget {
    pub targets: Vec<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: TokenSecret,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
pub struct HealthcheckResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Object)]
pub struct DeleteResponse {}
