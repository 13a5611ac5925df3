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

use bazaar_common::model::{ModelId, ModelPermission, UploadId};
use bazaar_common::SafeDisplay;
use bazaar_service_base::repo::RepoError;
use bazaar_service_base::storage::blob::BlobStorageError;

use crate::clients::orchestrator::OrchestratorError;
use crate::service::license::LicenseError;
use crate::service::token::TokenError;

pub mod api_key;
pub mod auth;
pub mod backup;
pub mod deploy;
pub mod identity;
pub mod license;
pub mod model;
pub mod permission;
pub mod reconciler;
pub mod team;
pub mod telemetry;
pub mod token;
pub mod train;
pub mod user;
pub mod workflow;

/// Error taxonomy shared by the lifecycle, training, deployment and
/// workflow services; the API layer maps each variant to a status code.
#[derive(Debug, thiserror::Error)]
pub enum ModelServiceError {
    #[error("Invalid request: {}", .0.join(", "))]
    ArgValidation(Vec<String>),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Account unauthorized to perform this action on model {model_id}, requires {required}")]
    Forbidden {
        model_id: ModelId,
        required: ModelPermission,
    },
    #[error("Model not found: {0}")]
    ModelNotFound(ModelId),
    #[error("Upload not found: {0}")]
    UploadNotFound(UploadId),
    #[error("Model with name {0} already exists")]
    DuplicateModelName(String),
    #[error("Model is used as a dependency by {used_by} model(s)")]
    DeletionBlocked { used_by: i64 },
    #[error("Model is the base of {children} actively training model(s)")]
    DeletionBlockedByTraining { children: i64 },
    #[error("Model is required by deployed model(s): {}", .0.join(", "))]
    StopBlocked(Vec<String>),
    #[error("Training of model {0} is not complete")]
    TrainingIncomplete(ModelId),
    #[error("Upload is missing chunk {0}")]
    MissingChunk(u64),
    #[error("Model {0} has no archive")]
    ArchiveNotFound(ModelId),
    #[error("Insufficient storage")]
    InsufficientStorage,
    #[error(transparent)]
    LicenseError(LicenseError),
    #[error("Invalid scoped token: {0}")]
    InvalidToken(String),
    #[error(transparent)]
    InternalRepoError(#[from] RepoError),
    #[error(transparent)]
    InternalStorageError(#[from] BlobStorageError),
    #[error(transparent)]
    InternalOrchestratorError(#[from] OrchestratorError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SafeDisplay for ModelServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            ModelServiceError::ArgValidation(_) => self.to_string(),
            ModelServiceError::Unauthorized(_) => self.to_string(),
            ModelServiceError::Forbidden { .. } => self.to_string(),
            ModelServiceError::ModelNotFound(_) => self.to_string(),
            ModelServiceError::UploadNotFound(_) => self.to_string(),
            ModelServiceError::DuplicateModelName(_) => self.to_string(),
            ModelServiceError::DeletionBlocked { .. } => self.to_string(),
            ModelServiceError::DeletionBlockedByTraining { .. } => self.to_string(),
            ModelServiceError::StopBlocked(_) => self.to_string(),
            ModelServiceError::TrainingIncomplete(_) => self.to_string(),
            ModelServiceError::MissingChunk(_) => self.to_string(),
            ModelServiceError::ArchiveNotFound(_) => self.to_string(),
            ModelServiceError::InsufficientStorage => self.to_string(),
            ModelServiceError::LicenseError(inner) => inner.to_safe_string(),
            ModelServiceError::InvalidToken(_) => self.to_string(),
            ModelServiceError::InternalRepoError(inner) => inner.to_safe_string(),
            ModelServiceError::InternalStorageError(inner) => inner.to_safe_string(),
            ModelServiceError::InternalOrchestratorError(inner) => inner.to_safe_string(),
            ModelServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

impl From<TokenError> for ModelServiceError {
    fn from(error: TokenError) -> Self {
        ModelServiceError::InvalidToken(error.to_string())
    }
}

impl From<LicenseError> for ModelServiceError {
    fn from(error: LicenseError) -> Self {
        ModelServiceError::LicenseError(error)
    }
}
