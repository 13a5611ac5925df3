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

use crate::bootstrap::Services;
use crate::service::auth::AuthServiceError;
use crate::service::identity::IdentityError;
use crate::service::license::LicenseError;
use crate::service::team::TeamServiceError;
use crate::service::user::UserServiceError;
use crate::service::ModelServiceError;
use bazaar_common::metrics::TraceErrorKind;
use bazaar_common::model::{ErrorBody, ErrorsBody};
use bazaar_common::SafeDisplay;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, OpenApiService, Tags};

mod deploy;
mod healthcheck;
mod model;
mod recovery;
mod team;
mod telemetry;
mod train;
mod user;
mod workflow;

#[derive(Tags)]
pub enum ApiTags {
    User,
    Team,
    Model,
    Train,
    Deploy,
    Workflow,
    Recovery,
    Telemetry,
    HealthCheck,
}

#[derive(ApiResponse, Debug, Clone)]
pub enum ApiError {
    /// Invalid request, returning with a list of issues detected in the request
    #[oai(status = 400)]
    BadRequest(Json<ErrorsBody>),
    /// Unauthorized request
    #[oai(status = 401)]
    Unauthorized(Json<ErrorBody>),
    /// Forbidden request
    #[oai(status = 403)]
    Forbidden(Json<ErrorBody>),
    /// Entity not found
    #[oai(status = 404)]
    NotFound(Json<ErrorBody>),
    #[oai(status = 409)]
    Conflict(Json<ErrorBody>),
    /// Semantic precondition failed
    #[oai(status = 422)]
    UnprocessableEntity(Json<ErrorBody>),
    /// Internal server error
    #[oai(status = 500)]
    InternalError(Json<ErrorBody>),
    /// Free storage below the configured floor
    #[oai(status = 507)]
    InsufficientStorage(Json<ErrorBody>),
}

impl ApiError {
    fn unauthorized(error: impl Into<String>) -> Self {
        ApiError::Unauthorized(Json(ErrorBody {
            error: error.into(),
        }))
    }

    fn unprocessable(error: impl Into<String>) -> Self {
        ApiError::UnprocessableEntity(Json(ErrorBody {
            error: error.into(),
        }))
    }

    fn internal(error: impl Into<String>) -> Self {
        ApiError::InternalError(Json(ErrorBody {
            error: error.into(),
        }))
    }
}

impl TraceErrorKind for ApiError {
    fn trace_error_kind(&self) -> &'static str {
        match &self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::UnprocessableEntity(_) => "UnprocessableEntity",
            ApiError::InternalError(_) => "InternalError",
            ApiError::InsufficientStorage(_) => "InsufficientStorage",
        }
    }

    fn is_expected(&self) -> bool {
        !matches!(self, ApiError::InternalError(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AuthServiceError> for ApiError {
    fn from(value: AuthServiceError) -> Self {
        match value {
            AuthServiceError::Unauthorized(_) => ApiError::unauthorized(value.to_safe_string()),
            AuthServiceError::Internal(_) => ApiError::internal(value.to_safe_string()),
        }
    }
}

impl From<ModelServiceError> for ApiError {
    fn from(value: ModelServiceError) -> Self {
        match &value {
            ModelServiceError::ArgValidation(errors) => ApiError::BadRequest(Json(ErrorsBody {
                errors: errors.clone(),
            })),
            ModelServiceError::Unauthorized(_) | ModelServiceError::InvalidToken(_) => {
                ApiError::unauthorized(value.to_safe_string())
            }
            ModelServiceError::Forbidden { .. } => ApiError::Forbidden(Json(ErrorBody {
                error: value.to_safe_string(),
            })),
            ModelServiceError::ModelNotFound(_)
            | ModelServiceError::UploadNotFound(_)
            | ModelServiceError::ArchiveNotFound(_) => ApiError::NotFound(Json(ErrorBody {
                error: value.to_safe_string(),
            })),
            ModelServiceError::DuplicateModelName(_) => ApiError::Conflict(Json(ErrorBody {
                error: value.to_safe_string(),
            })),
            ModelServiceError::DeletionBlocked { .. }
            | ModelServiceError::DeletionBlockedByTraining { .. }
            | ModelServiceError::StopBlocked(_)
            | ModelServiceError::TrainingIncomplete(_) => {
                ApiError::unprocessable(value.to_safe_string())
            }
            ModelServiceError::MissingChunk(_) => ApiError::BadRequest(Json(ErrorsBody {
                errors: vec![value.to_safe_string()],
            })),
            ModelServiceError::InsufficientStorage => {
                ApiError::InsufficientStorage(Json(ErrorBody {
                    error: value.to_safe_string(),
                }))
            }
            ModelServiceError::LicenseError(inner) => match inner {
                LicenseError::CapacityExceeded { .. } | LicenseError::InvalidLicense(_) => {
                    ApiError::unprocessable(value.to_safe_string())
                }
                LicenseError::InternalOrchestratorError(_) => {
                    ApiError::internal(value.to_safe_string())
                }
            },
            ModelServiceError::InternalRepoError(_)
            | ModelServiceError::InternalStorageError(_)
            | ModelServiceError::InternalOrchestratorError(_)
            | ModelServiceError::Internal(_) => ApiError::internal(value.to_safe_string()),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(value: UserServiceError) -> Self {
        match &value {
            UserServiceError::AdminRequired => ApiError::Forbidden(Json(ErrorBody {
                error: value.to_safe_string(),
            })),
            UserServiceError::UserNotFound(_) => ApiError::NotFound(Json(ErrorBody {
                error: value.to_safe_string(),
            })),
            UserServiceError::LastAdmin => ApiError::unprocessable(value.to_safe_string()),
            UserServiceError::IdentityError(inner) => match inner {
                IdentityError::InvalidCredentials | IdentityError::InvalidToken(_) => {
                    ApiError::unauthorized(value.to_safe_string())
                }
                IdentityError::UserNotFound(_) => ApiError::NotFound(Json(ErrorBody {
                    error: value.to_safe_string(),
                })),
                IdentityError::AlreadyExists(_) => ApiError::Conflict(Json(ErrorBody {
                    error: value.to_safe_string(),
                })),
                IdentityError::ArgValidation(errors) => ApiError::BadRequest(Json(ErrorsBody {
                    errors: errors.clone(),
                })),
                IdentityError::InternalRepoError(_) | IdentityError::Internal(_) => {
                    ApiError::internal(value.to_safe_string())
                }
            },
            UserServiceError::InternalRepoError(_) => ApiError::internal(value.to_safe_string()),
        }
    }
}

impl From<TeamServiceError> for ApiError {
    fn from(value: TeamServiceError) -> Self {
        match &value {
            TeamServiceError::ArgValidation(errors) => ApiError::BadRequest(Json(ErrorsBody {
                errors: errors.clone(),
            })),
            TeamServiceError::TeamAdminRequired | TeamServiceError::MembershipRequired => {
                ApiError::Forbidden(Json(ErrorBody {
                    error: value.to_safe_string(),
                }))
            }
            TeamServiceError::TeamNotFound(_) | TeamServiceError::UserNotFound(_) => {
                ApiError::NotFound(Json(ErrorBody {
                    error: value.to_safe_string(),
                }))
            }
            TeamServiceError::AlreadyExists(_) => ApiError::Conflict(Json(ErrorBody {
                error: value.to_safe_string(),
            })),
            TeamServiceError::LastTeamAdmin | TeamServiceError::TeamNotEmpty => {
                ApiError::unprocessable(value.to_safe_string())
            }
            TeamServiceError::InternalRepoError(_) | TeamServiceError::InternalModelError(_) => {
                ApiError::internal(value.to_safe_string())
            }
        }
    }
}

pub type Apis = (
    user::UserApi,
    team::TeamApi,
    model::ModelApi,
    train::TrainApi,
    deploy::DeployApi,
    workflow::WorkflowApi,
    recovery::RecoveryApi,
    telemetry::TelemetryApi,
    healthcheck::HealthcheckApi,
);

pub fn make_open_api_service(services: &Services) -> OpenApiService<Apis, ()> {
    OpenApiService::new(
        (
            user::UserApi {
                auth_service: services.auth_service.clone(),
                user_service: services.user_service.clone(),
            },
            team::TeamApi {
                auth_service: services.auth_service.clone(),
                team_service: services.team_service.clone(),
            },
            model::ModelApi {
                auth_service: services.auth_service.clone(),
                model_service: services.model_service.clone(),
                api_key_service: services.api_key_service.clone(),
            },
            train::TrainApi {
                auth_service: services.auth_service.clone(),
                train_service: services.train_service.clone(),
            },
            deploy::DeployApi {
                auth_service: services.auth_service.clone(),
                deploy_service: services.deploy_service.clone(),
            },
            workflow::WorkflowApi {
                auth_service: services.auth_service.clone(),
                workflow_service: services.workflow_service.clone(),
            },
            recovery::RecoveryApi {
                auth_service: services.auth_service.clone(),
                backup_service: services.backup_service.clone(),
            },
            telemetry::TelemetryApi {
                telemetry_service: services.telemetry_service.clone(),
            },
            healthcheck::HealthcheckApi,
        ),
        "Model Bazaar API",
        "1.0",
    )
}
