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

use async_trait::async_trait;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::model::ModelId;
use bazaar_common::SafeDisplay;
use std::sync::Arc;

use crate::model::User;
use crate::service::api_key::ApiKeyService;
use crate::service::identity::{IdentityError, IdentityProvider};
use crate::service::ModelServiceError;

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SafeDisplay for AuthServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            AuthServiceError::Unauthorized(_) => self.to_string(),
            AuthServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

impl From<IdentityError> for AuthServiceError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::InvalidCredentials
            | IdentityError::InvalidToken(_)
            | IdentityError::UserNotFound(_) => {
                AuthServiceError::Unauthorized(error.to_safe_string())
            }
            other => AuthServiceError::Internal(other.to_safe_string()),
        }
    }
}

impl From<ModelServiceError> for AuthServiceError {
    fn from(error: ModelServiceError) -> Self {
        match &error {
            ModelServiceError::InternalRepoError(_)
            | ModelServiceError::InternalStorageError(_)
            | ModelServiceError::InternalOrchestratorError(_)
            | ModelServiceError::Internal(_) => {
                AuthServiceError::Internal(error.to_safe_string())
            }
            _ => AuthServiceError::Unauthorized(error.to_safe_string()),
        }
    }
}

/// Resolves the request credential to a user: session tokens go through the
/// identity provider; API keys are accepted only on model-scoped endpoints
/// and inject the key creator's identity.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn authenticate(
        &self,
        scheme: &BazaarSecurityScheme,
        model_scope: Option<&ModelId>,
    ) -> Result<User, AuthServiceError>;
}

pub struct AuthServiceDefault {
    identity_provider: Arc<dyn IdentityProvider>,
    api_key_service: Arc<dyn ApiKeyService>,
}

impl AuthServiceDefault {
    pub fn new(
        identity_provider: Arc<dyn IdentityProvider>,
        api_key_service: Arc<dyn ApiKeyService>,
    ) -> Self {
        Self {
            identity_provider,
            api_key_service,
        }
    }
}

#[async_trait]
impl AuthService for AuthServiceDefault {
    async fn authenticate(
        &self,
        scheme: &BazaarSecurityScheme,
        model_scope: Option<&ModelId>,
    ) -> Result<User, AuthServiceError> {
        match scheme {
            BazaarSecurityScheme::Bearer(bearer) => {
                Ok(self.identity_provider.login_with_token(&bearer.0).await?)
            }
            BazaarSecurityScheme::ApiKey(api_key) => {
                let model_id = model_scope.ok_or_else(|| {
                    AuthServiceError::Unauthorized(
                        "API keys are only accepted on model endpoints".to_string(),
                    )
                })?;
                Ok(self
                    .api_key_service
                    .verify(&api_key.0.value, model_id)
                    .await?)
            }
        }
    }
}
