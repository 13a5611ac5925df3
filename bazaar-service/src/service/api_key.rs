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
use bazaar_common::model::{ApiKeyId, ModelId, ModelPermission};
use bazaar_service_base::repo::RepoError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::model::{ApiKey, CreateApiKeyRequest, CreatedApiKey, User};
use crate::repo::api_key::{ApiKeyRecord, ApiKeyRepo};
use crate::repo::user::UserRepo;
use crate::service::identity::constant_time_eq;
use crate::service::permission::PermissionService;
use crate::service::ModelServiceError;

const PREFIX_LENGTH: usize = 8;
const SECRET_LENGTH: usize = 40;

/// API keys have the wire format `prefix.secret`; only the secret's sha256
/// is persisted, and a key grants its creator's identity for the scoped
/// model set.
#[async_trait]
pub trait ApiKeyService: Send + Sync {
    async fn create(
        &self,
        user: &User,
        request: &CreateApiKeyRequest,
    ) -> Result<CreatedApiKey, ModelServiceError>;

    async fn verify(&self, key: &str, model_id: &ModelId) -> Result<User, ModelServiceError>;

    async fn list(&self, user: &User) -> Result<Vec<ApiKey>, ModelServiceError>;

    async fn delete(&self, user: &User, api_key_id: &ApiKeyId) -> Result<(), ModelServiceError>;
}

pub struct ApiKeyServiceDefault {
    api_key_repo: Arc<dyn ApiKeyRepo + Sync + Send>,
    user_repo: Arc<dyn UserRepo + Sync + Send>,
    permission_service: Arc<PermissionService>,
}

impl ApiKeyServiceDefault {
    pub fn new(
        api_key_repo: Arc<dyn ApiKeyRepo + Sync + Send>,
        user_repo: Arc<dyn UserRepo + Sync + Send>,
        permission_service: Arc<PermissionService>,
    ) -> Self {
        Self {
            api_key_repo,
            user_repo,
            permission_service,
        }
    }

    fn hash_secret(secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }

    async fn to_api_key(&self, record: ApiKeyRecord) -> Result<ApiKey, RepoError> {
        let model_ids = self.api_key_repo.model_ids(&record.api_key_id).await?;
        Ok(ApiKey {
            id: ApiKeyId(record.api_key_id),
            name: record.name,
            prefix: record.prefix,
            creator_id: bazaar_common::model::UserId(record.user_id),
            expires_at: record.expires_at,
            created_at: record.created_at,
            model_ids: model_ids.into_iter().map(ModelId).collect(),
        })
    }
}

#[async_trait]
impl ApiKeyService for ApiKeyServiceDefault {
    async fn create(
        &self,
        user: &User,
        request: &CreateApiKeyRequest,
    ) -> Result<CreatedApiKey, ModelServiceError> {
        let mut errors = Vec::new();
        if request.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }
        if request.expires_at <= Utc::now() {
            errors.push("expiry must be in the future".to_string());
        }
        if request.model_ids.is_empty() {
            errors.push("at least one model must be in scope".to_string());
        }
        if !errors.is_empty() {
            return Err(ModelServiceError::ArgValidation(errors));
        }

        for model_id in &request.model_ids {
            self.permission_service
                .require(user, model_id, ModelPermission::Read)
                .await?;
        }

        let secret = nanoid::nanoid!(SECRET_LENGTH);
        let model_ids: Vec<Uuid> = request.model_ids.iter().map(|id| id.0).collect();

        // the prefix is tiny, so retry the insert on the rare collision
        let mut attempts = 0;
        let record = loop {
            let record = ApiKeyRecord {
                api_key_id: Uuid::new_v4(),
                name: request.name.clone(),
                prefix: nanoid::nanoid!(PREFIX_LENGTH),
                secret_hash: Self::hash_secret(&secret),
                user_id: user.id.0,
                expires_at: request.expires_at,
                created_at: Utc::now(),
            };

            match self.api_key_repo.create(&record, &model_ids).await {
                Ok(()) => break record,
                Err(RepoError::UniqueViolation(_)) if attempts < 3 => {
                    attempts += 1;
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        };

        let key = format!("{}.{}", record.prefix, secret);
        let api_key = self.to_api_key(record).await?;

        Ok(CreatedApiKey { api_key, key })
    }

    async fn verify(&self, key: &str, model_id: &ModelId) -> Result<User, ModelServiceError> {
        let Some((prefix, secret)) = key.split_once('.') else {
            return Err(ModelServiceError::Unauthorized(
                "Malformed API key".to_string(),
            ));
        };

        let record = self
            .api_key_repo
            .get_by_prefix(prefix)
            .await?
            .ok_or_else(|| ModelServiceError::Unauthorized("Unknown API key".to_string()))?;

        if record.expires_at <= Utc::now() {
            return Err(ModelServiceError::Unauthorized(
                "API key expired".to_string(),
            ));
        }

        let hash = Self::hash_secret(secret);
        if !constant_time_eq(hash.as_bytes(), record.secret_hash.as_bytes()) {
            return Err(ModelServiceError::Unauthorized(
                "Invalid API key".to_string(),
            ));
        }

        let model_ids = self.api_key_repo.model_ids(&record.api_key_id).await?;
        if !model_ids.contains(&model_id.0) {
            return Err(ModelServiceError::Unauthorized(format!(
                "API key does not grant access to model {model_id}"
            )));
        }

        let user = self
            .user_repo
            .get(&record.user_id)
            .await?
            .ok_or_else(|| ModelServiceError::Unauthorized("Unknown key owner".to_string()))?;

        Ok(user.into())
    }

    async fn list(&self, user: &User) -> Result<Vec<ApiKey>, ModelServiceError> {
        let records = self.api_key_repo.list_by_user(&user.id.0).await?;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            keys.push(self.to_api_key(record).await?);
        }
        Ok(keys)
    }

    async fn delete(&self, user: &User, api_key_id: &ApiKeyId) -> Result<(), ModelServiceError> {
        let deleted = self.api_key_repo.delete(&api_key_id.0, &user.id.0).await?;
        if deleted == 0 {
            Err(ModelServiceError::Unauthorized(
                "API key not found".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}
