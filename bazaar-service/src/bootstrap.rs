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

use bazaar_common::config::DbConfig;
use bazaar_service_base::db::{create_postgres_pool, create_sqlite_pool};
use bazaar_service_base::storage::blob::BlobStorage;
use bazaar_service_base::storage::fs::FileSystemBlobStorage;
use bazaar_service_base::storage::memory::InMemoryBlobStorage;
use std::sync::Arc;
use tracing::info;

use crate::clients::orchestrator::{NomadOrchestrator, Orchestrator};
use crate::config::{BazaarServiceConfig, BlobStorageConfig};
use crate::repo;
use crate::service;
use crate::service::api_key::{ApiKeyService, ApiKeyServiceDefault};
use crate::service::auth::{AuthService, AuthServiceDefault};
use crate::service::backup::BackupService;
use crate::service::deploy::DeployService;
use crate::service::identity::{IdentityError, IdentityProvider, LocalIdentityProvider};
use crate::service::license::{
    LicenseVerifier, SignedLicenseVerifier, UnlimitedLicenseVerifier,
};
use crate::service::model::ModelService;
use crate::service::permission::PermissionService;
use crate::service::reconciler::Reconciler;
use crate::service::team::TeamService;
use crate::service::telemetry::TelemetryService;
use crate::service::train::TrainService;
use crate::service::user::UserService;
use crate::service::workflow::WorkflowService;

#[derive(Clone)]
pub struct Services {
    pub auth_service: Arc<dyn AuthService>,
    pub user_service: Arc<UserService>,
    pub team_service: Arc<TeamService>,
    pub model_service: Arc<ModelService>,
    pub train_service: Arc<TrainService>,
    pub deploy_service: Arc<DeployService>,
    pub workflow_service: Arc<WorkflowService>,
    pub api_key_service: Arc<dyn ApiKeyService>,
    pub backup_service: Arc<BackupService>,
    pub telemetry_service: Arc<TelemetryService>,
    pub reconciler: Arc<Reconciler>,
}

impl Services {
    pub async fn new(config: &BazaarServiceConfig) -> Result<Self, String> {
        let blob_storage: Arc<dyn BlobStorage> = match &config.blob_storage {
            BlobStorageConfig::LocalFileSystem(fs_config) => Arc::new(
                FileSystemBlobStorage::new(&fs_config.root)
                    .await
                    .map_err(|e| e.to_string())?,
            ),
            BlobStorageConfig::InMemory(_) => Arc::new(InMemoryBlobStorage::new()),
        };

        let orchestrator: Arc<dyn Orchestrator> =
            Arc::new(NomadOrchestrator::new(&config.orchestrator));

        let (user_repo, team_repo, model_repo, upload_repo, api_key_repo, job_log_repo) =
            match config.db.clone() {
                DbConfig::Postgres(db_config) => {
                    let db_pool = Arc::new(
                        create_postgres_pool(&db_config)
                            .await
                            .map_err(|e| e.to_string())?,
                    );

                    let user_repo: Arc<dyn repo::user::UserRepo + Sync + Send> =
                        Arc::new(repo::user::DbUserRepo::new(db_pool.clone()));
                    let team_repo: Arc<dyn repo::team::TeamRepo + Sync + Send> =
                        Arc::new(repo::team::DbTeamRepo::new(db_pool.clone()));
                    let model_repo: Arc<dyn repo::model::ModelRepo + Sync + Send> =
                        Arc::new(repo::model::DbModelRepo::new(db_pool.clone()));
                    let upload_repo: Arc<dyn repo::upload::UploadRepo + Sync + Send> =
                        Arc::new(repo::upload::DbUploadRepo::new(db_pool.clone()));
                    let api_key_repo: Arc<dyn repo::api_key::ApiKeyRepo + Sync + Send> =
                        Arc::new(repo::api_key::DbApiKeyRepo::new(db_pool.clone()));
                    let job_log_repo: Arc<dyn repo::job_log::JobLogRepo + Sync + Send> =
                        Arc::new(repo::job_log::DbJobLogRepo::new(db_pool.clone()));
                    (
                        user_repo,
                        team_repo,
                        model_repo,
                        upload_repo,
                        api_key_repo,
                        job_log_repo,
                    )
                }
                DbConfig::Sqlite(db_config) => {
                    let db_pool = Arc::new(
                        create_sqlite_pool(&db_config)
                            .await
                            .map_err(|e| e.to_string())?,
                    );

                    let user_repo: Arc<dyn repo::user::UserRepo + Sync + Send> =
                        Arc::new(repo::user::DbUserRepo::new(db_pool.clone()));
                    let team_repo: Arc<dyn repo::team::TeamRepo + Sync + Send> =
                        Arc::new(repo::team::DbTeamRepo::new(db_pool.clone()));
                    let model_repo: Arc<dyn repo::model::ModelRepo + Sync + Send> =
                        Arc::new(repo::model::DbModelRepo::new(db_pool.clone()));
                    let upload_repo: Arc<dyn repo::upload::UploadRepo + Sync + Send> =
                        Arc::new(repo::upload::DbUploadRepo::new(db_pool.clone()));
                    let api_key_repo: Arc<dyn repo::api_key::ApiKeyRepo + Sync + Send> =
                        Arc::new(repo::api_key::DbApiKeyRepo::new(db_pool.clone()));
                    let job_log_repo: Arc<dyn repo::job_log::JobLogRepo + Sync + Send> =
                        Arc::new(repo::job_log::DbJobLogRepo::new(db_pool.clone()));
                    (
                        user_repo,
                        team_repo,
                        model_repo,
                        upload_repo,
                        api_key_repo,
                        job_log_repo,
                    )
                }
            };

        let token_service = Arc::new(
            service::token::ScopedTokenService::new(&config.tokens)?,
        );

        let identity_provider: Arc<dyn IdentityProvider> = Arc::new(
            LocalIdentityProvider::new(&config.identity, user_repo.clone())?,
        );

        let license_verifier: Arc<dyn LicenseVerifier> =
            if config.license.license_key.is_empty() && config.variables.is_local {
                Arc::new(UnlimitedLicenseVerifier)
            } else {
                Arc::new(SignedLicenseVerifier::new(
                    &config.license,
                    orchestrator.clone(),
                )?)
            };

        let permission_service = Arc::new(PermissionService::new(
            model_repo.clone(),
            team_repo.clone(),
        ));

        let api_key_service: Arc<dyn ApiKeyService> = Arc::new(ApiKeyServiceDefault::new(
            api_key_repo.clone(),
            user_repo.clone(),
            permission_service.clone(),
        ));

        let auth_service: Arc<dyn AuthService> = Arc::new(AuthServiceDefault::new(
            identity_provider.clone(),
            api_key_service.clone(),
        ));

        let model_service = Arc::new(ModelService::new(
            model_repo.clone(),
            user_repo.clone(),
            team_repo.clone(),
            job_log_repo.clone(),
            blob_storage.clone(),
            token_service.clone(),
            orchestrator.clone(),
            permission_service.clone(),
        ));

        let train_service = Arc::new(TrainService::new(
            model_repo.clone(),
            upload_repo.clone(),
            job_log_repo.clone(),
            blob_storage.clone(),
            token_service.clone(),
            license_verifier.clone(),
            orchestrator.clone(),
            permission_service.clone(),
            model_service.clone(),
            config.orchestrator.clone(),
            config.variables.clone(),
        ));

        let deploy_service = Arc::new(DeployService::new(
            model_repo.clone(),
            job_log_repo.clone(),
            blob_storage.clone(),
            token_service.clone(),
            license_verifier.clone(),
            orchestrator.clone(),
            permission_service.clone(),
            model_service.clone(),
            config.orchestrator.clone(),
            config.variables.clone(),
        ));

        let workflow_service = Arc::new(WorkflowService::new(
            model_repo.clone(),
            blob_storage.clone(),
            permission_service.clone(),
            model_service.clone(),
            config.variables.llm_providers.keys().cloned().collect(),
        ));

        let user_service = Arc::new(UserService::new(
            identity_provider.clone(),
            user_repo.clone(),
            team_repo.clone(),
        ));

        let team_service = Arc::new(TeamService::new(
            team_repo.clone(),
            user_repo.clone(),
            model_repo.clone(),
            permission_service.clone(),
            model_service.clone(),
        ));

        let backup_service = Arc::new(BackupService::new(
            blob_storage.clone(),
            orchestrator.clone(),
            config.orchestrator.clone(),
            config.variables.clone(),
        ));

        let telemetry_service = Arc::new(TelemetryService::new(orchestrator.clone()));

        let reconciler = Arc::new(Reconciler::new(
            model_repo.clone(),
            orchestrator.clone(),
            config.reconciler.tick,
        ));

        let services = Self {
            auth_service,
            user_service,
            team_service,
            model_service,
            train_service,
            deploy_service,
            workflow_service,
            api_key_service,
            backup_service,
            telemetry_service,
            reconciler,
        };

        services
            .create_bootstrap_admin(config, identity_provider, user_repo)
            .await?;

        Ok(services)
    }

    async fn create_bootstrap_admin(
        &self,
        config: &BazaarServiceConfig,
        identity_provider: Arc<dyn IdentityProvider>,
        user_repo: Arc<dyn repo::user::UserRepo + Sync + Send>,
    ) -> Result<(), String> {
        let Some(admin) = &config.identity.bootstrap_admin else {
            return Ok(());
        };

        match identity_provider
            .create_user(&admin.username, &admin.email, &admin.password, true)
            .await
        {
            Ok(user) => {
                user_repo
                    .set_verified(&user.id.0, true)
                    .await
                    .map_err(|e| e.to_string())?;
                info!(username = admin.username, "Created bootstrap admin");
                Ok(())
            }
            // idempotent across restarts
            Err(IdentityError::AlreadyExists(_)) => Ok(()),
            Err(other) => Err(other.to_string()),
        }
    }
}
