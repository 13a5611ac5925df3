use async_trait::async_trait;
use bazaar_common::model::*;
use bazaar_service_base::db::{create_sqlite_pool, sqlite_migrate};
use bazaar_service_base::storage::memory::InMemoryBlobStorage;
use chrono::Utc;
use sqlx::migrate::Migrator;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use bazaar_common::config::DbSqliteConfig;
use bazaar_service::clients::orchestrator::{
    JobDescriptor, JobInfo, JobState, Orchestrator, OrchestratorError, ServiceEndpoint,
};
use bazaar_service::config::BazaarServiceConfig;
use bazaar_service::model::User;
use bazaar_service::repo;
use bazaar_service::repo::model::{ModelRecord, ModelRepo};
use bazaar_service::service::api_key::{ApiKeyService, ApiKeyServiceDefault};
use bazaar_service::service::auth::{AuthService, AuthServiceDefault};
use bazaar_service::service::deploy::DeployService;
use bazaar_service::service::identity::{IdentityProvider, LocalIdentityProvider};
use bazaar_service::service::license::{LicenseError, LicenseKey, LicenseVerifier, UnlimitedLicenseVerifier};
use bazaar_service::service::model::ModelService;
use bazaar_service::service::permission::PermissionService;
use bazaar_service::service::reconciler::Reconciler;
use bazaar_service::service::team::TeamService;
use bazaar_service::service::token::ScopedTokenService;
use bazaar_service::service::train::TrainService;
use bazaar_service::service::user::UserService;
use bazaar_service::service::workflow::WorkflowService;

mod api_key;
mod dispatch;
mod lifecycle;
mod permission;
mod validation;
mod workflow;

static SQLITE_MIGRATIONS: Migrator = sqlx::migrate!("./db/migration/sqlite");

/// In-process orchestrator double: records submissions and serves job state
/// from a mutable table.
pub struct FakeOrchestrator {
    pub started: Mutex<Vec<JobDescriptor>>,
    pub stopped: Mutex<Vec<String>>,
    pub job_states: Mutex<HashMap<String, JobState>>,
    pub fail_submissions: AtomicBool,
    pub total_cpu: AtomicI64,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            job_states: Mutex::new(HashMap::new()),
            fail_submissions: AtomicBool::new(false),
            total_cpu: AtomicI64::new(0),
        }
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn forget_job(&self, name: &str) {
        self.job_states.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn start_job(&self, job: &JobDescriptor) -> Result<(), OrchestratorError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Request(
                "submission rejected".to_string(),
            ));
        }
        self.started.lock().unwrap().push(job.clone());
        self.job_states
            .lock()
            .unwrap()
            .insert(job.name.clone(), JobState::Running);
        Ok(())
    }

    async fn stop_job(&self, name: &str) -> Result<(), OrchestratorError> {
        self.stopped.lock().unwrap().push(name.to_string());
        self.job_states.lock().unwrap().remove(name);
        Ok(())
    }

    async fn job_info(&self, name: &str) -> Result<Option<JobInfo>, OrchestratorError> {
        Ok(self
            .job_states
            .lock()
            .unwrap()
            .get(name)
            .map(|state| JobInfo {
                name: name.to_string(),
                state: *state,
            }))
    }

    async fn job_logs(&self, _name: &str) -> Result<String, OrchestratorError> {
        Ok(String::new())
    }

    async fn list_services(&self) -> Result<Vec<ServiceEndpoint>, OrchestratorError> {
        Ok(Vec::new())
    }

    async fn total_cpu_usage(&self) -> Result<i64, OrchestratorError> {
        Ok(self.total_cpu.load(Ordering::SeqCst))
    }
}

/// License double with a fixed capacity over a fixed current usage.
pub struct FixedCapacityLicense {
    pub cpu_mhz: i64,
    pub current_mhz: i64,
}

#[async_trait]
impl LicenseVerifier for FixedCapacityLicense {
    async fn verify(&self, requested_mhz: i64) -> Result<LicenseKey, LicenseError> {
        let available = self.cpu_mhz - self.current_mhz;
        if requested_mhz > available {
            return Err(LicenseError::CapacityExceeded {
                requested: requested_mhz,
                available: available.max(0),
            });
        }
        Ok(LicenseKey {
            key: "test-license".to_string(),
            cpu_mhz: self.cpu_mhz,
        })
    }
}

pub struct TestServices {
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub auth_service: Arc<dyn AuthService>,
    pub user_service: Arc<UserService>,
    pub team_service: Arc<TeamService>,
    pub model_service: Arc<ModelService>,
    pub train_service: Arc<TrainService>,
    pub deploy_service: Arc<DeployService>,
    pub workflow_service: Arc<WorkflowService>,
    pub api_key_service: Arc<dyn ApiKeyService>,
    pub permission_service: Arc<PermissionService>,
    pub token_service: Arc<ScopedTokenService>,
    pub reconciler: Arc<Reconciler>,
    pub model_repo: Arc<dyn ModelRepo + Sync + Send>,
    pub upload_repo: Arc<dyn repo::upload::UploadRepo + Sync + Send>,
    pub api_key_repo: Arc<dyn repo::api_key::ApiKeyRepo + Sync + Send>,
    pub blob_storage: Arc<InMemoryBlobStorage>,
    pub orchestrator: Arc<FakeOrchestrator>,
    _db_dir: tempfile::TempDir,
}

impl TestServices {
    pub async fn new() -> Self {
        Self::with_license(Arc::new(UnlimitedLicenseVerifier)).await
    }

    pub async fn with_license(license_verifier: Arc<dyn LicenseVerifier>) -> Self {
        let config = BazaarServiceConfig::default();

        let db_dir = tempfile::tempdir().unwrap();
        let db_config = DbSqliteConfig {
            database: db_dir
                .path()
                .join("bazaar.db")
                .to_string_lossy()
                .to_string(),
            max_connections: 4,
        };
        sqlite_migrate(&db_config, &SQLITE_MIGRATIONS).await.unwrap();
        let db_pool = Arc::new(create_sqlite_pool(&db_config).await.unwrap());

        let user_repo: Arc<dyn repo::user::UserRepo + Sync + Send> =
            Arc::new(repo::user::DbUserRepo::new(db_pool.clone()));
        let team_repo: Arc<dyn repo::team::TeamRepo + Sync + Send> =
            Arc::new(repo::team::DbTeamRepo::new(db_pool.clone()));
        let model_repo: Arc<dyn ModelRepo + Sync + Send> =
            Arc::new(repo::model::DbModelRepo::new(db_pool.clone()));
        let upload_repo: Arc<dyn repo::upload::UploadRepo + Sync + Send> =
            Arc::new(repo::upload::DbUploadRepo::new(db_pool.clone()));
        let api_key_repo: Arc<dyn repo::api_key::ApiKeyRepo + Sync + Send> =
            Arc::new(repo::api_key::DbApiKeyRepo::new(db_pool.clone()));
        let job_log_repo: Arc<dyn repo::job_log::JobLogRepo + Sync + Send> =
            Arc::new(repo::job_log::DbJobLogRepo::new(db_pool.clone()));

        let blob_storage = Arc::new(InMemoryBlobStorage::new());
        let orchestrator = Arc::new(FakeOrchestrator::new());

        let token_service = Arc::new(ScopedTokenService::new(&config.tokens).unwrap());
        let identity_provider: Arc<dyn IdentityProvider> = Arc::new(
            LocalIdentityProvider::new(&config.identity, user_repo.clone()).unwrap(),
        );
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
            vec!["openai".to_string()],
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
        let reconciler = Arc::new(Reconciler::new(
            model_repo.clone(),
            orchestrator.clone(),
            config.reconciler.tick,
        ));

        Self {
            identity_provider,
            auth_service,
            user_service,
            team_service,
            model_service,
            train_service,
            deploy_service,
            workflow_service,
            api_key_service,
            permission_service,
            token_service,
            reconciler,
            model_repo,
            upload_repo,
            api_key_repo,
            blob_storage,
            orchestrator,
            _db_dir: db_dir,
        }
    }

    pub async fn user(&self, name: &str) -> User {
        self.identity_provider
            .create_user(name, &format!("{name}@bazaar.test"), "password123", false)
            .await
            .unwrap()
    }

    pub async fn admin(&self, name: &str) -> User {
        self.identity_provider
            .create_user(name, &format!("{name}@bazaar.test"), "password123", true)
            .await
            .unwrap()
    }

    /// Inserts a fully trained model row directly, as most scenarios start
    /// from one.
    pub async fn complete_model(
        &self,
        owner: &User,
        name: &str,
        model_type: ModelType,
    ) -> ModelId {
        let model_id = ModelId(Uuid::new_v4());
        let record = ModelRecord {
            model_id: model_id.0,
            name: name.to_string(),
            model_type: Some(model_type.to_string()),
            owner_id: owner.id.0,
            team_id: None,
            access: ModelAccess::Private.to_string(),
            default_permission: DefaultPermission::Read.to_string(),
            train_status: ModelStatus::Complete.to_string(),
            deploy_status: ModelStatus::NotStarted.to_string(),
            base_model_id: None,
            published_date: Utc::now(),
        };
        self.model_repo.create(&record, &[], &[]).await.unwrap();
        model_id
    }
}
