use bazaar_service_base::storage::blob::{BlobNamespace, BlobStorage};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clients::orchestrator::{JobDescriptor, JobKind, JobResources, Orchestrator};
use crate::config::{OrchestratorConfig, VariablesConfig};
use crate::model::{BackupListResponse, BackupRequest, BackupResponse, User};
use crate::service::ModelServiceError;

pub const BACKUP_CONFIG_FILE: &str = "backup_config.json";

/// Dispatches backup jobs writing to the `backups/` arena, and lists
/// completed backups. Admin only.
pub struct BackupService {
    blob_storage: Arc<dyn BlobStorage>,
    orchestrator: Arc<dyn Orchestrator>,
    orchestrator_config: OrchestratorConfig,
    variables: VariablesConfig,
}

impl BackupService {
    pub fn new(
        blob_storage: Arc<dyn BlobStorage>,
        orchestrator: Arc<dyn Orchestrator>,
        orchestrator_config: OrchestratorConfig,
        variables: VariablesConfig,
    ) -> Self {
        Self {
            blob_storage,
            orchestrator,
            orchestrator_config,
            variables,
        }
    }

    fn require_admin(user: &User) -> Result<(), ModelServiceError> {
        if user.is_admin {
            Ok(())
        } else {
            Err(ModelServiceError::Unauthorized(
                "backups require an admin".to_string(),
            ))
        }
    }

    pub async fn dispatch(
        &self,
        user: &User,
        request: &BackupRequest,
    ) -> Result<BackupResponse, ModelServiceError> {
        Self::require_admin(user)?;

        self.blob_storage
            .put(
                BlobNamespace::Root,
                Path::new(BACKUP_CONFIG_FILE),
                &serde_json::to_vec_pretty(request)
                    .map_err(|e| ModelServiceError::Internal(e.to_string()))?,
            )
            .await?;

        let job_name = format!("backup-{}", Uuid::new_v4());
        let mut env = BTreeMap::new();
        env.insert(
            "MODEL_BAZAAR_ENDPOINT".to_string(),
            self.variables.model_bazaar_endpoint.to_string(),
        );
        env.insert(
            "BACKUP_CONFIG_PATH".to_string(),
            self.blob_storage
                .location()
                .join(BACKUP_CONFIG_FILE)
                .to_string_lossy()
                .to_string(),
        );
        for (key, value) in self.variables.cloud_credentials.as_env() {
            env.insert(key, value);
        }

        let job = JobDescriptor {
            name: job_name.clone(),
            kind: JobKind::Backup,
            docker_image: self.orchestrator_config.backup_image.clone(),
            args: Vec::new(),
            env,
            resources: JobResources {
                cpu_mhz: 1000,
                cores: 1,
                memory_mb: 1000,
                memory_max_mb: 2000,
            },
            count: 1,
            autoscaling_max: 1,
        };
        self.orchestrator.start_job(&job).await?;

        info!(job_name, "Dispatched backup job");
        Ok(BackupResponse { job_name })
    }

    pub async fn list(&self, user: &User) -> Result<BackupListResponse, ModelServiceError> {
        Self::require_admin(user)?;

        let files = self
            .blob_storage
            .list(BlobNamespace::Backups, Path::new(""))
            .await?;
        Ok(BackupListResponse {
            backups: files
                .into_iter()
                .map(|f| f.to_string_lossy().replace('\\', "/"))
                .collect(),
        })
    }
}
