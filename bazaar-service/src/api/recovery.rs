use crate::api::{ApiResult, ApiTags};
use crate::model::*;
use crate::service::auth::AuthService;
use crate::service::backup::BackupService;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::recorded_http_api_request;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;
use tracing::Instrument;

pub struct RecoveryApi {
    pub auth_service: Arc<dyn AuthService>,
    pub backup_service: Arc<BackupService>,
}

#[OpenApi(prefix_path = "/recovery", tag = ApiTags::Recovery)]
impl RecoveryApi {
    /// Dispatch a backup job (admin)
    #[oai(path = "/backup", method = "post", operation_id = "dispatch_backup")]
    async fn backup(
        &self,
        data: Json<BackupRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<BackupResponse>> {
        let record = recorded_http_api_request!("dispatch_backup");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.backup_service
                .dispatch(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// List completed backups (admin)
    #[oai(path = "/backups", method = "get", operation_id = "list_backups")]
    async fn backups(&self, token: BazaarSecurityScheme) -> ApiResult<Json<BackupListResponse>> {
        let record = recorded_http_api_request!("list_backups");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.backup_service
                .list(&caller)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }
}
