use crate::api::{ApiResult, ApiTags};
use crate::model::*;
use crate::service::auth::AuthService;
use crate::service::deploy::DeployService;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::model::ModelId;
use bazaar_common::recorded_http_api_request;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;
use tracing::Instrument;

pub struct DeployApi {
    pub auth_service: Arc<dyn AuthService>,
    pub deploy_service: Arc<DeployService>,
}

#[OpenApi(prefix_path = "/deploy", tag = ApiTags::Deploy)]
impl DeployApi {
    /// Deploy a model and its dependency closure
    ///
    /// A no-op when the model is already starting, running or deployed.
    #[oai(path = "/:model_id", method = "post", operation_id = "deploy_model")]
    async fn deploy(
        &self,
        model_id: Path<ModelId>,
        data: Json<DeployRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<StatusResponse>> {
        let record = recorded_http_api_request!("deploy_model", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.deploy_service
                .deploy(&caller, &model_id.0, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Stop a deployment
    ///
    /// Rejected while deployed models still depend on this one.
    #[oai(path = "/:model_id", method = "delete", operation_id = "stop_deployment")]
    async fn stop(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record =
            recorded_http_api_request!("stop_deployment", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.deploy_service
                .stop(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Aggregated deployment status over the model and its dependencies
    #[oai(
        path = "/:model_id/status",
        method = "get",
        operation_id = "deploy_status"
    )]
    async fn status(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<StatusResponse>> {
        let record = recorded_http_api_request!("deploy_status", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.deploy_service
                .status(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Deployment job logs of the model and its dependencies
    #[oai(path = "/:model_id/logs", method = "get", operation_id = "deploy_logs")]
    async fn logs(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<LogsResponse>> {
        let record = recorded_http_api_request!("deploy_logs", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.deploy_service
                .logs(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Status callback from a running deployment job (job token)
    #[oai(
        path = "/update-status",
        method = "post",
        operation_id = "deploy_update_status"
    )]
    async fn update_status(
        &self,
        data: Json<StatusUpdateRequest>,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("deploy_update_status");
        let response = self
            .deploy_service
            .update_status(&data.0)
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(|_| Json(DeleteResponse {}));
        record.result(response)
    }

    /// Log callback from a running deployment job (job token)
    #[oai(path = "/log", method = "post", operation_id = "deploy_log")]
    async fn log(&self, data: Json<JobLogRequest>) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("deploy_log");
        let response = self
            .deploy_service
            .log(&data.0)
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(|_| Json(DeleteResponse {}));
        record.result(response)
    }
}
