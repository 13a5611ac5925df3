use crate::api::{ApiResult, ApiTags};
use crate::model::DeploymentTarget;
use crate::service::telemetry::TelemetryService;
use bazaar_common::recorded_http_api_request;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;
use tracing::Instrument;

pub struct TelemetryApi {
    pub telemetry_service: Arc<TelemetryService>,
}

#[OpenApi(prefix_path = "/telemetry", tag = ApiTags::Telemetry)]
impl TelemetryApi {
    /// Scrape targets for all deployed model endpoints
    ///
    /// Served without authentication for service-discovery scrapers.
    #[oai(
        path = "/deployment-services",
        method = "get",
        operation_id = "deployment_services"
    )]
    async fn deployment_services(&self) -> ApiResult<Json<Vec<DeploymentTarget>>> {
        let record = recorded_http_api_request!("deployment_services");
        let response = self
            .telemetry_service
            .deployment_services()
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(Json);
        record.result(response)
    }
}
