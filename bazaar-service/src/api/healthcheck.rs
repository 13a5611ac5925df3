use crate::api::ApiTags;
use crate::model::HealthcheckResponse;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

pub struct HealthcheckApi;

#[OpenApi(prefix_path = "/", tag = ApiTags::HealthCheck)]
impl HealthcheckApi {
    #[oai(path = "/health", method = "get", operation_id = "healthcheck")]
    async fn healthcheck(&self) -> Json<HealthcheckResponse> {
        Json(HealthcheckResponse {})
    }
}
