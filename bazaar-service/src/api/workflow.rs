use crate::api::{ApiResult, ApiTags};
use crate::model::*;
use crate::service::auth::AuthService;
use crate::service::workflow::WorkflowService;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::recorded_http_api_request;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;
use tracing::Instrument;

pub struct WorkflowApi {
    pub auth_service: Arc<dyn AuthService>,
    pub workflow_service: Arc<WorkflowService>,
}

#[OpenApi(prefix_path = "/workflow", tag = ApiTags::Workflow)]
impl WorkflowApi {
    /// Compose an enterprise-search model
    ///
    /// Bundles a retrieval model with an optional guardrail and classifier;
    /// the composite is complete immediately and never trains.
    #[oai(
        path = "/enterprise-search",
        method = "post",
        operation_id = "enterprise_search"
    )]
    async fn enterprise_search(
        &self,
        data: Json<EnterpriseSearchRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record = recorded_http_api_request!(
            "enterprise_search",
            model_name = data.0.model_name.clone()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.workflow_service
                .enterprise_search(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Compose a knowledge-extraction model from a question catalogue
    #[oai(
        path = "/knowledge-extraction",
        method = "post",
        operation_id = "knowledge_extraction"
    )]
    async fn knowledge_extraction(
        &self,
        data: Json<KnowledgeExtractionRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record = recorded_http_api_request!(
            "knowledge_extraction",
            model_name = data.0.model_name.clone()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.workflow_service
                .knowledge_extraction(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }
}
