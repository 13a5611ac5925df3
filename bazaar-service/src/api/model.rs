use crate::api::{ApiResult, ApiTags};
use crate::model::*;
use crate::service::api_key::ApiKeyService;
use crate::service::auth::AuthService;
use crate::service::model::ModelService;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::model::ModelId;
use bazaar_common::recorded_http_api_request;
use poem::Body;
use poem_openapi::param::Path;
use poem_openapi::payload::{Binary, Json};
use poem_openapi::OpenApi;
use std::sync::Arc;
use tracing::Instrument;

pub struct ModelApi {
    pub auth_service: Arc<dyn AuthService>,
    pub model_service: Arc<ModelService>,
    pub api_key_service: Arc<dyn ApiKeyService>,
}

#[OpenApi(prefix_path = "/model", tag = ApiTags::Model)]
impl ModelApi {
    /// All models visible to the caller, annotated with the caller's
    /// permission on each
    #[oai(path = "/list", method = "get", operation_id = "list_models")]
    async fn list(&self, token: BazaarSecurityScheme) -> ApiResult<Json<Vec<ModelInfo>>> {
        let record = recorded_http_api_request!("list_models");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.model_service
                .list(&caller)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Start a chunked model upload
    ///
    /// Creates the model row in `upload_in_progress` and returns a
    /// ten-minute upload token accepted by the chunk and commit endpoints.
    #[oai(path = "/upload", method = "post", operation_id = "upload_start")]
    async fn upload_start(
        &self,
        data: Json<UploadStartRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<UploadStartResponse>> {
        let record =
            recorded_http_api_request!("upload_start", model_name = data.0.model_name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.model_service
                .upload_start(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Upload one archive chunk
    ///
    /// Authenticated by the upload token; repeated indices overwrite.
    #[oai(
        path = "/upload/:chunk_idx",
        method = "post",
        operation_id = "upload_chunk"
    )]
    async fn upload_chunk(
        &self,
        chunk_idx: Path<u64>,
        data: Binary<Vec<u8>>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("upload_chunk", chunk_idx = chunk_idx.0);
        let response = self
            .model_service
            .upload_chunk(token.as_ref(), chunk_idx.0, data.0.into())
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(|_| Json(DeleteResponse {}));
        record.result(response)
    }

    /// Commit a chunked upload
    ///
    /// Requires a contiguous chunk range, combines it into the archive,
    /// unpacks it and applies the embedded `metadata.json`.
    #[oai(
        path = "/upload/commit",
        method = "post",
        operation_id = "upload_commit"
    )]
    async fn upload_commit(
        &self,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<UploadCommitResponse>> {
        let record = recorded_http_api_request!("upload_commit");
        let response = self
            .model_service
            .upload_commit(token.as_ref())
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(Json);
        record.result(response)
    }

    /// Get one model
    #[oai(path = "/:model_id", method = "get", operation_id = "get_model")]
    async fn get(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<ModelInfo>> {
        let record = recorded_http_api_request!("get_model", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.model_service
                .get(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Delete a model
    ///
    /// Rejected while other models depend on it or actively train from it;
    /// stops running jobs and reclaims the blob arenas.
    #[oai(path = "/:model_id", method = "delete", operation_id = "delete_model")]
    async fn delete(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("delete_model", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.model_service
                .delete(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Users with access to the model and their permission levels
    #[oai(
        path = "/:model_id/permissions",
        method = "get",
        operation_id = "model_permissions"
    )]
    async fn permissions(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Vec<ModelPermissionEntry>>> {
        let record =
            recorded_http_api_request!("model_permissions", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.model_service
                .permissions(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Download the model archive
    #[oai(
        path = "/:model_id/download",
        method = "get",
        operation_id = "download_model"
    )]
    async fn download(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Binary<Body>> {
        let record =
            recorded_http_api_request!("download_model", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.model_service
                .download(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|bytes| Binary(Body::from_bytes(bytes)))
        };
        record.result(response)
    }

    /// Change the access level; `protected` requires a team
    #[oai(
        path = "/:model_id/access",
        method = "post",
        operation_id = "update_model_access"
    )]
    async fn update_access(
        &self,
        model_id: Path<ModelId>,
        data: Json<UpdateAccessRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record =
            recorded_http_api_request!("update_model_access", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.model_service
                .update_access(&caller, &model_id.0, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Change the permission granted through public/protected access
    #[oai(
        path = "/:model_id/default-permission",
        method = "post",
        operation_id = "update_default_permission"
    )]
    async fn update_default_permission(
        &self,
        model_id: Path<ModelId>,
        data: Json<UpdateDefaultPermissionRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record = recorded_http_api_request!(
            "update_default_permission",
            model_id = model_id.0.to_string()
        );
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.model_service
                .update_default_permission(&caller, &model_id.0, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Issue an API key scoped to a model set
    ///
    /// The full `prefix.secret` value is only returned here, once.
    #[oai(
        path = "/create-api-key",
        method = "post",
        operation_id = "create_api_key"
    )]
    async fn create_api_key(
        &self,
        data: Json<CreateApiKeyRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<CreatedApiKey>> {
        let record = recorded_http_api_request!("create_api_key", key_name = data.0.name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.api_key_service
                .create(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Delete an API key created by the caller
    #[oai(
        path = "/delete-api-key",
        method = "post",
        operation_id = "delete_api_key"
    )]
    async fn delete_api_key(
        &self,
        data: Json<DeleteApiKeyRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!(
            "delete_api_key",
            api_key_id = data.0.api_key_id.to_string()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.api_key_service
                .delete(&caller, &data.0.api_key_id)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// API keys created by the caller (without secrets)
    #[oai(
        path = "/list-api-keys",
        method = "get",
        operation_id = "list_api_keys"
    )]
    async fn list_api_keys(&self, token: BazaarSecurityScheme) -> ApiResult<Json<Vec<ApiKey>>> {
        let record = recorded_http_api_request!("list_api_keys");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.api_key_service
                .list(&caller)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }
}
