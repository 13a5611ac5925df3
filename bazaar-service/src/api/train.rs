use crate::api::{ApiResult, ApiTags};
use crate::model::*;
use crate::service::auth::AuthService;
use crate::service::train::TrainService;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::model::ModelId;
use bazaar_common::recorded_http_api_request;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::types::multipart::Upload as MultipartUpload;
use poem_openapi::{Multipart, OpenApi};
use std::sync::Arc;
use tracing::Instrument;

pub struct TrainApi {
    pub auth_service: Arc<dyn AuthService>,
    pub train_service: Arc<TrainService>,
}

#[derive(Multipart)]
pub struct UploadDataPayload {
    files: Vec<MultipartUpload>,
    sub_dir: Option<String>,
}

#[OpenApi(prefix_path = "/train", tag = ApiTags::Train)]
impl TrainApi {
    /// Train a retrieval (ndb) model
    #[oai(path = "/ndb", method = "post", operation_id = "train_ndb")]
    async fn train_ndb(
        &self,
        data: Json<NdbTrainRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record =
            recorded_http_api_request!("train_ndb", model_name = data.0.model_name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .train_ndb(&caller, data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Retrain a retrieval model from a base model
    #[oai(path = "/ndb-retrain", method = "post", operation_id = "retrain_ndb")]
    async fn retrain_ndb(
        &self,
        data: Json<RetrainRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record =
            recorded_http_api_request!("retrain_ndb", model_name = data.0.model_name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .retrain_ndb(&caller, data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Train a token classifier
    #[oai(path = "/nlp-token", method = "post", operation_id = "train_nlp_token")]
    async fn train_nlp_token(
        &self,
        data: Json<NlpTokenTrainRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record =
            recorded_http_api_request!("train_nlp_token", model_name = data.0.model_name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .train_nlp_token(&caller, data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Retrain a token classifier from a base model
    #[oai(
        path = "/nlp-token-retrain",
        method = "post",
        operation_id = "retrain_nlp_token"
    )]
    async fn retrain_nlp_token(
        &self,
        data: Json<RetrainRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record =
            recorded_http_api_request!("retrain_nlp_token", model_name = data.0.model_name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .retrain_nlp_token(&caller, data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Train a text classifier
    #[oai(path = "/nlp-text", method = "post", operation_id = "train_nlp_text")]
    async fn train_nlp_text(
        &self,
        data: Json<NlpTextTrainRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record =
            recorded_http_api_request!("train_nlp_text", model_name = data.0.model_name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .train_nlp_text(&caller, data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Train a text classifier from generated data
    #[oai(path = "/nlp-datagen", method = "post", operation_id = "datagen_nlp")]
    async fn datagen_nlp(
        &self,
        data: Json<NlpDatagenTrainRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Model>> {
        let record =
            recorded_http_api_request!("datagen_nlp", model_name = data.0.model_name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .datagen_nlp(&caller, data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Stage a multi-file dataset for later training requests
    #[oai(path = "/upload-data", method = "post", operation_id = "upload_data")]
    async fn upload_data(
        &self,
        payload: UploadDataPayload,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Upload>> {
        let record = recorded_http_api_request!("upload_data");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            let mut files = Vec::new();
            for file in payload.files {
                let name = file
                    .file_name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "file".to_string());
                let data = file.into_vec().await.map_err(|e| {
                    crate::api::ApiError::BadRequest(Json(bazaar_common::model::ErrorsBody {
                        errors: vec![format!("failed to read multipart body: {e}")],
                    }))
                })?;
                files.push((name, data));
            }
            self.train_service
                .upload_data(&caller, files, payload.sub_dir)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Validate a staged document directory against the extension and
    /// per-category policies
    #[oai(
        path = "/verify-doc-dir",
        method = "post",
        operation_id = "verify_doc_dir"
    )]
    async fn verify_doc_dir(
        &self,
        data: Json<VerifyDocDirRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DocDirReport>> {
        let record =
            recorded_http_api_request!("verify_doc_dir", upload_id = data.0.upload_id.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .verify_doc_dir(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Validate the single CSV of an upload for classifier training
    #[oai(
        path = "/validate-trainable-csv",
        method = "post",
        operation_id = "validate_trainable_csv"
    )]
    async fn validate_trainable_csv(
        &self,
        data: Json<ValidateCsvRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<CsvValidationResponse>> {
        let record = recorded_http_api_request!(
            "validate_trainable_csv",
            upload_id = data.0.upload_id.to_string()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.train_service
                .validate_trainable_csv(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Aggregated training status over the model and its dependencies
    #[oai(
        path = "/:model_id/status",
        method = "get",
        operation_id = "train_status"
    )]
    async fn status(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<StatusResponse>> {
        let record = recorded_http_api_request!("train_status", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.train_service
                .status(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Training job logs of the model and its dependencies
    #[oai(path = "/:model_id/logs", method = "get", operation_id = "train_logs")]
    async fn logs(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<LogsResponse>> {
        let record = recorded_http_api_request!("train_logs", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.train_service
                .logs(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// The latest training report
    #[oai(
        path = "/:model_id/report",
        method = "get",
        operation_id = "train_report"
    )]
    async fn report(
        &self,
        model_id: Path<ModelId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<serde_json::Value>> {
        let record = recorded_http_api_request!("train_report", model_id = model_id.0.to_string());
        let response = {
            let caller = self
                .auth_service
                .authenticate(&token, Some(&model_id.0))
                .await?;
            self.train_service
                .report(&caller, &model_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Status callback from a running training job (job token)
    #[oai(
        path = "/update-status",
        method = "post",
        operation_id = "train_update_status"
    )]
    async fn update_status(
        &self,
        data: Json<StatusUpdateRequest>,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("train_update_status");
        let response = self
            .train_service
            .update_status(&data.0)
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(|_| Json(DeleteResponse {}));
        record.result(response)
    }

    /// Log callback from a running training job (job token)
    #[oai(path = "/log", method = "post", operation_id = "train_log")]
    async fn log(&self, data: Json<JobLogRequest>) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("train_log");
        let response = self
            .train_service
            .log(&data.0)
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(|_| Json(DeleteResponse {}));
        record.result(response)
    }
}
