use crate::api::{ApiError, ApiResult, ApiTags};
use crate::model::*;
use crate::service::auth::AuthService;
use crate::service::user::UserService;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::model::{ErrorBody, UserId};
use bazaar_common::recorded_http_api_request;
use poem::Request;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;
use tracing::Instrument;

pub struct UserApi {
    pub auth_service: Arc<dyn AuthService>,
    pub user_service: Arc<UserService>,
}

#[OpenApi(prefix_path = "/user", tag = ApiTags::User)]
impl UserApi {
    /// Sign up
    ///
    /// Creates an unverified, non-admin user and returns a session token.
    #[oai(path = "/signup", method = "post", operation_id = "signup")]
    async fn signup(&self, data: Json<SignupRequest>) -> ApiResult<Json<LoginResponse>> {
        let record = recorded_http_api_request!("signup", username = data.0.username.clone());
        let response = self
            .user_service
            .signup(&data.0)
            .instrument(record.span.clone())
            .await
            .map_err(|e| e.into())
            .map(Json);
        record.result(response)
    }

    /// Log in with Basic credentials (email and password)
    #[oai(path = "/login", method = "post", operation_id = "login")]
    async fn login(&self, request: &Request) -> ApiResult<Json<LoginResponse>> {
        let record = recorded_http_api_request!("login");
        let response = {
            let (email, password) = basic_credentials(request)?;
            self.user_service
                .login(&email, &password)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Log in with an existing session token
    #[oai(
        path = "/login-with-token",
        method = "post",
        operation_id = "login_with_token"
    )]
    async fn login_with_token(
        &self,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<LoginResponse>> {
        let record = recorded_http_api_request!("login_with_token");
        let response = {
            let secret = token.as_ref().clone();
            let user = self
                .auth_service
                .authenticate(&token, None)
                .instrument(record.span.clone())
                .await
                .map_err(ApiError::from)?;
            Ok(Json(LoginResponse {
                token: secret,
                user,
            }))
        };
        record.result(response)
    }

    /// List all users (admin)
    #[oai(path = "/list", method = "get", operation_id = "list_users")]
    async fn list(&self, token: BazaarSecurityScheme) -> ApiResult<Json<Vec<UserInfo>>> {
        let record = recorded_http_api_request!("list_users");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.user_service
                .list(&caller)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// The calling user with its team memberships
    #[oai(path = "/info", method = "get", operation_id = "user_info")]
    async fn info(&self, token: BazaarSecurityScheme) -> ApiResult<Json<UserInfo>> {
        let record = recorded_http_api_request!("user_info");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.user_service
                .info(&caller)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Create a user (admin)
    #[oai(path = "/create", method = "post", operation_id = "create_user")]
    async fn create(
        &self,
        data: Json<CreateUserRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<User>> {
        let record = recorded_http_api_request!("create_user", username = data.0.username.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.user_service
                .create(&caller, &data.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Grant admin privileges (admin)
    #[oai(path = "/:user_id/admin", method = "post", operation_id = "promote_admin")]
    async fn promote_admin(
        &self,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("promote_admin", user_id = user_id.0.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.user_service
                .set_admin(&caller, &user_id.0, true)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Revoke admin privileges (admin); the last admin cannot be demoted
    #[oai(
        path = "/:user_id/admin",
        method = "delete",
        operation_id = "demote_admin"
    )]
    async fn demote_admin(
        &self,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("demote_admin", user_id = user_id.0.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.user_service
                .set_admin(&caller, &user_id.0, false)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Mark a user as verified (admin)
    #[oai(path = "/:user_id/verify", method = "post", operation_id = "verify_user")]
    async fn verify(
        &self,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("verify_user", user_id = user_id.0.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.user_service
                .verify(&caller, &user_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Delete a user (admin, or the user itself)
    #[oai(path = "/:user_id", method = "delete", operation_id = "delete_user")]
    async fn delete(
        &self,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("delete_user", user_id = user_id.0.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.user_service
                .delete(&caller, &user_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }
}

fn basic_credentials(request: &Request) -> Result<(String, String), ApiError> {
    let header = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::Unauthorized(poem_openapi::payload::Json(ErrorBody {
                error: "Basic authorization required".to_string(),
            }))
        })?;

    let encoded = header.strip_prefix("Basic ").ok_or_else(|| {
        ApiError::Unauthorized(poem_openapi::payload::Json(ErrorBody {
            error: "Basic authorization required".to_string(),
        }))
    })?;

    let decoded = BASE64
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| {
            ApiError::Unauthorized(poem_openapi::payload::Json(ErrorBody {
                error: "Invalid Basic credentials".to_string(),
            }))
        })?;

    let (email, password) = decoded.split_once(':').ok_or_else(|| {
        ApiError::Unauthorized(poem_openapi::payload::Json(ErrorBody {
            error: "Invalid Basic credentials".to_string(),
        }))
    })?;

    Ok((email.to_string(), password.to_string()))
}
