use crate::api::{ApiResult, ApiTags};
use crate::model::*;
use crate::service::auth::AuthService;
use crate::service::team::TeamService;
use bazaar_common::auth::BazaarSecurityScheme;
use bazaar_common::model::{TeamId, UserId};
use bazaar_common::recorded_http_api_request;
use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;
use tracing::Instrument;

pub struct TeamApi {
    pub auth_service: Arc<dyn AuthService>,
    pub team_service: Arc<TeamService>,
}

#[OpenApi(prefix_path = "/team", tag = ApiTags::Team)]
impl TeamApi {
    /// Create a team; the creator becomes its first team admin
    #[oai(path = "/create", method = "post", operation_id = "create_team")]
    async fn create(
        &self,
        data: Json<CreateTeamRequest>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Team>> {
        let record = recorded_http_api_request!("create_team", team_name = data.0.name.clone());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .create(&caller, &data.0.name)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Teams visible to the caller (all of them for admins)
    #[oai(path = "/list", method = "get", operation_id = "list_teams")]
    async fn list(&self, token: BazaarSecurityScheme) -> ApiResult<Json<Vec<Team>>> {
        let record = recorded_http_api_request!("list_teams");
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .list(&caller)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Delete a team (team admin); fails while the team still owns models
    #[oai(path = "/:team_id", method = "delete", operation_id = "delete_team")]
    async fn delete(
        &self,
        team_id: Path<TeamId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!("delete_team", team_id = team_id.0.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .delete(&caller, &team_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Add a user to the team (team admin)
    #[oai(
        path = "/:team_id/users/:user_id",
        method = "post",
        operation_id = "add_team_user"
    )]
    async fn add_user(
        &self,
        team_id: Path<TeamId>,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!(
            "add_team_user",
            team_id = team_id.0.to_string(),
            user_id = user_id.0.to_string()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .add_user(&caller, &team_id.0, &user_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Remove a user from the team (team admin)
    #[oai(
        path = "/:team_id/users/:user_id",
        method = "delete",
        operation_id = "remove_team_user"
    )]
    async fn remove_user(
        &self,
        team_id: Path<TeamId>,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!(
            "remove_team_user",
            team_id = team_id.0.to_string(),
            user_id = user_id.0.to_string()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .remove_user(&caller, &team_id.0, &user_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Promote a member to team admin (team admin)
    #[oai(
        path = "/:team_id/admins/:user_id",
        method = "post",
        operation_id = "add_team_admin"
    )]
    async fn add_admin(
        &self,
        team_id: Path<TeamId>,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!(
            "add_team_admin",
            team_id = team_id.0.to_string(),
            user_id = user_id.0.to_string()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .set_team_admin(&caller, &team_id.0, &user_id.0, true)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Demote a team admin to member; the last team admin cannot be demoted
    #[oai(
        path = "/:team_id/admins/:user_id",
        method = "delete",
        operation_id = "remove_team_admin"
    )]
    async fn remove_admin(
        &self,
        team_id: Path<TeamId>,
        user_id: Path<UserId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<DeleteResponse>> {
        let record = recorded_http_api_request!(
            "remove_team_admin",
            team_id = team_id.0.to_string(),
            user_id = user_id.0.to_string()
        );
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .set_team_admin(&caller, &team_id.0, &user_id.0, false)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(|_| Json(DeleteResponse {}))
        };
        record.result(response)
    }

    /// Members of the team (members only)
    #[oai(path = "/:team_id/users", method = "get", operation_id = "team_users")]
    async fn users(
        &self,
        team_id: Path<TeamId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Vec<TeamMember>>> {
        let record = recorded_http_api_request!("team_users", team_id = team_id.0.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .users(&caller, &team_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }

    /// Models owned by the team (members only)
    #[oai(path = "/:team_id/models", method = "get", operation_id = "team_models")]
    async fn models(
        &self,
        team_id: Path<TeamId>,
        token: BazaarSecurityScheme,
    ) -> ApiResult<Json<Vec<ModelInfo>>> {
        let record = recorded_http_api_request!("team_models", team_id = team_id.0.to_string());
        let response = {
            let caller = self.auth_service.authenticate(&token, None).await?;
            self.team_service
                .models(&caller, &team_id.0)
                .instrument(record.span.clone())
                .await
                .map_err(|e| e.into())
                .map(Json)
        };
        record.result(response)
    }
}
