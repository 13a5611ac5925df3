// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bazaar_common::model::{ModelPermission, TeamId, UserId};
use bazaar_common::SafeDisplay;
use bazaar_service_base::repo::RepoError;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::model::{ModelInfo, Team, TeamMember, User};
use crate::repo::model::ModelRepo;
use crate::repo::team::{TeamRecord, TeamRepo};
use crate::repo::user::UserRepo;
use crate::service::model::ModelService;
use crate::service::permission::PermissionService;
use crate::service::ModelServiceError;

#[derive(Debug, thiserror::Error)]
pub enum TeamServiceError {
    #[error("Invalid request: {}", .0.join(", "))]
    ArgValidation(Vec<String>),
    #[error("Team admin privileges required")]
    TeamAdminRequired,
    #[error("Team membership required")]
    MembershipRequired,
    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),
    #[error("User not found: {0}")]
    UserNotFound(UserId),
    #[error("Team with name {0} already exists")]
    AlreadyExists(String),
    #[error("The last team admin cannot be demoted or removed")]
    LastTeamAdmin,
    #[error("Team still owns models")]
    TeamNotEmpty,
    #[error(transparent)]
    InternalRepoError(#[from] RepoError),
    #[error(transparent)]
    InternalModelError(Box<ModelServiceError>),
}

impl SafeDisplay for TeamServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            TeamServiceError::InternalRepoError(inner) => inner.to_safe_string(),
            TeamServiceError::InternalModelError(inner) => inner.to_safe_string(),
            _ => self.to_string(),
        }
    }
}

impl From<ModelServiceError> for TeamServiceError {
    fn from(error: ModelServiceError) -> Self {
        TeamServiceError::InternalModelError(Box::new(error))
    }
}

pub struct TeamService {
    team_repo: Arc<dyn TeamRepo + Sync + Send>,
    user_repo: Arc<dyn UserRepo + Sync + Send>,
    model_repo: Arc<dyn ModelRepo + Sync + Send>,
    permission_service: Arc<PermissionService>,
    model_service: Arc<ModelService>,
}

impl TeamService {
    pub fn new(
        team_repo: Arc<dyn TeamRepo + Sync + Send>,
        user_repo: Arc<dyn UserRepo + Sync + Send>,
        model_repo: Arc<dyn ModelRepo + Sync + Send>,
        permission_service: Arc<PermissionService>,
        model_service: Arc<ModelService>,
    ) -> Self {
        Self {
            team_repo,
            user_repo,
            model_repo,
            permission_service,
            model_service,
        }
    }

    async fn expect_team(&self, team_id: &TeamId) -> Result<TeamRecord, TeamServiceError> {
        self.team_repo
            .get(&team_id.0)
            .await?
            .ok_or(TeamServiceError::TeamNotFound(*team_id))
    }

    async fn require_team_admin(
        &self,
        caller: &User,
        team_id: &TeamId,
    ) -> Result<(), TeamServiceError> {
        if caller.is_admin {
            return Ok(());
        }
        match self.team_repo.get_member(&team_id.0, &caller.id.0).await? {
            Some(member) if member.is_team_admin => Ok(()),
            _ => Err(TeamServiceError::TeamAdminRequired),
        }
    }

    async fn require_member(
        &self,
        caller: &User,
        team_id: &TeamId,
    ) -> Result<(), TeamServiceError> {
        if caller.is_admin {
            return Ok(());
        }
        match self.team_repo.get_member(&team_id.0, &caller.id.0).await? {
            Some(_) => Ok(()),
            None => Err(TeamServiceError::MembershipRequired),
        }
    }

    /// The creator becomes the team's first admin.
    pub async fn create(&self, caller: &User, name: &str) -> Result<Team, TeamServiceError> {
        if name.trim().is_empty() {
            return Err(TeamServiceError::ArgValidation(vec![
                "name must not be empty".to_string(),
            ]));
        }

        let record = TeamRecord {
            team_id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        match self.team_repo.create(&record).await {
            Ok(()) => {}
            Err(RepoError::UniqueViolation(_)) => {
                return Err(TeamServiceError::AlreadyExists(name.to_string()))
            }
            Err(other) => return Err(other.into()),
        }

        self.team_repo
            .upsert_member(&record.team_id, &caller.id.0, true)
            .await?;

        info!(team = name, "Created team");
        Ok(record.into())
    }

    pub async fn list(&self, caller: &User) -> Result<Vec<Team>, TeamServiceError> {
        if caller.is_admin {
            let teams = self.team_repo.list().await?;
            return Ok(teams.into_iter().map(|t| t.into()).collect());
        }

        let memberships = self.team_repo.memberships(&caller.id.0).await?;
        Ok(memberships
            .into_iter()
            .map(|m| Team {
                id: TeamId(m.team_id),
                name: m.name,
            })
            .collect())
    }

    pub async fn delete(&self, caller: &User, team_id: &TeamId) -> Result<(), TeamServiceError> {
        self.expect_team(team_id).await?;
        self.require_team_admin(caller, team_id).await?;

        let owns_models = self
            .model_repo
            .list()
            .await?
            .iter()
            .any(|m| m.team_id == Some(team_id.0));
        if owns_models {
            return Err(TeamServiceError::TeamNotEmpty);
        }

        self.team_repo.delete(&team_id.0).await?;
        info!(team_id = %team_id, "Deleted team");
        Ok(())
    }

    pub async fn add_user(
        &self,
        caller: &User,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<(), TeamServiceError> {
        self.expect_team(team_id).await?;
        self.require_team_admin(caller, team_id).await?;
        self.user_repo
            .get(&user_id.0)
            .await?
            .ok_or(TeamServiceError::UserNotFound(*user_id))?;

        // adding an existing member keeps their admin flag
        if self
            .team_repo
            .get_member(&team_id.0, &user_id.0)
            .await?
            .is_none()
        {
            self.team_repo
                .upsert_member(&team_id.0, &user_id.0, false)
                .await?;
        }
        Ok(())
    }

    pub async fn remove_user(
        &self,
        caller: &User,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<(), TeamServiceError> {
        self.expect_team(team_id).await?;
        self.require_team_admin(caller, team_id).await?;

        if let Some(member) = self.team_repo.get_member(&team_id.0, &user_id.0).await? {
            if member.is_team_admin && self.team_repo.admin_count(&team_id.0).await? <= 1 {
                return Err(TeamServiceError::LastTeamAdmin);
            }
            self.team_repo.remove_member(&team_id.0, &user_id.0).await?;
        }
        Ok(())
    }

    pub async fn set_team_admin(
        &self,
        caller: &User,
        team_id: &TeamId,
        user_id: &UserId,
        is_team_admin: bool,
    ) -> Result<(), TeamServiceError> {
        self.expect_team(team_id).await?;
        self.require_team_admin(caller, team_id).await?;

        let member = self
            .team_repo
            .get_member(&team_id.0, &user_id.0)
            .await?
            .ok_or(TeamServiceError::UserNotFound(*user_id))?;

        if !is_team_admin
            && member.is_team_admin
            && self.team_repo.admin_count(&team_id.0).await? <= 1
        {
            return Err(TeamServiceError::LastTeamAdmin);
        }

        self.team_repo
            .upsert_member(&team_id.0, &user_id.0, is_team_admin)
            .await?;
        Ok(())
    }

    pub async fn users(
        &self,
        caller: &User,
        team_id: &TeamId,
    ) -> Result<Vec<TeamMember>, TeamServiceError> {
        self.expect_team(team_id).await?;
        self.require_member(caller, team_id).await?;

        let members = self.team_repo.members(&team_id.0).await?;
        Ok(members.into_iter().map(|m| m.into()).collect())
    }

    pub async fn models(
        &self,
        caller: &User,
        team_id: &TeamId,
    ) -> Result<Vec<ModelInfo>, TeamServiceError> {
        self.expect_team(team_id).await?;
        self.require_member(caller, team_id).await?;

        let mut result = Vec::new();
        for record in self.model_repo.list().await? {
            if record.team_id != Some(team_id.0) {
                continue;
            }
            let permission = self
                .permission_service
                .permission(caller, &record)
                .await?;
            if permission == ModelPermission::None {
                continue;
            }
            result.push(ModelInfo {
                model: self.model_service.to_model(record).await?,
                permission,
            });
        }
        Ok(result)
    }
}
