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

use bazaar_common::model::UserId;
use bazaar_common::SafeDisplay;
use bazaar_service_base::repo::RepoError;
use std::sync::Arc;
use tracing::info;

use crate::model::{CreateUserRequest, LoginResponse, SignupRequest, User, UserInfo};
use crate::repo::team::TeamRepo;
use crate::repo::user::UserRepo;
use crate::service::identity::{IdentityError, IdentityProvider};

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Admin privileges required")]
    AdminRequired,
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("The last admin cannot be demoted or removed")]
    LastAdmin,
    #[error(transparent)]
    IdentityError(#[from] IdentityError),
    #[error(transparent)]
    InternalRepoError(#[from] RepoError),
}

impl SafeDisplay for UserServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            UserServiceError::AdminRequired => self.to_string(),
            UserServiceError::UserNotFound(_) => self.to_string(),
            UserServiceError::LastAdmin => self.to_string(),
            UserServiceError::IdentityError(inner) => inner.to_safe_string(),
            UserServiceError::InternalRepoError(inner) => inner.to_safe_string(),
        }
    }
}

pub struct UserService {
    identity_provider: Arc<dyn IdentityProvider>,
    user_repo: Arc<dyn UserRepo + Sync + Send>,
    team_repo: Arc<dyn TeamRepo + Sync + Send>,
}

impl UserService {
    pub fn new(
        identity_provider: Arc<dyn IdentityProvider>,
        user_repo: Arc<dyn UserRepo + Sync + Send>,
        team_repo: Arc<dyn TeamRepo + Sync + Send>,
    ) -> Self {
        Self {
            identity_provider,
            user_repo,
            team_repo,
        }
    }

    fn require_admin(user: &User) -> Result<(), UserServiceError> {
        if user.is_admin {
            Ok(())
        } else {
            Err(UserServiceError::AdminRequired)
        }
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<LoginResponse, UserServiceError> {
        self.identity_provider
            .create_user(&request.username, &request.email, &request.password, false)
            .await?;
        let (token, user) = self
            .identity_provider
            .login_with_email(&request.email, &request.password)
            .await?;
        info!(username = user.username, "New user signed up");
        Ok(LoginResponse { token, user })
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<LoginResponse, UserServiceError> {
        let (token, user) = self
            .identity_provider
            .login_with_email(email, password)
            .await?;
        Ok(LoginResponse { token, user })
    }

    pub async fn info(&self, user: &User) -> Result<UserInfo, UserServiceError> {
        let memberships = self.team_repo.memberships(&user.id.0).await?;
        Ok(UserInfo {
            user: user.clone(),
            teams: memberships.into_iter().map(|m| m.into()).collect(),
        })
    }

    pub async fn list(&self, caller: &User) -> Result<Vec<UserInfo>, UserServiceError> {
        Self::require_admin(caller)?;

        let users = self.user_repo.list().await?;
        let mut result = Vec::with_capacity(users.len());
        for record in users {
            let memberships = self.team_repo.memberships(&record.user_id).await?;
            result.push(UserInfo {
                user: record.into(),
                teams: memberships.into_iter().map(|m| m.into()).collect(),
            });
        }
        Ok(result)
    }

    pub async fn create(
        &self,
        caller: &User,
        request: &CreateUserRequest,
    ) -> Result<User, UserServiceError> {
        Self::require_admin(caller)?;
        let user = self
            .identity_provider
            .create_user(
                &request.username,
                &request.email,
                &request.password,
                request.is_admin,
            )
            .await?;
        Ok(user)
    }

    pub async fn set_admin(
        &self,
        caller: &User,
        user_id: &UserId,
        is_admin: bool,
    ) -> Result<(), UserServiceError> {
        Self::require_admin(caller)?;

        let target = self
            .user_repo
            .get(&user_id.0)
            .await?
            .ok_or_else(|| UserServiceError::UserNotFound(user_id.to_string()))?;

        if !is_admin && target.is_admin && self.user_repo.admin_count().await? <= 1 {
            return Err(UserServiceError::LastAdmin);
        }

        self.user_repo.set_admin(&user_id.0, is_admin).await?;
        Ok(())
    }

    pub async fn verify(&self, caller: &User, user_id: &UserId) -> Result<(), UserServiceError> {
        Self::require_admin(caller)?;
        self.identity_provider.verify_user(user_id).await?;
        Ok(())
    }

    pub async fn delete(&self, caller: &User, user_id: &UserId) -> Result<(), UserServiceError> {
        if !caller.is_admin && caller.id != *user_id {
            return Err(UserServiceError::AdminRequired);
        }

        let target = self
            .user_repo
            .get(&user_id.0)
            .await?
            .ok_or_else(|| UserServiceError::UserNotFound(user_id.to_string()))?;
        if target.is_admin && self.user_repo.admin_count().await? <= 1 {
            return Err(UserServiceError::LastAdmin);
        }

        self.identity_provider.delete_user(user_id).await?;
        info!(user_id = %user_id, "Deleted user");
        Ok(())
    }
}
