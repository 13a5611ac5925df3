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

use bazaar_common::model::{DefaultPermission, ModelAccess, ModelId, ModelPermission};
use bazaar_service_base::repo::RepoError;
use std::sync::Arc;

use crate::model::User;
use crate::repo::model::{ModelRecord, ModelRepo};
use crate::repo::team::TeamRepo;
use crate::service::ModelServiceError;

/// Resolves `(user, model)` to a permission level:
/// admins and owners get `Owner`; `public` models grant their default
/// permission to everyone; `protected` models grant team admins `Owner` and
/// other team members the default permission; everything else is `None`.
pub struct PermissionService {
    model_repo: Arc<dyn ModelRepo + Sync + Send>,
    team_repo: Arc<dyn TeamRepo + Sync + Send>,
}

impl PermissionService {
    pub fn new(
        model_repo: Arc<dyn ModelRepo + Sync + Send>,
        team_repo: Arc<dyn TeamRepo + Sync + Send>,
    ) -> Self {
        Self {
            model_repo,
            team_repo,
        }
    }

    pub async fn permission(
        &self,
        user: &User,
        model: &ModelRecord,
    ) -> Result<ModelPermission, RepoError> {
        if user.is_admin || model.owner_id == user.id.0 {
            return Ok(ModelPermission::Owner);
        }

        let access: ModelAccess = model
            .access
            .parse()
            .map_err(RepoError::Internal)?;
        let default_permission: DefaultPermission = model
            .default_permission
            .parse()
            .map_err(RepoError::Internal)?;

        match access {
            ModelAccess::Public => Ok(default_permission.into()),
            ModelAccess::Protected => {
                let Some(team_id) = model.team_id else {
                    return Ok(ModelPermission::None);
                };
                match self.team_repo.get_member(&team_id, &user.id.0).await? {
                    Some(member) if member.is_team_admin => Ok(ModelPermission::Owner),
                    Some(_) => Ok(default_permission.into()),
                    None => Ok(ModelPermission::None),
                }
            }
            ModelAccess::Private => Ok(ModelPermission::None),
        }
    }

    /// Loads the model and checks the caller has at least the required
    /// permission on it.
    pub async fn require(
        &self,
        user: &User,
        model_id: &ModelId,
        required: ModelPermission,
    ) -> Result<ModelRecord, ModelServiceError> {
        let model = self
            .model_repo
            .get(&model_id.0)
            .await?
            .ok_or(ModelServiceError::ModelNotFound(*model_id))?;

        let permission = self.permission(user, &model).await?;
        if permission >= required {
            Ok(model)
        } else {
            Err(ModelServiceError::Forbidden {
                model_id: *model_id,
                required,
            })
        }
    }
}
