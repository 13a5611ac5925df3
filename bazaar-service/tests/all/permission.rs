use test_r::test;

use assert2::check;
use bazaar_common::model::{DefaultPermission, ModelAccess, ModelPermission, ModelType};
use bazaar_service::model::{UpdateAccessRequest, UpdateDefaultPermissionRequest};
use bazaar_service::repo::model::ModelRepo;
use bazaar_service::service::ModelServiceError;

use crate::all::TestServices;

#[test]
async fn owner_and_admin_always_resolve_to_owner() {
    let services = TestServices::new().await;
    let owner = services.user("owner").await;
    let admin = services.admin("root").await;

    let model_id = services
        .complete_model(&owner, "private", ModelType::Ndb)
        .await;
    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();

    check!(
        services
            .permission_service
            .permission(&owner, &record)
            .await
            .unwrap()
            == ModelPermission::Owner
    );
    check!(
        services
            .permission_service
            .permission(&admin, &record)
            .await
            .unwrap()
            == ModelPermission::Owner
    );
}

#[test]
async fn private_models_are_invisible_to_strangers() {
    let services = TestServices::new().await;
    let owner = services.user("owner").await;
    let stranger = services.user("stranger").await;

    let model_id = services
        .complete_model(&owner, "private", ModelType::Ndb)
        .await;
    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();

    check!(
        services
            .permission_service
            .permission(&stranger, &record)
            .await
            .unwrap()
            == ModelPermission::None
    );

    let listed = services.model_service.list(&stranger).await.unwrap();
    check!(listed.is_empty());

    let result = services.model_service.get(&stranger, &model_id).await;
    check!(matches!(result, Err(ModelServiceError::Forbidden { .. })));
}

#[test]
async fn public_models_grant_the_default_permission() {
    let services = TestServices::new().await;
    let owner = services.user("owner").await;
    let stranger = services.user("stranger").await;

    let model_id = services
        .complete_model(&owner, "shared", ModelType::Ndb)
        .await;
    services
        .model_service
        .update_access(
            &owner,
            &model_id,
            &UpdateAccessRequest {
                access: ModelAccess::Public,
                team_id: None,
            },
        )
        .await
        .unwrap();

    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();
    check!(
        services
            .permission_service
            .permission(&stranger, &record)
            .await
            .unwrap()
            == ModelPermission::Read
    );

    services
        .model_service
        .update_default_permission(
            &owner,
            &model_id,
            &UpdateDefaultPermissionRequest {
                default_permission: DefaultPermission::Write,
            },
        )
        .await
        .unwrap();

    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();
    check!(
        services
            .permission_service
            .permission(&stranger, &record)
            .await
            .unwrap()
            == ModelPermission::Write
    );
}

#[test]
async fn protected_models_follow_team_membership() {
    let services = TestServices::new().await;
    let owner = services.user("owner").await;
    let member = services.user("member").await;
    let outsider = services.user("outsider").await;

    let team = services.team_service.create(&owner, "ml-team").await.unwrap();
    services
        .team_service
        .add_user(&owner, &team.id, &member.id)
        .await
        .unwrap();

    let model_id = services
        .complete_model(&owner, "team-model", ModelType::Ndb)
        .await;
    services
        .model_service
        .update_access(
            &owner,
            &model_id,
            &UpdateAccessRequest {
                access: ModelAccess::Protected,
                team_id: Some(team.id),
            },
        )
        .await
        .unwrap();

    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();

    check!(
        services
            .permission_service
            .permission(&member, &record)
            .await
            .unwrap()
            == ModelPermission::Read
    );
    check!(
        services
            .permission_service
            .permission(&outsider, &record)
            .await
            .unwrap()
            == ModelPermission::None
    );

    // team admins own every protected model of the team
    services
        .team_service
        .set_team_admin(&owner, &team.id, &member.id, true)
        .await
        .unwrap();
    check!(
        services
            .permission_service
            .permission(&member, &record)
            .await
            .unwrap()
            == ModelPermission::Owner
    );
}

#[test]
async fn protected_access_requires_a_team() {
    let services = TestServices::new().await;
    let owner = services.user("owner").await;

    let model_id = services
        .complete_model(&owner, "orphan", ModelType::Ndb)
        .await;
    let result = services
        .model_service
        .update_access(
            &owner,
            &model_id,
            &UpdateAccessRequest {
                access: ModelAccess::Protected,
                team_id: None,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn non_owners_cannot_change_access() {
    let services = TestServices::new().await;
    let owner = services.user("owner").await;
    let stranger = services.user("stranger").await;

    let model_id = services
        .complete_model(&owner, "locked", ModelType::Ndb)
        .await;
    let result = services
        .model_service
        .update_access(
            &stranger,
            &model_id,
            &UpdateAccessRequest {
                access: ModelAccess::Public,
                team_id: None,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::Forbidden { .. })));
}

#[test]
async fn the_last_team_admin_cannot_be_demoted() {
    let services = TestServices::new().await;
    let owner = services.user("solo-admin").await;

    let team = services.team_service.create(&owner, "tiny").await.unwrap();
    let result = services
        .team_service
        .set_team_admin(&owner, &team.id, &owner.id, false)
        .await;
    check!(matches!(
        result,
        Err(bazaar_service::service::team::TeamServiceError::LastTeamAdmin)
    ));
}
