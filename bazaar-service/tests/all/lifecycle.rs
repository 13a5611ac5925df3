use test_r::test;

use assert2::check;
use bazaar_common::model::{JobType, ModelStatus, ModelType};
use bazaar_service::model::UploadStartRequest;
use bazaar_service::repo::model::{ModelAttributeRecord, ModelRecord, ModelRepo};
use bazaar_service::service::ModelServiceError;
use bazaar_service_base::storage::zip::{unzip_bytes, zip_bytes};
use chrono::Utc;
use uuid::Uuid;

use crate::all::TestServices;

async fn example_archive() -> Vec<u8> {
    zip_bytes(vec![
        (
            "metadata.json".to_string(),
            br#"{"Type": "ndb", "Attributes": {"retriever": "hybrid"}}"#.to_vec(),
        ),
        ("weights/part0.bin".to_string(), vec![7u8; 4096]),
        ("index.bin".to_string(), vec![3u8; 1024]),
    ])
    .await
    .unwrap()
}

#[test]
async fn chunked_upload_round_trip() {
    let services = TestServices::new().await;
    let user = services.user("uploader").await;

    let started = services
        .model_service
        .upload_start(&user, &UploadStartRequest {
            model_name: "my-archive".to_string(),
        })
        .await
        .unwrap();

    let archive = example_archive().await;
    let chunk_size = archive.len() / 3 + 1;
    for (index, chunk) in archive.chunks(chunk_size).enumerate() {
        services
            .model_service
            .upload_chunk(&started.token, index as u64, chunk.to_vec().into())
            .await
            .unwrap();
    }

    let committed = services
        .model_service
        .upload_commit(&started.token)
        .await
        .unwrap();
    check!(committed.model_id == started.model_id);
    check!(committed.model_type == ModelType::Ndb);

    let info = services
        .model_service
        .get(&user, &started.model_id)
        .await
        .unwrap();
    check!(info.model.train_status == ModelStatus::Complete);
    check!(info.model.model_type == Some(ModelType::Ndb));
    check!(info
        .model
        .attributes
        .iter()
        .any(|a| a.key == "retriever" && a.value == "hybrid"));

    // the downloaded archive unpacks to the committed content
    let downloaded = services
        .model_service
        .download(&user, &started.model_id)
        .await
        .unwrap();
    let mut entries = unzip_bytes(downloaded.to_vec()).await.unwrap();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    check!(names == vec!["index.bin", "metadata.json", "weights/part0.bin"]);
}

#[test]
async fn commit_with_missing_chunk_keeps_upload_open() {
    let services = TestServices::new().await;
    let user = services.user("gappy").await;

    let started = services
        .model_service
        .upload_start(&user, &UploadStartRequest {
            model_name: "gappy-archive".to_string(),
        })
        .await
        .unwrap();

    services
        .model_service
        .upload_chunk(&started.token, 0, vec![1u8; 16].into())
        .await
        .unwrap();
    services
        .model_service
        .upload_chunk(&started.token, 2, vec![2u8; 16].into())
        .await
        .unwrap();

    let result = services.model_service.upload_commit(&started.token).await;
    check!(matches!(result, Err(ModelServiceError::MissingChunk(1))));

    let info = services
        .model_service
        .get(&user, &started.model_id)
        .await
        .unwrap();
    check!(info.model.train_status == ModelStatus::UploadInProgress);
}

#[test]
async fn upload_token_has_upload_scope_only() {
    let services = TestServices::new().await;
    let user = services.user("scoped").await;

    let started = services
        .model_service
        .upload_start(&user, &UploadStartRequest {
            model_name: "scoped-archive".to_string(),
        })
        .await
        .unwrap();

    // a job callback must not accept the upload token
    let result = services
        .train_service
        .update_status(&bazaar_service::model::StatusUpdateRequest {
            token: started.token,
            status: ModelStatus::Complete,
        })
        .await;
    check!(matches!(result, Err(ModelServiceError::InvalidToken(_))));
}

#[test]
async fn delete_blocked_by_dependency() {
    let services = TestServices::new().await;
    let user = services.user("owner").await;

    let retrieval = services
        .complete_model(&user, "retrieval", ModelType::Ndb)
        .await;
    services
        .workflow_service
        .enterprise_search(&user, &bazaar_service::model::EnterpriseSearchRequest {
            model_name: "search".to_string(),
            retrieval_id: retrieval,
            guardrail_id: None,
            classifier_id: None,
        })
        .await
        .unwrap();

    let result = services.model_service.delete(&user, &retrieval).await;
    check!(matches!(
        result,
        Err(ModelServiceError::DeletionBlocked { used_by: 1 })
    ));

    // the model survived the rejected delete
    check!(services
        .model_repo
        .get(&retrieval.0)
        .await
        .unwrap()
        .is_some());
}

#[test]
async fn composite_status_is_worst_of_closure() {
    let services = TestServices::new().await;
    let user = services.user("status").await;

    let dependency = services
        .complete_model(&user, "dependency", ModelType::Ndb)
        .await;

    let root_id = Uuid::new_v4();
    let root = ModelRecord {
        model_id: root_id,
        name: "root".to_string(),
        model_type: Some(ModelType::EnterpriseSearch.to_string()),
        owner_id: user.id.0,
        team_id: None,
        access: "private".to_string(),
        default_permission: "read".to_string(),
        train_status: ModelStatus::Complete.to_string(),
        deploy_status: ModelStatus::NotStarted.to_string(),
        base_model_id: None,
        published_date: Utc::now(),
    };
    services
        .model_repo
        .create(&root, &[], &[dependency.0])
        .await
        .unwrap();

    services
        .model_repo
        .update_train_status(&dependency.0, &ModelStatus::Failed.to_string())
        .await
        .unwrap();

    let status = services
        .model_service
        .composite_status(&bazaar_common::model::ModelId(root_id), JobType::Train)
        .await
        .unwrap();
    check!(status.status == ModelStatus::Failed);
}

#[test]
async fn duplicate_model_name_is_rejected_per_owner() {
    let services = TestServices::new().await;
    let user = services.user("dup").await;
    let other = services.user("dup2").await;

    services.complete_model(&user, "same-name", ModelType::Ndb).await;

    let record = ModelRecord {
        model_id: Uuid::new_v4(),
        name: "same-name".to_string(),
        model_type: Some(ModelType::Ndb.to_string()),
        owner_id: user.id.0,
        team_id: None,
        access: "private".to_string(),
        default_permission: "read".to_string(),
        train_status: ModelStatus::Complete.to_string(),
        deploy_status: ModelStatus::NotStarted.to_string(),
        base_model_id: None,
        published_date: Utc::now(),
    };
    let result = services.model_repo.create(&record, &[], &[]).await;
    check!(matches!(
        result,
        Err(bazaar_service_base::repo::RepoError::UniqueViolation(_))
    ));

    // a different owner may reuse the name
    let mut for_other = record.clone();
    for_other.model_id = Uuid::new_v4();
    for_other.owner_id = other.id.0;
    services.model_repo.create(&for_other, &[], &[]).await.unwrap();
}

#[test]
async fn attributes_and_dependencies_are_loaded_with_the_model() {
    let services = TestServices::new().await;
    let user = services.user("attrs").await;

    let dependency = services.complete_model(&user, "dep", ModelType::Ndb).await;

    let model_id = Uuid::new_v4();
    let record = ModelRecord {
        model_id,
        name: "with-attrs".to_string(),
        model_type: Some(ModelType::EnterpriseSearch.to_string()),
        owner_id: user.id.0,
        team_id: None,
        access: "private".to_string(),
        default_permission: "read".to_string(),
        train_status: ModelStatus::Complete.to_string(),
        deploy_status: ModelStatus::NotStarted.to_string(),
        base_model_id: None,
        published_date: Utc::now(),
    };
    let attributes = vec![ModelAttributeRecord {
        model_id,
        key: "retrieval_id".to_string(),
        value: dependency.to_string(),
    }];
    services
        .model_repo
        .create(&record, &attributes, &[dependency.0])
        .await
        .unwrap();

    let info = services
        .model_service
        .get(&user, &bazaar_common::model::ModelId(model_id))
        .await
        .unwrap();
    check!(info.model.dependencies == vec![dependency]);
    check!(info.model.attributes.len() == 1);
}
