use test_r::test;

use assert2::check;
use bazaar_common::model::UploadId;
use bazaar_service::model::{TrainableCsvKind, ValidateCsvRequest, VerifyDocDirRequest};
use bazaar_service::repo::upload::{UploadRecord, UploadRepo};
use bazaar_service::service::ModelServiceError;
use bazaar_service_base::storage::blob::{BlobNamespace, BlobStorage};
use chrono::Utc;
use std::path::Path;
use uuid::Uuid;

use crate::all::TestServices;

async fn csv_upload(services: &TestServices, user: &bazaar_service::model::User, content: &str) -> UploadId {
    services
        .train_service
        .upload_data(
            user,
            vec![("data.csv".to_string(), content.as_bytes().to_vec())],
            None,
        )
        .await
        .unwrap()
        .id
}

#[test]
async fn token_csv_with_matching_lengths_validates() {
    let services = TestServices::new().await;
    let user = services.user("csv").await;

    let upload_id = csv_upload(
        &services,
        &user,
        "source,target\nJohn lives in Paris,B-NAME O O B-CITY\nnothing here,O O\n",
    )
    .await;

    let response = services
        .train_service
        .validate_trainable_csv(
            &user,
            &ValidateCsvRequest {
                upload_id,
                kind: TrainableCsvKind::TokenClassifier,
            },
        )
        .await
        .unwrap();

    check!(response.rows == 2);
    // the outside tag is never a label
    check!(response.labels == vec!["B-CITY".to_string(), "B-NAME".to_string()]);
}

#[test]
async fn token_csv_with_mismatched_lengths_fails() {
    let services = TestServices::new().await;
    let user = services.user("csv").await;

    let upload_id = csv_upload(
        &services,
        &user,
        "source,target\nJohn lives in Paris,B-NAME O O\n",
    )
    .await;

    let result = services
        .train_service
        .validate_trainable_csv(
            &user,
            &ValidateCsvRequest {
                upload_id,
                kind: TrainableCsvKind::TokenClassifier,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn text_csv_headers_are_checked_as_a_set() {
    let services = TestServices::new().await;
    let user = services.user("csv").await;

    // header order does not matter
    let upload_id = csv_upload(&services, &user, "labels,text\ngreeting,hello\n").await;
    let response = services
        .train_service
        .validate_trainable_csv(
            &user,
            &ValidateCsvRequest {
                upload_id,
                kind: TrainableCsvKind::TextClassifier,
            },
        )
        .await
        .unwrap();
    check!(response.labels == vec!["greeting".to_string()]);

    let upload_id = csv_upload(&services, &user, "text,category\nhello,greeting\n").await;
    let result = services
        .train_service
        .validate_trainable_csv(
            &user,
            &ValidateCsvRequest {
                upload_id,
                kind: TrainableCsvKind::TextClassifier,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn csv_validation_rejects_foreign_uploads() {
    let services = TestServices::new().await;
    let owner = services.user("owner").await;
    let other = services.user("other").await;

    let upload_id = csv_upload(&services, &owner, "text,labels\nhello,greeting\n").await;

    let result = services
        .train_service
        .validate_trainable_csv(
            &other,
            &ValidateCsvRequest {
                upload_id,
                kind: TrainableCsvKind::TextClassifier,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::Unauthorized(_))));
}

async fn seed_doc_upload(
    services: &TestServices,
    user: &bazaar_service::model::User,
    files: &[(&str, &[u8])],
) -> UploadId {
    let upload_id = UploadId(Uuid::new_v4());
    for (path, data) in files {
        services
            .blob_storage
            .put(BlobNamespace::Upload(upload_id), Path::new(path), data)
            .await
            .unwrap();
    }
    services
        .upload_repo
        .create(&UploadRecord {
            upload_id: upload_id.0,
            user_id: user.id.0,
            upload_date: Utc::now(),
            files: files
                .iter()
                .map(|(path, _)| path.to_string())
                .collect::<Vec<_>>()
                .join(";"),
        })
        .await
        .unwrap();
    upload_id
}

#[test]
async fn doc_dir_verification_counts_categories() {
    let services = TestServices::new().await;
    let user = services.user("docs").await;

    let upload_id = seed_doc_upload(
        &services,
        &user,
        &[
            ("contracts/a.pdf", b"pdf" as &[u8]),
            ("contracts/b.docx", b"docx"),
            ("invoices/c.txt", b"txt"),
        ],
    )
    .await;

    let report = services
        .train_service
        .verify_doc_dir(
            &user,
            &VerifyDocDirRequest {
                upload_id,
                min_docs_per_category: Some(1),
            },
        )
        .await
        .unwrap();

    check!(report.categories.len() == 2);
    check!(report
        .categories
        .iter()
        .any(|c| c.name == "contracts" && c.count == 2));
}

#[test]
async fn doc_dir_verification_enforces_minimums_and_extensions() {
    let services = TestServices::new().await;
    let user = services.user("docs").await;

    let upload_id = seed_doc_upload(
        &services,
        &user,
        &[
            ("contracts/a.pdf", b"pdf" as &[u8]),
            ("contracts/malware.exe", b"nope"),
        ],
    )
    .await;

    let result = services
        .train_service
        .verify_doc_dir(
            &user,
            &VerifyDocDirRequest {
                upload_id,
                min_docs_per_category: Some(2),
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}
