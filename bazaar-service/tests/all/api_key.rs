use test_r::test;

use assert2::check;
use bazaar_common::auth::{BazaarApiKey, BazaarSecurityScheme};
use bazaar_common::model::{ModelType, TokenSecret};
use bazaar_service::model::CreateApiKeyRequest;
use bazaar_service::repo::api_key::ApiKeyRepo;
use bazaar_service::service::ModelServiceError;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use crate::all::TestServices;

#[test]
async fn api_key_grants_only_scoped_models() {
    let services = TestServices::new().await;
    let user = services.user("keyed").await;

    let in_scope = services
        .complete_model(&user, "in-scope", ModelType::Ndb)
        .await;
    let out_of_scope = services
        .complete_model(&user, "out-of-scope", ModelType::Ndb)
        .await;

    let created = services
        .api_key_service
        .create(
            &user,
            &CreateApiKeyRequest {
                name: "ci".to_string(),
                model_ids: vec![in_scope],
                expires_at: Utc::now() + Duration::days(30),
            },
        )
        .await
        .unwrap();

    let verified = services
        .api_key_service
        .verify(&created.key, &in_scope)
        .await
        .unwrap();
    check!(verified.id == user.id);

    let rejected = services
        .api_key_service
        .verify(&created.key, &out_of_scope)
        .await;
    check!(matches!(rejected, Err(ModelServiceError::Unauthorized(_))));
}

#[test]
async fn api_key_persists_only_the_secret_hash() {
    let services = TestServices::new().await;
    let user = services.user("hashed").await;
    let model = services.complete_model(&user, "m", ModelType::Ndb).await;

    let created = services
        .api_key_service
        .create(
            &user,
            &CreateApiKeyRequest {
                name: "ci".to_string(),
                model_ids: vec![model],
                expires_at: Utc::now() + Duration::days(1),
            },
        )
        .await
        .unwrap();

    let (prefix, secret) = created.key.split_once('.').unwrap();
    check!(prefix == created.api_key.prefix);
    check!(secret.len() >= 32);

    let record = services
        .api_key_repo
        .get_by_prefix(prefix)
        .await
        .unwrap()
        .unwrap();
    check!(record.secret_hash == hex::encode(Sha256::digest(secret.as_bytes())));
    check!(!record.secret_hash.contains(secret));
}

#[test]
async fn api_key_authenticates_through_the_auth_service() {
    let services = TestServices::new().await;
    let user = services.user("via-auth").await;
    let model = services.complete_model(&user, "m", ModelType::Ndb).await;

    let created = services
        .api_key_service
        .create(
            &user,
            &CreateApiKeyRequest {
                name: "ci".to_string(),
                model_ids: vec![model],
                expires_at: Utc::now() + Duration::days(1),
            },
        )
        .await
        .unwrap();

    let scheme =
        BazaarSecurityScheme::ApiKey(BazaarApiKey(TokenSecret::new(created.key.clone())));

    let authenticated = services
        .auth_service
        .authenticate(&scheme, Some(&model))
        .await
        .unwrap();
    check!(authenticated.id == user.id);

    // API keys are rejected on endpoints without a model scope
    let rejected = services.auth_service.authenticate(&scheme, None).await;
    check!(rejected.is_err());
}

#[test]
async fn malformed_and_tampered_keys_are_rejected() {
    let services = TestServices::new().await;
    let user = services.user("tamper").await;
    let model = services.complete_model(&user, "m", ModelType::Ndb).await;

    let created = services
        .api_key_service
        .create(
            &user,
            &CreateApiKeyRequest {
                name: "ci".to_string(),
                model_ids: vec![model],
                expires_at: Utc::now() + Duration::days(1),
            },
        )
        .await
        .unwrap();

    let no_dot = services.api_key_service.verify("nodotatall", &model).await;
    check!(matches!(no_dot, Err(ModelServiceError::Unauthorized(_))));

    let wrong_secret = format!("{}.{}", created.api_key.prefix, "x".repeat(40));
    let tampered = services.api_key_service.verify(&wrong_secret, &model).await;
    check!(matches!(tampered, Err(ModelServiceError::Unauthorized(_))));
}

#[test]
async fn expired_keys_cannot_be_created() {
    let services = TestServices::new().await;
    let user = services.user("expired").await;
    let model = services.complete_model(&user, "m", ModelType::Ndb).await;

    let result = services
        .api_key_service
        .create(
            &user,
            &CreateApiKeyRequest {
                name: "old".to_string(),
                model_ids: vec![model],
                expires_at: Utc::now() - Duration::days(1),
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn deleted_keys_stop_verifying() {
    let services = TestServices::new().await;
    let user = services.user("deleter").await;
    let model = services.complete_model(&user, "m", ModelType::Ndb).await;

    let created = services
        .api_key_service
        .create(
            &user,
            &CreateApiKeyRequest {
                name: "ci".to_string(),
                model_ids: vec![model],
                expires_at: Utc::now() + Duration::days(1),
            },
        )
        .await
        .unwrap();

    services
        .api_key_service
        .delete(&user, &created.api_key.id)
        .await
        .unwrap();

    let result = services.api_key_service.verify(&created.key, &model).await;
    check!(matches!(result, Err(ModelServiceError::Unauthorized(_))));
}
