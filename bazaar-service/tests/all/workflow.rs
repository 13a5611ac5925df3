use test_r::test;

use assert2::check;
use bazaar_common::model::{ModelStatus, ModelType};
use bazaar_service::model::{
    EnterpriseSearchRequest, KnowledgeExtractionRequest, KnowledgeQuestion,
};
use bazaar_service::service::ModelServiceError;
use bazaar_service_base::storage::blob::{BlobNamespace, BlobStorage};
use std::path::Path;

use crate::all::TestServices;

#[test]
async fn enterprise_search_composes_dependencies_and_attributes() {
    let services = TestServices::new().await;
    let user = services.user("composer").await;

    let retrieval = services
        .complete_model(&user, "retrieval", ModelType::Ndb)
        .await;
    let guardrail = services
        .complete_model(&user, "guardrail", ModelType::NlpToken)
        .await;

    let composite = services
        .workflow_service
        .enterprise_search(
            &user,
            &EnterpriseSearchRequest {
                model_name: "search".to_string(),
                retrieval_id: retrieval,
                guardrail_id: Some(guardrail),
                classifier_id: None,
            },
        )
        .await
        .unwrap();

    check!(composite.model_type == Some(ModelType::EnterpriseSearch));
    check!(composite.train_status == ModelStatus::Complete);
    check!(composite.dependencies.len() == 2);
    check!(composite
        .attributes
        .iter()
        .any(|a| a.key == "retrieval_id" && a.value == retrieval.to_string()));
    check!(composite
        .attributes
        .iter()
        .any(|a| a.key == "guardrail_id" && a.value == guardrail.to_string()));
}

#[test]
async fn enterprise_search_rejects_type_mismatch() {
    let services = TestServices::new().await;
    let user = services.user("mismatched").await;

    // a token classifier is not a retrieval model
    let wrong = services
        .complete_model(&user, "not-ndb", ModelType::NlpToken)
        .await;

    let result = services
        .workflow_service
        .enterprise_search(
            &user,
            &EnterpriseSearchRequest {
                model_name: "search".to_string(),
                retrieval_id: wrong,
                guardrail_id: None,
                classifier_id: None,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn knowledge_extraction_rejects_duplicate_questions() {
    let services = TestServices::new().await;
    let user = services.user("asker").await;

    let result = services
        .workflow_service
        .knowledge_extraction(
            &user,
            &KnowledgeExtractionRequest {
                model_name: "extraction".to_string(),
                questions: vec![
                    KnowledgeQuestion {
                        question: "What is the term?".to_string(),
                        keywords: vec![],
                    },
                    KnowledgeQuestion {
                        question: "what is the term?".to_string(),
                        keywords: vec![],
                    },
                ],
                llm_provider: None,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn knowledge_extraction_writes_the_embedded_store() {
    let services = TestServices::new().await;
    let user = services.user("extractor").await;

    let model = services
        .workflow_service
        .knowledge_extraction(
            &user,
            &KnowledgeExtractionRequest {
                model_name: "extraction".to_string(),
                questions: vec![
                    KnowledgeQuestion {
                        question: "What is the effective date?".to_string(),
                        keywords: vec!["date".to_string(), "effective".to_string()],
                    },
                    KnowledgeQuestion {
                        question: "Who are the parties?".to_string(),
                        keywords: vec!["party".to_string()],
                    },
                ],
                llm_provider: None,
            },
        )
        .await
        .unwrap();

    check!(model.model_type == Some(ModelType::KnowledgeExtraction));
    check!(model.train_status == ModelStatus::Complete);
    check!(model
        .attributes
        .iter()
        .any(|a| a.key == "llm_provider" && a.value == "on-prem"));

    let store = services
        .blob_storage
        .get(
            BlobNamespace::Model(model.id),
            Path::new("model/knowledge.db"),
        )
        .await
        .unwrap();
    check!(store.is_some());
    // sqlite file magic
    check!(store.unwrap().starts_with(b"SQLite format 3\0"));
}

#[test]
async fn knowledge_extraction_requires_a_configured_llm_provider() {
    let services = TestServices::new().await;
    let user = services.user("nokey").await;

    let result = services
        .workflow_service
        .knowledge_extraction(
            &user,
            &KnowledgeExtractionRequest {
                model_name: "extraction".to_string(),
                questions: vec![KnowledgeQuestion {
                    question: "Anything?".to_string(),
                    keywords: vec![],
                }],
                llm_provider: Some("anthropic".to_string()),
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));

    // `openai` is configured in the test fixture, `on-prem` needs no key
    services
        .workflow_service
        .knowledge_extraction(
            &user,
            &KnowledgeExtractionRequest {
                model_name: "extraction-openai".to_string(),
                questions: vec![KnowledgeQuestion {
                    question: "Anything?".to_string(),
                    keywords: vec![],
                }],
                llm_provider: Some("openai".to_string()),
            },
        )
        .await
        .unwrap();
}
