use test_r::test;

use assert2::check;
use bazaar_common::model::{ModelStatus, ModelType};
use bazaar_service::clients::orchestrator::JobKind;
use bazaar_service::model::{
    DeployRequest, EnterpriseSearchRequest, JobOptions, NdbOptions, NdbTrainRequest,
    StatusUpdateRequest,
};
use bazaar_service::repo::model::ModelRepo;
use bazaar_service::service::license::LicenseError;
use bazaar_service::service::token::TokenScope;
use bazaar_service::service::ModelServiceError;
use bazaar_service_base::storage::blob::BlobStorage;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::all::{FixedCapacityLicense, TestServices};

#[test]
async fn train_dispatch_stages_config_and_marks_starting() {
    let services = TestServices::new().await;
    let user = services.user("trainer").await;

    let upload = services
        .train_service
        .upload_data(
            &user,
            vec![("docs.csv".to_string(), b"text,labels\nhi,greet\n".to_vec())],
            None,
        )
        .await
        .unwrap();

    let model = services
        .train_service
        .train_ndb(
            &user,
            NdbTrainRequest {
                model_name: "searchable".to_string(),
                base_model_id: None,
                model_options: Some(NdbOptions::default()),
                upload_ids: vec![upload.id],
                job_options: None,
            },
        )
        .await
        .unwrap();

    check!(model.train_status == ModelStatus::Starting);
    check!(services.orchestrator.started_count() == 1);

    let job = services.orchestrator.started.lock().unwrap()[0].clone();
    check!(job.name == JobKind::Train.job_name(&model.id));
    check!(job.env.contains_key("JOB_TOKEN"));

    let staged = services
        .blob_storage
        .get(
            bazaar_service_base::storage::blob::BlobNamespace::Model(model.id),
            std::path::Path::new("train_config.json"),
        )
        .await
        .unwrap();
    check!(staged.is_some());
}

#[test]
async fn train_requires_exactly_one_of_base_and_options() {
    let services = TestServices::new().await;
    let user = services.user("confused").await;

    let result = services
        .train_service
        .train_ndb(
            &user,
            NdbTrainRequest {
                model_name: "nope".to_string(),
                base_model_id: None,
                model_options: None,
                upload_ids: Vec::new(),
                job_options: None,
            },
        )
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn failed_submission_flips_model_to_failed() {
    let services = TestServices::new().await;
    let user = services.user("unlucky").await;

    services
        .orchestrator
        .fail_submissions
        .store(true, Ordering::SeqCst);

    let result = services
        .train_service
        .train_ndb(
            &user,
            NdbTrainRequest {
                model_name: "doomed".to_string(),
                base_model_id: None,
                model_options: Some(NdbOptions::default()),
                upload_ids: Vec::new(),
                job_options: None,
            },
        )
        .await;
    check!(matches!(
        result,
        Err(ModelServiceError::InternalOrchestratorError(_))
    ));

    // the failed intent is visible, never a dangling `starting`
    let record = services
        .model_repo
        .get_by_owner_and_name(&user.id.0, "doomed")
        .await
        .unwrap()
        .unwrap();
    check!(record.train_status == ModelStatus::Failed.to_string());
}

#[test]
async fn over_license_train_is_refused_without_a_row() {
    let services = TestServices::with_license(Arc::new(FixedCapacityLicense {
        cpu_mhz: 1000,
        current_mhz: 800,
    }))
    .await;
    let user = services.user("greedy").await;

    let result = services
        .train_service
        .train_ndb(
            &user,
            NdbTrainRequest {
                model_name: "too-big".to_string(),
                base_model_id: None,
                model_options: Some(NdbOptions::default()),
                upload_ids: Vec::new(),
                job_options: Some(JobOptions {
                    cpu_usage_mhz: Some(500),
                    ..JobOptions::default()
                }),
            },
        )
        .await;

    check!(matches!(
        result,
        Err(ModelServiceError::LicenseError(
            LicenseError::CapacityExceeded { .. }
        ))
    ));
    check!(services
        .model_repo
        .get_by_owner_and_name(&user.id.0, "too-big")
        .await
        .unwrap()
        .is_none());
    check!(services.orchestrator.started_count() == 0);
}

#[test]
async fn deploy_fans_out_over_the_dependency_closure() {
    let services = TestServices::new().await;
    let user = services.user("deployer").await;

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

    services
        .deploy_service
        .deploy(&user, &composite.id, &DeployRequest::default())
        .await
        .unwrap();

    // root + two dependencies
    check!(services.orchestrator.started_count() == 3);

    let info = services
        .model_service
        .get(&user, &composite.id)
        .await
        .unwrap();
    check!(info.model.deploy_status == ModelStatus::Starting);

    // deploying again while active submits nothing new
    services
        .deploy_service
        .deploy(&user, &composite.id, &DeployRequest::default())
        .await
        .unwrap();
    check!(services.orchestrator.started_count() == 3);
}

#[test]
async fn deploy_requires_completed_training() {
    let services = TestServices::new().await;
    let user = services.user("impatient").await;

    let model_id = services
        .complete_model(&user, "still-training", ModelType::Ndb)
        .await;
    services
        .model_repo
        .update_train_status(&model_id.0, &ModelStatus::InProgress.to_string())
        .await
        .unwrap();

    let result = services
        .deploy_service
        .deploy(&user, &model_id, &DeployRequest::default())
        .await;
    check!(matches!(
        result,
        Err(ModelServiceError::TrainingIncomplete(_))
    ));
}

#[test]
async fn stop_is_blocked_while_a_deployed_dependent_exists() {
    let services = TestServices::new().await;
    let user = services.user("stopper").await;

    let retrieval = services
        .complete_model(&user, "retrieval", ModelType::Ndb)
        .await;
    let composite = services
        .workflow_service
        .enterprise_search(
            &user,
            &EnterpriseSearchRequest {
                model_name: "search".to_string(),
                retrieval_id: retrieval,
                guardrail_id: None,
                classifier_id: None,
            },
        )
        .await
        .unwrap();

    services
        .deploy_service
        .deploy(&user, &composite.id, &DeployRequest::default())
        .await
        .unwrap();

    let result = services.deploy_service.stop(&user, &retrieval).await;
    check!(matches!(result, Err(ModelServiceError::StopBlocked(_))));

    services
        .deploy_service
        .stop(&user, &composite.id)
        .await
        .unwrap();
    services.deploy_service.stop(&user, &retrieval).await.unwrap();

    let info = services.model_service.get(&user, &retrieval).await.unwrap();
    check!(info.model.deploy_status == ModelStatus::Stopped);
}

#[test]
async fn reconciler_flips_abandoned_deployments_once() {
    let services = TestServices::new().await;
    let user = services.user("abandoned").await;

    let model_id = services
        .complete_model(&user, "ghost", ModelType::Ndb)
        .await;
    services
        .model_repo
        .update_deploy_status(&model_id.0, &ModelStatus::InProgress.to_string())
        .await
        .unwrap();

    // the orchestrator has no such job, so the first tick flips it
    let transitions = services.reconciler.run_once().await.unwrap();
    check!(transitions == 1);
    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();
    check!(record.deploy_status == ModelStatus::Failed.to_string());

    // the next tick leaves the row alone
    let transitions = services.reconciler.run_once().await.unwrap();
    check!(transitions == 0);
}

#[test]
async fn reconciler_leaves_running_jobs_alone() {
    let services = TestServices::new().await;
    let user = services.user("patient").await;

    let upload = services
        .train_service
        .upload_data(
            &user,
            vec![("data.csv".to_string(), b"a,b\n1,2\n".to_vec())],
            None,
        )
        .await
        .unwrap();
    let model = services
        .train_service
        .train_ndb(
            &user,
            NdbTrainRequest {
                model_name: "running".to_string(),
                base_model_id: None,
                model_options: Some(NdbOptions::default()),
                upload_ids: vec![upload.id],
                job_options: None,
            },
        )
        .await
        .unwrap();

    let transitions = services.reconciler.run_once().await.unwrap();
    check!(transitions == 0);

    // once the job disappears, the next tick fails the model
    services
        .orchestrator
        .forget_job(&JobKind::Train.job_name(&model.id));
    let transitions = services.reconciler.run_once().await.unwrap();
    check!(transitions == 1);
}

#[test]
async fn job_callbacks_drive_the_status_machine() {
    let services = TestServices::new().await;
    let user = services.user("callback").await;

    let model_id = services
        .complete_model(&user, "called-back", ModelType::Ndb)
        .await;
    services
        .model_repo
        .update_train_status(&model_id.0, &ModelStatus::Starting.to_string())
        .await
        .unwrap();

    let job_token = services
        .token_service
        .mint(&model_id, TokenScope::Job)
        .unwrap();

    services
        .train_service
        .update_status(&StatusUpdateRequest {
            token: job_token.clone(),
            status: ModelStatus::InProgress,
        })
        .await
        .unwrap();
    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();
    check!(record.train_status == ModelStatus::InProgress.to_string());

    services
        .train_service
        .update_status(&StatusUpdateRequest {
            token: job_token.clone(),
            status: ModelStatus::Complete,
        })
        .await
        .unwrap();
    let record = services.model_repo.get(&model_id.0).await.unwrap().unwrap();
    check!(record.train_status == ModelStatus::Complete.to_string());

    // jobs cannot report lifecycle states owned by the control plane
    let result = services
        .train_service
        .update_status(&StatusUpdateRequest {
            token: job_token,
            status: ModelStatus::Stopped,
        })
        .await;
    check!(matches!(result, Err(ModelServiceError::ArgValidation(_))));
}

#[test]
async fn job_log_callbacks_are_aggregated_into_status() {
    let services = TestServices::new().await;
    let user = services.user("logger").await;

    let model_id = services
        .complete_model(&user, "logged", ModelType::Ndb)
        .await;
    let job_token = services
        .token_service
        .mint(&model_id, TokenScope::Job)
        .unwrap();

    services
        .train_service
        .log(&bazaar_service::model::JobLogRequest {
            token: job_token.clone(),
            level: bazaar_common::model::JobLogLevel::Warning,
            message: "low disk".to_string(),
        })
        .await
        .unwrap();
    services
        .train_service
        .log(&bazaar_service::model::JobLogRequest {
            token: job_token,
            level: bazaar_common::model::JobLogLevel::Error,
            message: "bad shard".to_string(),
        })
        .await
        .unwrap();

    let status = services.train_service.status(&user, &model_id).await.unwrap();
    check!(status.warnings == vec!["low disk".to_string()]);
    check!(status.errors == vec!["bad shard".to_string()]);
}
