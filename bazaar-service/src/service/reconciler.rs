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

use bazaar_common::model::{ModelId, ModelStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::clients::orchestrator::{JobKind, Orchestrator};
use crate::repo::model::{ModelRecord, ModelRepo};
use crate::service::ModelServiceError;

/// Periodically compares DB lifecycle state against orchestrator reality
/// and flips models whose job disappeared or died to `failed`. Updates are
/// guarded by the previously read status, so a callback that raced the
/// tick always wins.
pub struct Reconciler {
    model_repo: Arc<dyn ModelRepo + Sync + Send>,
    orchestrator: Arc<dyn Orchestrator>,
    tick: Duration,
    stop_sender: Mutex<Option<watch::Sender<bool>>>,
}

impl Reconciler {
    pub fn new(
        model_repo: Arc<dyn ModelRepo + Sync + Send>,
        orchestrator: Arc<dyn Orchestrator>,
        tick: Duration,
    ) -> Self {
        Self {
            model_repo,
            orchestrator,
            tick,
            stop_sender: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>) {
        let (sender, mut receiver) = watch::channel(false);
        {
            let mut guard = self.stop_sender.lock().unwrap();
            if guard.is_some() {
                warn!("Reconciler already started");
                return;
            }
            *guard = Some(sender);
        }

        let reconciler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(reconciler.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("Reconciler started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = reconciler.run_once().await {
                            error!(error = %err, "Reconciler tick failed");
                        }
                    }
                    _ = receiver.changed() => {
                        info!("Reconciler stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Closing the stop channel is idempotent.
    pub fn stop(&self) {
        if let Some(sender) = self.stop_sender.lock().unwrap().take() {
            let _ = sender.send(true);
        }
    }

    /// One reconciliation pass; returns the number of status transitions.
    pub async fn run_once(&self) -> Result<usize, ModelServiceError> {
        let models = self.model_repo.in_lifecycle().await?;
        let mut transitions = 0;

        for model in models {
            transitions += self.reconcile_model(&model).await?;
        }

        Ok(transitions)
    }

    async fn reconcile_model(&self, model: &ModelRecord) -> Result<usize, ModelServiceError> {
        let model_id = ModelId(model.model_id);
        let mut transitions = 0;

        let train_status: ModelStatus = model
            .train_status
            .parse()
            .map_err(ModelServiceError::Internal)?;
        if matches!(train_status, ModelStatus::Starting | ModelStatus::InProgress) {
            let job_name = JobKind::Train.job_name(&model_id);
            if self.job_is_gone(&job_name).await? {
                let updated = self
                    .model_repo
                    .update_train_status_if(
                        &model.model_id,
                        &ModelStatus::Failed.to_string(),
                        &model.train_status,
                    )
                    .await?;
                if updated > 0 {
                    warn!(model_id = %model_id, "Train job disappeared, marking failed");
                    transitions += 1;
                }
            }
        }

        let deploy_status: ModelStatus = model
            .deploy_status
            .parse()
            .map_err(ModelServiceError::Internal)?;
        if deploy_status.is_active() {
            let job_name = JobKind::Deploy.job_name(&model_id);
            if self.job_is_gone(&job_name).await? {
                let updated = self
                    .model_repo
                    .update_deploy_status_if(
                        &model.model_id,
                        &ModelStatus::Failed.to_string(),
                        &model.deploy_status,
                    )
                    .await?;
                if updated > 0 {
                    warn!(model_id = %model_id, "Deploy job disappeared, marking failed");
                    transitions += 1;
                }
            }
        }

        Ok(transitions)
    }

    async fn job_is_gone(&self, job_name: &str) -> Result<bool, ModelServiceError> {
        match self.orchestrator.job_info(job_name).await? {
            None => Ok(true),
            Some(info) => Ok(info.is_dead()),
        }
    }
}
