use std::collections::HashMap;
use std::sync::Arc;

use crate::clients::orchestrator::Orchestrator;
use crate::model::DeploymentTarget;
use crate::service::ModelServiceError;

/// Service-discovery scrape targets for deployed model endpoints, in the
/// file_sd shape consumed by monitoring stacks.
pub struct TelemetryService {
    orchestrator: Arc<dyn Orchestrator>,
}

impl TelemetryService {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn deployment_services(&self) -> Result<Vec<DeploymentTarget>, ModelServiceError> {
        let endpoints = self.orchestrator.list_services().await?;

        Ok(endpoints
            .into_iter()
            .map(|endpoint| {
                let mut labels = HashMap::new();
                if let Some(model_id) = endpoint.model_id {
                    labels.insert("model_id".to_string(), model_id);
                }
                labels.insert("alloc_id".to_string(), endpoint.alloc_id);
                labels.insert("node_id".to_string(), endpoint.node_id);
                labels.insert("address".to_string(), endpoint.address.clone());

                DeploymentTarget {
                    targets: vec![format!("{}:{}", endpoint.address, endpoint.port)],
                    labels,
                }
            })
            .collect())
    }
}
