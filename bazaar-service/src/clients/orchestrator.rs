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

use async_trait::async_trait;
use bazaar_common::model::ModelId;
use bazaar_common::SafeDisplay;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use crate::config::{DockerRegistryConfig, OrchestratorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Train,
    Deploy,
    Backup,
}

impl JobKind {
    pub fn job_name(&self, model_id: &ModelId) -> String {
        match self {
            JobKind::Train => format!("train-{model_id}"),
            JobKind::Deploy => format!("deploy-{model_id}"),
            JobKind::Backup => format!("backup-{model_id}"),
        }
    }

    fn nomad_type(&self) -> &'static str {
        match self {
            JobKind::Train | JobKind::Backup => "batch",
            JobKind::Deploy => "service",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobResources {
    pub cpu_mhz: i64,
    pub cores: i64,
    pub memory_mb: i64,
    pub memory_max_mb: i64,
}

#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub name: String,
    pub kind: JobKind,
    pub docker_image: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub resources: JobResources,
    pub count: u32,
    pub autoscaling_max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub name: String,
    pub state: JobState,
}

impl JobInfo {
    pub fn is_dead(&self) -> bool {
        self.state == JobState::Dead
    }
}

/// One instance of a deployed model endpoint in the orchestrator's service
/// registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service_name: String,
    pub model_id: Option<String>,
    pub alloc_id: String,
    pub node_id: String,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Orchestrator request failed: {0}")]
    Request(String),
    #[error("Unexpected orchestrator response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(error: reqwest::Error) -> Self {
        OrchestratorError::Request(error.to_string())
    }
}

impl SafeDisplay for OrchestratorError {
    fn to_safe_string(&self) -> String {
        "Cluster orchestrator error".to_string()
    }
}

/// Opaque interface to the external cluster scheduler. The control plane
/// only submits descriptors and inspects job state; it never runs ML code.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn start_job(&self, job: &JobDescriptor) -> Result<(), OrchestratorError>;

    async fn stop_job(&self, name: &str) -> Result<(), OrchestratorError>;

    async fn job_info(&self, name: &str) -> Result<Option<JobInfo>, OrchestratorError>;

    async fn job_logs(&self, name: &str) -> Result<String, OrchestratorError>;

    async fn list_services(&self) -> Result<Vec<ServiceEndpoint>, OrchestratorError>;

    /// CPU MHz currently allocated across all running jobs; the license
    /// capacity is checked against this.
    async fn total_cpu_usage(&self) -> Result<i64, OrchestratorError>;
}

/// Nomad HTTP API client.
pub struct NomadOrchestrator {
    client: reqwest::Client,
    base_url: Url,
    registry: DockerRegistryConfig,
}

impl NomadOrchestrator {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.nomad_url.clone(),
            registry: config.docker_registry.clone(),
        }
    }

    fn url(&self, path: &str) -> Result<Url, OrchestratorError> {
        self.base_url
            .join(path)
            .map_err(|e| OrchestratorError::UnexpectedResponse(e.to_string()))
    }

    fn job_payload(&self, job: &JobDescriptor) -> serde_json::Value {
        let mut config = json!({
            "image": job.docker_image,
            "args": job.args,
        });
        if !self.registry.username.is_empty() {
            config["auth"] = json!([{
                "username": self.registry.username,
                "password": self.registry.password,
                "server_address": self.registry.registry,
            }]);
        }

        let mut task = json!({
            "Name": job.name,
            "Driver": "docker",
            "Config": config,
            "Env": job.env,
            "Resources": {
                "CPU": job.resources.cpu_mhz,
                "Cores": job.resources.cores,
                "MemoryMB": job.resources.memory_mb,
                "MemoryMaxMB": job.resources.memory_max_mb,
            },
        });

        if job.kind == JobKind::Deploy {
            task["Services"] = json!([{
                "Name": job.name,
                "PortLabel": "http",
                "Provider": "nomad",
            }]);
        }

        let mut group = json!({
            "Name": job.name,
            "Count": job.count,
            "Tasks": [task],
        });

        if job.kind == JobKind::Deploy {
            group["Networks"] = json!([{"DynamicPorts": [{"Label": "http"}]}]);
            group["Scaling"] = json!({
                "Enabled": true,
                "Min": 1,
                "Max": job.autoscaling_max,
            });
        }

        json!({
            "Job": {
                "ID": job.name,
                "Name": job.name,
                "Type": job.kind.nomad_type(),
                "TaskGroups": [group],
            }
        })
    }
}

#[async_trait]
impl Orchestrator for NomadOrchestrator {
    async fn start_job(&self, job: &JobDescriptor) -> Result<(), OrchestratorError> {
        debug!(job_name = job.name, "Submitting job to Nomad");
        let response = self
            .client
            .post(self.url("/v1/jobs")?)
            .json(&self.job_payload(job))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(OrchestratorError::Request(format!(
                "Job registration for {} failed with {}",
                job.name,
                response.status()
            )))
        }
    }

    async fn stop_job(&self, name: &str) -> Result<(), OrchestratorError> {
        debug!(job_name = name, "Stopping Nomad job");
        let response = self
            .client
            .delete(self.url(&format!("/v1/job/{name}?purge=true"))?)
            .send()
            .await?;

        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(OrchestratorError::Request(format!(
                "Stopping job {} failed with {}",
                name,
                response.status()
            )))
        }
    }

    async fn job_info(&self, name: &str) -> Result<Option<JobInfo>, OrchestratorError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/job/{name}"))?)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: serde_json::Value = response.json().await?;
        let status = body
            .get("Status")
            .and_then(|s| s.as_str())
            .ok_or_else(|| {
                OrchestratorError::UnexpectedResponse(format!("Job {name} has no status"))
            })?;

        let state = match status {
            "pending" => JobState::Pending,
            "running" => JobState::Running,
            _ => JobState::Dead,
        };

        Ok(Some(JobInfo {
            name: name.to_string(),
            state,
        }))
    }

    async fn job_logs(&self, name: &str) -> Result<String, OrchestratorError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/job/{name}/allocations"))?)
            .send()
            .await?;
        let allocations: serde_json::Value = response.json().await?;

        let mut lines = Vec::new();
        for allocation in allocations.as_array().into_iter().flatten() {
            if let Some(states) = allocation.get("TaskStates").and_then(|s| s.as_object()) {
                for (task, state) in states {
                    for event in state
                        .get("Events")
                        .and_then(|e| e.as_array())
                        .into_iter()
                        .flatten()
                    {
                        if let Some(message) = event.get("DisplayMessage").and_then(|m| m.as_str())
                        {
                            lines.push(format!("{task}: {message}"));
                        }
                    }
                }
            }
        }

        Ok(lines.join("\n"))
    }

    async fn list_services(&self) -> Result<Vec<ServiceEndpoint>, OrchestratorError> {
        let response = self.client.get(self.url("/v1/services")?).send().await?;
        let namespaces: serde_json::Value = response.json().await?;

        let mut names = Vec::new();
        for namespace in namespaces.as_array().into_iter().flatten() {
            for service in namespace
                .get("Services")
                .and_then(|s| s.as_array())
                .into_iter()
                .flatten()
            {
                if let Some(name) = service.get("ServiceName").and_then(|n| n.as_str()) {
                    if name.starts_with("deploy-") {
                        names.push(name.to_string());
                    }
                }
            }
        }

        let mut endpoints = Vec::new();
        for name in names {
            let response = self
                .client
                .get(self.url(&format!("/v1/service/{name}"))?)
                .send()
                .await?;
            let instances: serde_json::Value = response.json().await?;

            for instance in instances.as_array().into_iter().flatten() {
                let address = instance
                    .get("Address")
                    .and_then(|a| a.as_str())
                    .unwrap_or_default()
                    .to_string();
                let port = instance.get("Port").and_then(|p| p.as_u64()).unwrap_or(0) as u16;
                endpoints.push(ServiceEndpoint {
                    service_name: name.clone(),
                    model_id: name.strip_prefix("deploy-").map(|id| id.to_string()),
                    alloc_id: instance
                        .get("AllocID")
                        .and_then(|a| a.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    node_id: instance
                        .get("NodeID")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    address,
                    port,
                });
            }
        }

        Ok(endpoints)
    }

    async fn total_cpu_usage(&self) -> Result<i64, OrchestratorError> {
        let response = self
            .client
            .get(self.url("/v1/allocations?resources=true")?)
            .send()
            .await?;
        let allocations: serde_json::Value = response.json().await?;

        let mut total = 0i64;
        for allocation in allocations.as_array().into_iter().flatten() {
            let running = allocation
                .get("ClientStatus")
                .and_then(|s| s.as_str())
                .map(|s| s == "running")
                .unwrap_or(false);
            if !running {
                continue;
            }
            if let Some(tasks) = allocation
                .get("AllocatedResources")
                .and_then(|r| r.get("Tasks"))
                .and_then(|t| t.as_object())
            {
                for task in tasks.values() {
                    total += task
                        .get("Cpu")
                        .and_then(|c| c.get("CpuShares"))
                        .and_then(|c| c.as_i64())
                        .unwrap_or(0);
                }
            }
        }

        Ok(total)
    }
}
