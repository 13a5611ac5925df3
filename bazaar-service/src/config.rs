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

use bazaar_common::config::{ConfigLoader, DbConfig};
use bazaar_common::model::Empty;
use bazaar_common::tracing::TracingConfig;
use bazaar_common::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BazaarServiceConfig {
    pub tracing: TracingConfig,
    pub environment: String,
    pub http_port: u16,
    pub db: DbConfig,
    pub blob_storage: BlobStorageConfig,
    pub orchestrator: OrchestratorConfig,
    pub tokens: ScopedTokenConfig,
    pub identity: IdentityConfig,
    pub license: LicenseConfig,
    pub reconciler: ReconcilerConfig,
    pub variables: VariablesConfig,
    pub cors_origin_regex: String,
}

impl Default for BazaarServiceConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::local_dev("bazaar-service"),
            environment: "dev".to_string(),
            http_port: 8080,
            db: DbConfig::default(),
            blob_storage: BlobStorageConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            tokens: ScopedTokenConfig::default(),
            identity: IdentityConfig::default(),
            license: LicenseConfig::default(),
            reconciler: ReconcilerConfig::default(),
            variables: VariablesConfig::default(),
            cors_origin_regex: "https://*.localhost".to_string(),
        }
    }
}

impl SafeDisplay for BazaarServiceConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "tracing:");
        let _ = writeln!(&mut result, "{}", self.tracing.to_safe_string_indented());
        let _ = writeln!(&mut result, "environment: {}", self.environment);
        let _ = writeln!(&mut result, "HTTP port: {}", self.http_port);
        let _ = writeln!(&mut result, "DB:");
        let _ = writeln!(&mut result, "{}", self.db.to_safe_string_indented());
        let _ = writeln!(&mut result, "blob storage:");
        let _ = writeln!(
            &mut result,
            "{}",
            self.blob_storage.to_safe_string_indented()
        );
        let _ = writeln!(&mut result, "orchestrator:");
        let _ = writeln!(
            &mut result,
            "{}",
            self.orchestrator.to_safe_string_indented()
        );
        let _ = writeln!(&mut result, "reconciler:");
        let _ = writeln!(&mut result, "{}", self.reconciler.to_safe_string_indented());
        let _ = writeln!(&mut result, "variables:");
        let _ = writeln!(&mut result, "{}", self.variables.to_safe_string_indented());
        let _ = writeln!(&mut result, "CORS origin regex: {}", self.cors_origin_regex);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum BlobStorageConfig {
    LocalFileSystem(LocalFileSystemBlobStorageConfig),
    InMemory(Empty),
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        BlobStorageConfig::LocalFileSystem(LocalFileSystemBlobStorageConfig {
            root: PathBuf::from("../data/bazaar_blob_storage"),
        })
    }
}

impl SafeDisplay for BlobStorageConfig {
    fn to_safe_string(&self) -> String {
        match self {
            BlobStorageConfig::LocalFileSystem(inner) => {
                format!("local file system: {}", inner.root.display())
            }
            BlobStorageConfig::InMemory(_) => "in memory".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalFileSystemBlobStorageConfig {
    pub root: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub nomad_url: Url,
    pub docker_registry: DockerRegistryConfig,
    pub train_image: String,
    pub deploy_image: String,
    pub backup_image: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            nomad_url: Url::parse("http://localhost:4646").unwrap(),
            docker_registry: DockerRegistryConfig::default(),
            train_image: "model-bazaar/train:latest".to_string(),
            deploy_image: "model-bazaar/deploy:latest".to_string(),
            backup_image: "model-bazaar/backup:latest".to_string(),
        }
    }
}

impl SafeDisplay for OrchestratorConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "nomad url: {}", self.nomad_url);
        let _ = writeln!(&mut result, "docker registry:");
        let _ = writeln!(
            &mut result,
            "{}",
            self.docker_registry.to_safe_string_indented()
        );
        let _ = writeln!(&mut result, "train image: {}", self.train_image);
        let _ = writeln!(&mut result, "deploy image: {}", self.deploy_image);
        let _ = writeln!(&mut result, "backup image: {}", self.backup_image);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DockerRegistryConfig {
    pub registry: String,
    pub username: String,
    pub password: String,
}

impl Default for DockerRegistryConfig {
    fn default() -> Self {
        Self {
            registry: "docker.io".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl SafeDisplay for DockerRegistryConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "registry: {}", self.registry);
        let _ = writeln!(&mut result, "username: {}", self.username);
        let _ = writeln!(&mut result, "password: ****");
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdDsaConfig {
    pub private_key: String,
    pub public_key: String,
}

impl SafeDisplay for EdDsaConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "public key: {}", self.public_key);
        let _ = writeln!(&mut result, "private key: ****");
        result
    }
}

impl Default for EdDsaConfig {
    fn default() -> Self {
        EdDsaConfig {
            private_key: "MC4CAQAwBQYDK2VwBCIEIMDNO+xRAwWTDqt5wN84sCHviRldQMiylmSK715b5JnW"
                .to_string(),
            public_key: "MCowBQYDK2VwAyEA9gxANNtlWPBBTm0IEgvMgCEUXw+ohwffyM9wOL4O1pg=".to_string(),
        }
    }
}

/// Short-lived scoped tokens for chunked uploads and job callbacks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopedTokenConfig {
    pub ed_dsa: EdDsaConfig,
    #[serde(with = "humantime_serde")]
    pub upload_token_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub job_token_ttl: Duration,
}

impl Default for ScopedTokenConfig {
    fn default() -> Self {
        Self {
            ed_dsa: EdDsaConfig::default(),
            upload_token_ttl: Duration::from_secs(10 * 60),
            // jobs may run (and call back) for a very long time
            job_token_ttl: Duration::from_secs(10 * 365 * 24 * 60 * 60),
        }
    }
}

impl SafeDisplay for ScopedTokenConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "EdDSA:");
        let _ = writeln!(&mut result, "{}", self.ed_dsa.to_safe_string_indented());
        let _ = writeln!(&mut result, "upload token TTL: {:?}", self.upload_token_ttl);
        let _ = writeln!(&mut result, "job token TTL: {:?}", self.job_token_ttl);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub ed_dsa: EdDsaConfig,
    #[serde(with = "humantime_serde")]
    pub session_token_ttl: Duration,
    pub bootstrap_admin: Option<BootstrapAdminConfig>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            ed_dsa: EdDsaConfig::default(),
            session_token_ttl: Duration::from_secs(24 * 60 * 60),
            bootstrap_admin: Some(BootstrapAdminConfig {
                username: "admin".to_string(),
                email: "admin@bazaar.local".to_string(),
                password: "change-me-now".to_string(),
            }),
        }
    }
}

impl SafeDisplay for IdentityConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "EdDSA:");
        let _ = writeln!(&mut result, "{}", self.ed_dsa.to_safe_string_indented());
        let _ = writeln!(
            &mut result,
            "session token TTL: {:?}",
            self.session_token_ttl
        );
        if let Some(admin) = &self.bootstrap_admin {
            let _ = writeln!(&mut result, "bootstrap admin: {}", admin.username);
        }
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapAdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// The license key is an EdDSA-signed claim of the total CPU MHz the
/// installation may schedule at once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LicenseConfig {
    pub public_key: String,
    pub license_key: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            public_key: EdDsaConfig::default().public_key,
            license_key: String::new(),
        }
    }
}

impl SafeDisplay for LicenseConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "public key: {}", self.public_key);
        let _ = writeln!(&mut result, "license key: ****");
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick: Duration::from_secs(10),
        }
    }
}

impl SafeDisplay for ReconcilerConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "enabled: {}", self.enabled);
        let _ = writeln!(&mut result, "tick: {:?}", self.tick);
        result
    }
}

/// Process-wide variables forwarded into job environments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariablesConfig {
    /// Public endpoint jobs use for status/log callbacks.
    pub model_bazaar_endpoint: Url,
    pub cloud_credentials: CloudCredentialsConfig,
    /// provider name -> api key; `on-prem` needs no key
    pub llm_providers: HashMap<String, String>,
    pub is_local: bool,
}

impl Default for VariablesConfig {
    fn default() -> Self {
        Self {
            model_bazaar_endpoint: Url::parse("http://localhost:8080").unwrap(),
            cloud_credentials: CloudCredentialsConfig::default(),
            llm_providers: HashMap::new(),
            is_local: true,
        }
    }
}

impl SafeDisplay for VariablesConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(
            &mut result,
            "model bazaar endpoint: {}",
            self.model_bazaar_endpoint
        );
        let _ = writeln!(
            &mut result,
            "llm providers: {}",
            self.llm_providers
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        let _ = writeln!(&mut result, "is local: {}", self.is_local);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CloudCredentialsConfig {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub azure_storage_account: Option<String>,
    pub azure_storage_key: Option<String>,
    pub gcp_credentials_json: Option<String>,
}

impl CloudCredentialsConfig {
    /// Environment entries for job descriptors; secrets stay out of logs.
    pub fn as_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(value) = &self.aws_access_key_id {
            env.push(("AWS_ACCESS_KEY_ID".to_string(), value.clone()));
        }
        if let Some(value) = &self.aws_secret_access_key {
            env.push(("AWS_SECRET_ACCESS_KEY".to_string(), value.clone()));
        }
        if let Some(value) = &self.azure_storage_account {
            env.push(("AZURE_STORAGE_ACCOUNT".to_string(), value.clone()));
        }
        if let Some(value) = &self.azure_storage_key {
            env.push(("AZURE_STORAGE_KEY".to_string(), value.clone()));
        }
        if let Some(value) = &self.gcp_credentials_json {
            env.push(("GOOGLE_APPLICATION_CREDENTIALS_JSON".to_string(), value.clone()));
        }
        env
    }
}

pub fn make_config_loader() -> ConfigLoader<BazaarServiceConfig> {
    ConfigLoader::new(&PathBuf::from("config/bazaar-service.toml"))
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use crate::config::make_config_loader;

    #[test]
    pub fn config_is_loadable() {
        make_config_loader().load().expect("Failed to load config");
    }
}
