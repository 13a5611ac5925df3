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
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bazaar_common::SafeDisplay;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clients::orchestrator::{Orchestrator, OrchestratorError};
use crate::config::LicenseConfig;

#[derive(Debug, Serialize, Deserialize)]
struct LicenseClaims {
    /// Total CPU MHz the installation may have allocated at once.
    cpu_mhz: i64,
    exp: i64,
}

/// The verified license, forwarded to dispatched jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseKey {
    pub key: String,
    pub cpu_mhz: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    #[error("Invalid license: {0}")]
    InvalidLicense(String),
    #[error("License capacity exceeded: requested {requested} MHz, {available} MHz available")]
    CapacityExceeded { requested: i64, available: i64 },
    #[error(transparent)]
    InternalOrchestratorError(#[from] OrchestratorError),
}

impl SafeDisplay for LicenseError {
    fn to_safe_string(&self) -> String {
        match self {
            LicenseError::InvalidLicense(_) => self.to_string(),
            LicenseError::CapacityExceeded { .. } => self.to_string(),
            LicenseError::InternalOrchestratorError(inner) => inner.to_safe_string(),
        }
    }
}

/// Gate on the cryptographically signed capacity policy: a dispatch passes
/// only when the cluster's current usage plus the requested CPU stays under
/// the licensed total.
#[async_trait]
pub trait LicenseVerifier: Send + Sync {
    async fn verify(&self, requested_mhz: i64) -> Result<LicenseKey, LicenseError>;
}

pub struct SignedLicenseVerifier {
    decoding_key: DecodingKey,
    license_key: String,
    orchestrator: Arc<dyn Orchestrator>,
}

impl SignedLicenseVerifier {
    pub fn new(
        config: &LicenseConfig,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<Self, String> {
        let public_der = BASE64
            .decode(&config.public_key)
            .map_err(|e| format!("Invalid license public key: {e}"))?;
        Ok(Self {
            decoding_key: DecodingKey::from_ed_der(&public_der),
            license_key: config.license_key.clone(),
            orchestrator,
        })
    }
}

#[async_trait]
impl LicenseVerifier for SignedLicenseVerifier {
    async fn verify(&self, requested_mhz: i64) -> Result<LicenseKey, LicenseError> {
        if self.license_key.is_empty() {
            return Err(LicenseError::InvalidLicense(
                "no license key configured".to_string(),
            ));
        }

        let validation = Validation::new(Algorithm::EdDSA);
        let data = jsonwebtoken::decode::<LicenseClaims>(
            &self.license_key,
            &self.decoding_key,
            &validation,
        )
        .map_err(|e| LicenseError::InvalidLicense(e.to_string()))?;

        let current = self.orchestrator.total_cpu_usage().await?;
        let available = data.claims.cpu_mhz - current;
        if requested_mhz > available {
            return Err(LicenseError::CapacityExceeded {
                requested: requested_mhz,
                available: available.max(0),
            });
        }

        Ok(LicenseKey {
            key: self.license_key.clone(),
            cpu_mhz: data.claims.cpu_mhz,
        })
    }
}

/// Used for local installations without a capacity policy.
pub struct UnlimitedLicenseVerifier;

#[async_trait]
impl LicenseVerifier for UnlimitedLicenseVerifier {
    async fn verify(&self, _requested_mhz: i64) -> Result<LicenseKey, LicenseError> {
        Ok(LicenseKey {
            key: String::new(),
            cpu_mhz: i64::MAX,
        })
    }
}
