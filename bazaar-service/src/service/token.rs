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

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bazaar_common::model::{ModelId, TokenSecret};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::config::ScopedTokenConfig;

/// What a scoped token is allowed to do. Upload tokens drive the chunk
/// protocol of one model; job tokens authenticate status/log callbacks of
/// one running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    Upload,
    Job,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScopedClaims {
    sub: String,
    scope: TokenScope,
    iat: i64,
    exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token has the wrong scope")]
    WrongScope,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Mints and verifies short-lived scoped tokens (EdDSA JWTs). The model id
/// is carried in the token itself, so callback endpoints never trust ids
/// from request bodies.
pub struct ScopedTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    upload_ttl: Duration,
    job_ttl: Duration,
}

impl ScopedTokenService {
    pub fn new(config: &ScopedTokenConfig) -> Result<Self, String> {
        let private_der = BASE64
            .decode(&config.ed_dsa.private_key)
            .map_err(|e| format!("Invalid EdDSA private key: {e}"))?;
        let public_der = BASE64
            .decode(&config.ed_dsa.public_key)
            .map_err(|e| format!("Invalid EdDSA public key: {e}"))?;

        Ok(Self {
            encoding_key: EncodingKey::from_ed_der(&private_der),
            decoding_key: DecodingKey::from_ed_der(&public_der),
            upload_ttl: config.upload_token_ttl,
            job_ttl: config.job_token_ttl,
        })
    }

    pub fn mint(&self, model_id: &ModelId, scope: TokenScope) -> Result<TokenSecret, TokenError> {
        let ttl = match scope {
            TokenScope::Upload => self.upload_ttl,
            TokenScope::Job => self.job_ttl,
        };
        let now = Utc::now();
        let claims = ScopedClaims {
            sub: model_id.to_string(),
            scope,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX))
                .timestamp(),
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::EdDSA),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| TokenError::Invalid(e.to_string()))?;

        Ok(TokenSecret::new(token))
    }

    pub fn verify(
        &self,
        token: &TokenSecret,
        expected_scope: TokenScope,
    ) -> Result<ModelId, TokenError> {
        let validation = Validation::new(Algorithm::EdDSA);
        let data =
            jsonwebtoken::decode::<ScopedClaims>(&token.value, &self.decoding_key, &validation)
                .map_err(|e| match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Invalid(e.to_string()),
                })?;

        if data.claims.scope != expected_scope {
            return Err(TokenError::WrongScope);
        }

        ModelId::from_str(&data.claims.sub).map_err(TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::*;
    use crate::config::ScopedTokenConfig;

    fn service() -> ScopedTokenService {
        ScopedTokenService::new(&ScopedTokenConfig::default()).unwrap()
    }

    #[test]
    fn minted_token_verifies_with_matching_scope() {
        let service = service();
        let model_id = ModelId::new_v4();

        let token = service.mint(&model_id, TokenScope::Upload).unwrap();
        let verified = service.verify(&token, TokenScope::Upload).unwrap();

        assert_eq!(verified, model_id);
    }

    #[test]
    fn scope_mismatch_is_rejected() {
        let service = service();
        let model_id = ModelId::new_v4();

        let token = service.mint(&model_id, TokenScope::Upload).unwrap();
        let result = service.verify(&token, TokenScope::Job);

        assert!(matches!(result, Err(TokenError::WrongScope)));
    }

    #[test]
    fn garbage_is_rejected() {
        let service = service();
        let result = service.verify(
            &TokenSecret::new("not-a-jwt".to_string()),
            TokenScope::Upload,
        );
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }
}
