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
use bazaar_common::model::{TokenSecret, UserId};
use bazaar_common::SafeDisplay;
use bazaar_service_base::repo::RepoError;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::IdentityConfig;
use crate::model::User;
use crate::repo::user::{UserRecord, UserRepo};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid session token: {0}")]
    InvalidToken(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("User already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid request: {}", .0.join(", "))]
    ArgValidation(Vec<String>),
    #[error(transparent)]
    InternalRepoError(#[from] RepoError),
    #[error("Internal identity provider error: {0}")]
    Internal(String),
}

impl SafeDisplay for IdentityError {
    fn to_safe_string(&self) -> String {
        match self {
            IdentityError::InvalidCredentials => self.to_string(),
            IdentityError::InvalidToken(_) => "Invalid session token".to_string(),
            IdentityError::UserNotFound(_) => self.to_string(),
            IdentityError::AlreadyExists(_) => self.to_string(),
            IdentityError::ArgValidation(_) => self.to_string(),
            IdentityError::InternalRepoError(inner) => inner.to_safe_string(),
            IdentityError::Internal(_) => "Internal identity provider error".to_string(),
        }
    }
}

/// Opaque identity provider interface: authenticates users and owns the
/// session token format.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn login_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(TokenSecret, User), IdentityError>;

    async fn login_with_token(&self, token: &TokenSecret) -> Result<User, IdentityError>;

    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<User, IdentityError>;

    async fn verify_user(&self, user_id: &UserId) -> Result<(), IdentityError>;

    async fn delete_user(&self, user_id: &UserId) -> Result<(), IdentityError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Identity provider backed by the local user table. Passwords are stored
/// as `salt$sha256(salt || password)`, sessions are EdDSA JWTs.
pub struct LocalIdentityProvider {
    user_repo: Arc<dyn UserRepo + Sync + Send>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
}

impl LocalIdentityProvider {
    pub fn new(
        config: &IdentityConfig,
        user_repo: Arc<dyn UserRepo + Sync + Send>,
    ) -> Result<Self, String> {
        let private_der = BASE64
            .decode(&config.ed_dsa.private_key)
            .map_err(|e| format!("Invalid EdDSA private key: {e}"))?;
        let public_der = BASE64
            .decode(&config.ed_dsa.public_key)
            .map_err(|e| format!("Invalid EdDSA public key: {e}"))?;

        Ok(Self {
            user_repo,
            encoding_key: EncodingKey::from_ed_der(&private_der),
            decoding_key: DecodingKey::from_ed_der(&public_der),
            session_ttl: config.session_token_ttl,
        })
    }

    pub fn hash_password(password: &str) -> String {
        let mut salt = [0u8; 16];
        rand::rng().fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        let digest = Sha256::digest(format!("{salt}{password}").as_bytes());
        format!("{salt}${}", hex::encode(digest))
    }

    fn password_matches(stored: &str, password: &str) -> bool {
        let Some((salt, hash)) = stored.split_once('$') else {
            return false;
        };
        let digest = hex::encode(Sha256::digest(format!("{salt}{password}").as_bytes()));
        constant_time_eq(digest.as_bytes(), hash.as_bytes())
    }

    fn mint_session(&self, user_id: &UserId) -> Result<TokenSecret, IdentityError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now
                + chrono::Duration::from_std(self.session_ttl).unwrap_or(chrono::Duration::MAX))
            .timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::EdDSA),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| IdentityError::Internal(e.to_string()))?;
        Ok(TokenSecret::new(token))
    }
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn login_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(TokenSecret, User), IdentityError> {
        let record = self
            .user_repo
            .get_by_email(email)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !Self::password_matches(&record.password_hash, password) {
            return Err(IdentityError::InvalidCredentials);
        }

        let user: User = record.into();
        let token = self.mint_session(&user.id)?;
        Ok((token, user))
    }

    async fn login_with_token(&self, token: &TokenSecret) -> Result<User, IdentityError> {
        let validation = Validation::new(Algorithm::EdDSA);
        let data =
            jsonwebtoken::decode::<SessionClaims>(&token.value, &self.decoding_key, &validation)
                .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        let user_id =
            UserId::from_str(&data.claims.sub).map_err(IdentityError::InvalidToken)?;
        let record = self
            .user_repo
            .get(&user_id.0)
            .await?
            .ok_or_else(|| IdentityError::UserNotFound(user_id.to_string()))?;

        Ok(record.into())
    }

    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<User, IdentityError> {
        let mut errors = Vec::new();
        if username.trim().is_empty() {
            errors.push("username must not be empty".to_string());
        }
        if email.trim().is_empty() || !email.contains('@') {
            errors.push("email is invalid".to_string());
        }
        if password.len() < 8 {
            errors.push("password must be at least 8 characters".to_string());
        }
        if !errors.is_empty() {
            return Err(IdentityError::ArgValidation(errors));
        }

        let record = UserRecord {
            user_id: uuid::Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: Self::hash_password(password),
            is_admin,
            verified: false,
            created_at: Utc::now(),
        };

        match self.user_repo.create(&record).await {
            Ok(()) => Ok(record.into()),
            Err(RepoError::UniqueViolation(_)) => {
                Err(IdentityError::AlreadyExists(username.to_string()))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn verify_user(&self, user_id: &UserId) -> Result<(), IdentityError> {
        self.user_repo
            .get(&user_id.0)
            .await?
            .ok_or_else(|| IdentityError::UserNotFound(user_id.to_string()))?;
        self.user_repo.set_verified(&user_id.0, true).await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<(), IdentityError> {
        self.user_repo
            .get(&user_id.0)
            .await?
            .ok_or_else(|| IdentityError::UserNotFound(user_id.to_string()))?;
        self.user_repo.delete(&user_id.0).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = LocalIdentityProvider::hash_password("hunter2hunter2");
        assert!(LocalIdentityProvider::password_matches(
            &hash,
            "hunter2hunter2"
        ));
        assert!(!LocalIdentityProvider::password_matches(&hash, "hunter2"));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"abc", b"abc"));
    }
}
