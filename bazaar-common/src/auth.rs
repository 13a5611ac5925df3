use crate::model::TokenSecret;
use poem::Request;
use poem_openapi::auth::{ApiKey, Bearer};
use poem_openapi::SecurityScheme;
use std::str::FromStr;

/// The two ways a caller can authenticate against the control plane: a
/// session token from the identity provider, or a `prefix.secret` API key on
/// model-scoped endpoints.
#[derive(SecurityScheme)]
pub enum BazaarSecurityScheme {
    Bearer(BazaarBearer),
    ApiKey(BazaarApiKey),
}

#[derive(SecurityScheme)]
#[oai(rename = "Token", ty = "bearer", checker = "bearer_checker")]
pub struct BazaarBearer(pub TokenSecret);

#[derive(SecurityScheme)]
#[oai(
    rename = "ApiKey",
    ty = "api_key",
    key_in = "header",
    key_name = "X-API-Key",
    checker = "api_key_checker"
)]
pub struct BazaarApiKey(pub TokenSecret);

async fn bearer_checker(_: &Request, bearer: Bearer) -> Option<TokenSecret> {
    TokenSecret::from_str(&bearer.token).ok()
}

async fn api_key_checker(_: &Request, api_key: ApiKey) -> Option<TokenSecret> {
    TokenSecret::from_str(&api_key.key).ok()
}

impl BazaarSecurityScheme {
    pub fn secret(self) -> TokenSecret {
        match self {
            BazaarSecurityScheme::Bearer(bearer) => bearer.0,
            BazaarSecurityScheme::ApiKey(api_key) => api_key.0,
        }
    }

    pub fn is_api_key(&self) -> bool {
        matches!(self, BazaarSecurityScheme::ApiKey(_))
    }
}

impl AsRef<TokenSecret> for BazaarSecurityScheme {
    fn as_ref(&self) -> &TokenSecret {
        match self {
            BazaarSecurityScheme::Bearer(bearer) => &bearer.0,
            BazaarSecurityScheme::ApiKey(api_key) => &api_key.0,
        }
    }
}

pub const AUTH_ERROR_MESSAGE: &str = "authorization error";
