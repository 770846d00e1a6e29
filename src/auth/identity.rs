use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use super::AuthError;

/// Confirms with the identity provider that a bearer token belongs to a live account.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<serde_json::Value>,
}

/// Identity Platform `accounts:lookup` client
pub struct IdentityPlatformVerifier {
    http: reqwest::Client,
    lookup_url: String,
    api_key: String,
}

impl IdentityPlatformVerifier {
    pub fn new(lookup_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            lookup_url: lookup_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for IdentityPlatformVerifier {
    async fn verify(&self, token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(&self.lookup_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| {
                error!("Identity lookup request failed: {}", e);
                AuthError::Request(e)
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!("Identity lookup returned status {}: {}", status, body);
            return Err(AuthError::Rejected(status.as_u16()));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        if lookup.users.is_empty() {
            return Err(AuthError::UnknownUser);
        }

        debug!("Identity lookup confirmed {} account(s)", lookup.users.len());
        Ok(())
    }
}
