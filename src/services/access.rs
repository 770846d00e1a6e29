use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::database::ClientScope;
use crate::middleware::RequestContext;

const ACCESS_USER_AGENT: &str = concat!("iot-message-api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("No bearer token to forward to the access service")]
    MissingToken,

    #[error("Could not build access request: {0}")]
    Request(String),

    #[error("Access service unreachable: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("Access service returned status {status}")]
    Status { status: u16, body: String },

    #[error("Access service response is malformed: {0}")]
    Decode(String),
}

/// One MQTT user of a project and the device client ids it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGrant {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub project_id: String,
}

/// Resolves which devices the caller may read. Fetched fresh on every request.
#[async_trait]
pub trait AccessResolver: Send + Sync {
    async fn resolve(&self, ctx: &RequestContext) -> Result<Vec<AccessGrant>, AccessError>;
}

/// Client ids flattened from all grants of a caller, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermittedSet(Vec<String>);

impl PermittedSet {
    pub fn from_grants(grants: &[AccessGrant]) -> Self {
        let mut ids: Vec<String> = grants
            .iter()
            .flat_map(|g| g.client_ids.iter())
            .filter(|id| !id.is_empty())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        Self(ids)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.0.binary_search_by(|id| id.as_str().cmp(client_id)).is_ok()
    }

    pub fn client_ids(&self) -> &[String] {
        &self.0
    }

    pub fn scope(&self) -> ClientScope<'_> {
        ClientScope(&self.0)
    }
}

/// Client of the MQTT service's `GET /api/mqtt/users`
pub struct HttpAccessResolver {
    http: reqwest::Client,
    users_url: String,
}

impl HttpAccessResolver {
    pub fn new(mqtt_service_url: &str, timeout: Duration) -> Result<Self, AccessError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccessError::Request(e.to_string()))?;
        let base = url::Url::parse(mqtt_service_url)
            .map_err(|e| AccessError::Request(format!("invalid access service URL {}: {}", mqtt_service_url, e)))?;
        Ok(Self {
            http,
            users_url: format!("{}/api/mqtt/users", base.as_str().trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AccessResolver for HttpAccessResolver {
    async fn resolve(&self, ctx: &RequestContext) -> Result<Vec<AccessGrant>, AccessError> {
        if ctx.token.is_empty() {
            return Err(AccessError::MissingToken);
        }

        let request = self
            .http
            .get(&self.users_url)
            .bearer_auth(&ctx.token)
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, ACCESS_USER_AGENT)
            .build()
            .map_err(|e| AccessError::Request(e.to_string()))?;

        let response = self.http.execute(request).await.map_err(|e| {
            error!("Access service request failed: {}", e);
            AccessError::Connect(e)
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!("Access service returned status {}: {}", status, body);
            return Err(AccessError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let grants: Vec<AccessGrant> = response.json().await.map_err(|e| AccessError::Decode(e.to_string()))?;
        debug!("Resolved {} access grant(s) for user {}", grants.len(), ctx.user_id);
        Ok(grants)
    }
}
