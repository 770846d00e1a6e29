#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use iot_message_api::app::{router, AppState};
use iot_message_api::auth::{user_id_from_token, IdentityPlatformVerifier};
use iot_message_api::database::memory::MemoryMessageStore;
use iot_message_api::services::{HttpAccessResolver, MessageService};

pub const API_KEY: &str = "test-api-key";
pub const MAX_LIMIT: u64 = 100;

/// Tokens whose user the fake identity provider does not know
pub const REVOKED_USER: &str = "revoked";
/// User for whom the fake access service answers 500
pub const BROKEN_USER: &str = "broken";

/// Unsigned JWT-shaped token carrying the given claims
pub fn token_with(claims: Value) -> String {
    format!(
        "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub fn token_for(user_id: &str) -> String {
    token_with(json!({ "user_id": user_id, "email": format!("{}@example.com", user_id) }))
}

/// Device ownership served by the fake access service
pub fn device_owners() -> HashMap<&'static str, Vec<&'static str>> {
    HashMap::from([
        ("alice", vec!["dev-1", "dev-2"]),
        ("bob", vec![]),
        ("carol", vec!["dev-3"]),
    ])
}

/// Binds an axum router on a free local port and serves it in the background.
pub async fn serve(app: Router) -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://127.0.0.1:{}", port))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Identity Platform stand-in: `POST /v1/accounts:lookup?key=...`
pub fn fake_identity() -> Router {
    async fn lookup(Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>) -> impl IntoResponse {
        if query.get("key").map(String::as_str) != Some(API_KEY) {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": {"message": "API key not valid"}})));
        }
        let token = body["idToken"].as_str().unwrap_or_default();
        match user_id_from_token(token).as_str() {
            "" => (StatusCode::BAD_REQUEST, Json(json!({"error": {"message": "INVALID_ID_TOKEN"}}))),
            REVOKED_USER => (StatusCode::OK, Json(json!({"kind": "identitytoolkit#GetAccountInfoResponse"}))),
            user => (StatusCode::OK, Json(json!({"users": [{"localId": user}]}))),
        }
    }

    Router::new().route("/v1/accounts:lookup", post(lookup))
}

/// MQTT service stand-in: `GET /api/mqtt/users`
pub fn fake_access() -> Router {
    async fn users(headers: HeaderMap) -> impl IntoResponse {
        let Some(token) = bearer(&headers) else {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "missing token"})));
        };
        let user = user_id_from_token(&token);
        if user == BROKEN_USER {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "boom"})));
        }
        let client_ids = device_owners().get(user.as_str()).cloned().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!([{ "username": format!("mqtt-{}", user), "client_ids": client_ids, "project_id": "p1" }])),
        )
    }

    Router::new().route("/api/mqtt/users", get(users))
}

pub struct TestServer {
    pub base_url: String,
    pub store: Arc<MemoryMessageStore>,
    pub client: reqwest::Client,
}

impl TestServer {
    /// The API wired to an in-memory store and the fake upstreams, with real HTTP clients.
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with_audience(None).await
    }

    pub async fn spawn_with_audience(audience: Option<&str>) -> Result<Self> {
        let identity_url = serve(fake_identity()).await?;
        let access_url = serve(fake_access()).await?;
        let timeout = Duration::from_secs(5);

        let store = Arc::new(MemoryMessageStore::default());
        let verifier = IdentityPlatformVerifier::new(format!("{}/v1/accounts:lookup", identity_url), API_KEY, timeout)?;
        let access = HttpAccessResolver::new(&access_url, timeout)?;

        let state = AppState {
            service: Arc::new(MessageService::new(store.clone(), Arc::new(access), MAX_LIMIT)),
            verifier: Arc::new(verifier),
            audience: audience.map(str::to_string),
        };
        let base_url = serve(router(state, &["*".to_string()])).await?;

        Ok(Self {
            base_url,
            store,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_as(&self, user: &str, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).bearer_auth(token_for(user)).send().await?)
    }

    pub async fn get_query_as(&self, user: &str, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.url(path))
            .query(query)
            .bearer_auth(token_for(user))
            .send()
            .await?)
    }
}

pub fn content_range(res: &reqwest::Response) -> String {
    res.headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
