use std::sync::Arc;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::IdentityVerifier;
use crate::handlers::{protected, public};
use crate::middleware::identity_middleware;
use crate::services::MessageService;

/// Shared, read-only state of every request
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MessageService>,
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Expected token audience, when enforced
    pub audience: Option<String>,
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Public
        .route("/health", get(public::health))
        // Protected API
        .merge(message_routes(state.clone()))
        // Global middleware
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn message_routes(state: AppState) -> Router<AppState> {
    use protected::message;

    Router::new()
        .route("/api/message", get(message::collection_get))
        .route("/api/message/topic", get(message::topic_get))
        .route("/api/message/window", get(message::window_get))
        .route("/api/message/device/:device_id", get(message::device_get))
        .route("/api/message/device/:device_id/latest", get(message::device_latest_get))
        .route("/api/message/aggregations/device/:device_id", get(message::aggregations_get))
        .route("/api/message/:id", get(message::record_get))
        .route_layer(middleware::from_fn_with_state(state, identity_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([CONTENT_RANGE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}
