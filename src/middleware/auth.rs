use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::app::AppState;
use crate::auth::{audience_from_token, bearer_token, email_from_token, user_id_from_token, AuthError};
use crate::error::ApiError;

/// Identity of the caller, built once per request by [`identity_middleware`]
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub user_id: String,
    pub email: String,
    /// The caller's bearer token, forwarded to the access service
    pub token: String,
}

/// Verifies the bearer token with the identity provider and injects a [`RequestContext`].
pub async fn identity_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&headers)?;

    state.verifier.verify(&token).await.map_err(|e| {
        warn!("Identity verification failed: {}", e);
        ApiError::from(e)
    })?;

    let ctx = build_context(&token, state.audience.as_deref())?;
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

fn extract_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let header = match headers.get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::MalformedHeader)?),
        None => None,
    };
    bearer_token(header).map(str::to_string)
}

fn build_context(token: &str, audience: Option<&str>) -> Result<RequestContext, AuthError> {
    let user_id = user_id_from_token(token);
    if user_id.is_empty() {
        return Err(AuthError::MissingUserId);
    }
    if let Some(expected) = audience {
        if audience_from_token(token).as_deref() != Some(expected) {
            return Err(AuthError::AudienceMismatch);
        }
    }
    Ok(RequestContext {
        user_id,
        email: email_from_token(token),
        token: token.to_string(),
    })
}
