//! Bearer-token handling: claim extraction (no signature check; the identity provider
//! vouches for the token) and the identity verification client.

pub mod identity;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

pub use identity::{IdentityPlatformVerifier, IdentityVerifier};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Authorization header must use Bearer token format")]
    MalformedHeader,

    #[error("Identity verification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity provider rejected the token with status {0}")]
    Rejected(u16),

    #[error("Identity provider response is malformed: {0}")]
    MalformedResponse(String),

    #[error("Token does not belong to any user")]
    UnknownUser,

    #[error("Token carries no user id")]
    MissingUserId,

    #[error("Token audience does not match")]
    AudienceMismatch,
}

/// Decodes the payload segment of a JWT. `None` for anything that is not three
/// dot-separated segments with a base64url JSON object in the middle.
fn decode_payload(token: &str) -> Option<Map<String, Value>> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return None;
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(claims) => Some(claims),
        _ => None,
    }
}

fn string_claim(claims: &Map<String, Value>, key: &str) -> Option<String> {
    claims.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `user_id`, else `sub`, else empty.
pub fn user_id_from_token(token: &str) -> String {
    decode_payload(token)
        .and_then(|claims| string_claim(&claims, "user_id").or_else(|| string_claim(&claims, "sub")))
        .unwrap_or_default()
}

pub fn email_from_token(token: &str) -> String {
    decode_payload(token)
        .and_then(|claims| string_claim(&claims, "email"))
        .unwrap_or_default()
}

/// The `aud` claim; for a list audience, its first entry.
pub fn audience_from_token(token: &str) -> Option<String> {
    let claims = decode_payload(token)?;
    match claims.get("aud")? {
        Value::String(aud) => Some(aud.clone()),
        Value::Array(auds) => auds.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    match header.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
