//! HTTP handlers and the request helpers they share.

pub mod audit;
pub mod auth;
pub mod health;
pub mod records;
pub mod users;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};

use crate::auth::AuthError;

/// Token from an `Authorization: Bearer <token>` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::InvalidToken)?
        .trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or(AuthError::InvalidToken)?
        .trim();
    if token.is_empty() {
        Err(AuthError::InvalidToken)
    } else {
        Ok(token)
    }
}

/// Body of a JSON request; a missing, malformed or mistyped payload is a
/// validation failure like any other.
pub(crate) fn json_body<T>(payload: Option<Json<T>>) -> Result<T, AuthError> {
    match payload {
        Some(Json(body)) => Ok(body),
        None => Err(AuthError::ValidationFailed(
            "missing or malformed JSON body".to_string(),
        )),
    }
}

/// Client address from `x-forwarded-for` (first hop) or `x-real-ip`.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
