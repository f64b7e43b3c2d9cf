//! Public error taxonomy of the identity core and its HTTP mapping.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password; deliberately indistinguishable.
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account locked until {}", until.to_rfc3339())]
    AccountLocked { until: DateTime<Utc> },
    #[error("account disabled")]
    AccountDisabled,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("already exists")]
    AlreadyExists,
    #[error("not found")]
    NotFound,
    #[error("store unavailable")]
    StoreUnavailable,
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountLocked { .. } => "account_locked",
            Self::AccountDisabled => "account_disabled",
            Self::InvalidToken => "invalid_token",
            Self::Expired => "token_expired",
            Self::Forbidden(_) => "forbidden",
            Self::AlreadyExists => "already_exists",
            Self::NotFound => "not_found",
            Self::StoreUnavailable => "store_unavailable",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::InvalidToken | Self::Expired => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccountLocked { .. } | Self::AccountDisabled | Self::Forbidden(_) => {
                StatusCode::FORBIDDEN
            }
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Store failure of an insert-only write, where a conflict means the key
    /// is taken.
    #[must_use]
    pub fn on_create(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::AlreadyExists,
            other => other.into(),
        }
    }

    // Internal detail stays in the logs.
    fn public_detail(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Store failures that are not a typed absence are logged and normalized.
/// A conflict outside [`AuthError::on_create`] is an unresolved write.
impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            other => {
                error!(status = other.status(), "store failure: {other}");
                Self::StoreUnavailable
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut headers = HeaderMap::new();

        match &self {
            Self::InvalidCredentials | Self::InvalidToken | Self::Expired => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            Self::AccountLocked { until } => {
                let seconds = (*until - Utc::now()).num_seconds().max(1);
                if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                    headers.insert(header::RETRY_AFTER, value);
                }
            }
            Self::Internal(detail) => error!("internal error: {detail}"),
            _ => {}
        }

        let body = ErrorBody {
            error: self.kind().to_string(),
            detail: self.public_detail(),
        };
        (status, headers, Json(body)).into_response()
    }
}
