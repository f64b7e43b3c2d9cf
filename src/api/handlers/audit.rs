use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use super::bearer_token;
use crate::auth::{
    error::ErrorBody, AuditAction, AuditFilter, AuditRecord, AuthError, AuthService, Requirement,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Exact `username@campus` of the actor.
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    /// Defaults to 100, capped at 1000.
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/auth/audit-logs",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit records, newest first", body = [AuditRecord]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn audit_logs(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, AuthError> {
    let acting = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let filter = AuditFilter {
        actor: query.actor,
        action: query.action,
        limit: query.limit,
    };
    Ok(Json(auth.audit_logs(&acting, &filter).await?))
}
