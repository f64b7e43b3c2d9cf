use axum::{
    extract::{Extension, Path, Query},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use super::{bearer_token, extract_client_ip, json_body};
use crate::auth::{
    error::ErrorBody, AuthError, AuthService, Campus, PrincipalUpdate, PrincipalView,
    Requirement, Role,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilter {
    /// Only principals of this campus.
    pub campus: Option<Campus>,
    /// Only principals with this role.
    pub role: Option<Role>,
}

#[utoipa::path(
    get,
    path = "/auth/users",
    params(UserFilter),
    responses(
        (status = 200, description = "Matching principals", body = [PrincipalView]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<PrincipalView>>, AuthError> {
    let acting = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let users = auth.list_users(&acting, filter.campus, filter.role).await?;
    Ok(Json(users))
}

#[utoipa::path(
    patch,
    path = "/auth/users/{id}",
    params(("id" = String, Path, description = "Principal id, e.g. user:ana@taxco")),
    request_body = PrincipalUpdate,
    responses(
        (status = 200, description = "Updated principal", body = PrincipalView),
        (status = 400, description = "Empty or invalid update", body = ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody),
        (status = 404, description = "Unknown principal", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Path(id): Path<String>,
    payload: Option<Json<PrincipalUpdate>>,
) -> Result<Json<PrincipalView>, AuthError> {
    let acting = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let update = json_body(payload)?;
    let view = auth
        .update_user(&acting, &id, update, extract_client_ip(&headers))
        .await?;
    Ok(Json(view))
}
