//! Session endpoints: login, bootstrap, registration, introspection, logout
//! and password change.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{bearer_token, extract_client_ip, json_body};
use crate::auth::{
    error::ErrorBody, AuthError, AuthService, LoginRequest, LoginResponse, NewPrincipal,
    PrincipalView, Requirement,
};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token issued", body = LoginResponse),
        (status = 400, description = "Missing or malformed body", body = ErrorBody),
        (status = 401, description = "Unknown user or wrong password", body = ErrorBody),
        (status = 403, description = "Account locked or disabled", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, AuthError> {
    let request = json_body(payload)?;
    let response = auth.login(request, extract_client_ip(&headers)).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/auth/init-admin",
    request_body = NewPrincipal,
    responses(
        (status = 201, description = "First administrator created", body = PrincipalView),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 403, description = "An administrator already exists", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn init_admin(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<NewPrincipal>>,
) -> Result<impl IntoResponse, AuthError> {
    let new = json_body(payload)?;
    let view = auth
        .bootstrap_admin(new, extract_client_ip(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = NewPrincipal,
    responses(
        (status = 201, description = "Principal created", body = PrincipalView),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = ErrorBody),
        (status = 409, description = "Username already taken on this campus", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<NewPrincipal>>,
) -> Result<impl IntoResponse, AuthError> {
    let acting = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let new = json_body(payload)?;
    let view = auth
        .register(&acting, new, extract_client_ip(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Principal behind the session", body = PrincipalView),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
) -> Result<Json<PrincipalView>, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    Ok(Json(auth.me(&claims).await?))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logout recorded; the token stays valid until it expires"),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
) -> Result<StatusCode, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    auth.logout(&claims, extract_client_ip(&headers)).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

#[utoipa::path(
    post,
    path = "/auth/password",
    request_body = PasswordChange,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "New password too weak", body = ErrorBody),
        (status = 401, description = "Current password or token invalid", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    payload: Option<Json<PasswordChange>>,
) -> Result<StatusCode, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let change = json_body(payload)?;
    auth.change_password(
        &claims,
        change.current_password,
        change.new_password,
        extract_client_ip(&headers),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
