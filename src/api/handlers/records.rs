//! Appointment and health-card endpoints.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::{bearer_token, extract_client_ip, json_body};
use crate::auth::{error::ErrorBody, AuthError, AuthService, Requirement};
use crate::records::{Appointment, HealthCard, HealthCardInput, NewAppointment, Records};

#[utoipa::path(
    post,
    path = "/appointments",
    request_body = NewAppointment,
    responses(
        (status = 201, description = "Appointment booked", body = Appointment),
        (status = 403, description = "Missing appointments:create", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "records"
)]
pub async fn create_appointment(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(records): Extension<Arc<Records>>,
    payload: Option<Json<NewAppointment>>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let new = json_body(payload)?;
    let appointment = records
        .appointments
        .create(&claims, new, extract_client_ip(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[utoipa::path(
    get,
    path = "/appointments/student/{student_id}",
    params(("student_id" = String, Path, description = "Student identifier")),
    responses(
        (status = 200, description = "Appointments of the student", body = [Appointment]),
        (status = 403, description = "Missing appointments:read", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "records"
)]
pub async fn student_appointments(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(records): Extension<Arc<Records>>,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<Appointment>>, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let found = records
        .appointments
        .for_student(&claims, &student_id)
        .await?;
    Ok(Json(found))
}

#[utoipa::path(
    post,
    path = "/health-cards",
    request_body = HealthCardInput,
    responses(
        (status = 201, description = "Health card created", body = HealthCard),
        (status = 403, description = "Missing health_cards:create", body = ErrorBody),
        (status = 409, description = "The student already has a card", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "records"
)]
pub async fn create_health_card(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(records): Extension<Arc<Records>>,
    payload: Option<Json<HealthCardInput>>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let input = json_body(payload)?;
    let card = records
        .health_cards
        .create(&claims, input, extract_client_ip(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(card)))
}

#[utoipa::path(
    put,
    path = "/health-cards/{id}",
    params(("id" = String, Path, description = "Health card id")),
    request_body = HealthCardInput,
    responses(
        (status = 200, description = "Health card updated", body = HealthCard),
        (status = 403, description = "Missing health_cards:update", body = ErrorBody),
        (status = 404, description = "Unknown health card", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "records"
)]
pub async fn update_health_card(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(records): Extension<Arc<Records>>,
    Path(id): Path<String>,
    payload: Option<Json<HealthCardInput>>,
) -> Result<Json<HealthCard>, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let input = json_body(payload)?;
    let card = records
        .health_cards
        .update(&claims, &id, input, extract_client_ip(&headers))
        .await?;
    Ok(Json(card))
}

#[utoipa::path(
    get,
    path = "/health-cards/{id}",
    params(("id" = String, Path, description = "Health card id")),
    responses(
        (status = 200, description = "Health card", body = HealthCard),
        (status = 403, description = "Missing health_cards:read", body = ErrorBody),
        (status = 404, description = "Unknown health card", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "records"
)]
pub async fn get_health_card(
    headers: HeaderMap,
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(records): Extension<Arc<Records>>,
    Path(id): Path<String>,
) -> Result<Json<HealthCard>, AuthError> {
    let claims = auth.authorize(bearer_token(&headers)?, Requirement::Authenticated)?;
    let card = records
        .health_cards
        .get(&claims, &id, extract_client_ip(&headers))
        .await?;
    Ok(Json(card))
}
