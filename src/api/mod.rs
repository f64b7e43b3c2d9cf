//! HTTP surface: documented routes, middleware stack and the server loop.

pub mod handlers;
pub mod openapi;

use crate::{auth::AuthService, records::Records, store::ResilientStore};
use anyhow::Result;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderName, HeaderValue, Request},
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

/// Everything the handlers pull out of request extensions.
#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub records: Arc<Records>,
    pub store: ResilientStore,
    pub request_timeout: Duration,
}

/// Assemble the application router with its middleware.
#[must_use]
pub fn app(state: AppState) -> Router {
    let (router, openapi) = openapi::api_router().split_for_parts();

    router
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(TimeoutLayer::new(state.request_timeout))
                .layer(Extension(state.auth))
                .layer(Extension(state.records))
                .layer(Extension(state.store)),
        )
}

/// Bind `[::]:port` and serve until ctrl-c.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(port: u16, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = request.uri().path(),
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{AuditRecorder, AuthConfig, TokenService},
        clock::{ManualClock, SharedClock},
        store::{MemoryStore, PartitionPath, StoreOptions},
    };
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn state() -> AppState {
        let clock: SharedClock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let store = ResilientStore::new(
            Arc::new(MemoryStore::new()),
            StoreOptions::new().with_retry_delay(Duration::from_millis(1)),
        );
        let audit = Arc::new(AuditRecorder::new(store.clone(), clock.clone()));
        let config = AuthConfig::new().with_bcrypt_cost(4);
        let auth = AuthService::new(
            &config,
            store.clone(),
            TokenService::ephemeral(clock.clone()),
            audit.clone(),
            clock.clone(),
        );
        AppState {
            auth: Arc::new(auth),
            records: Arc::new(Records::new(
                store.clone(),
                audit,
                clock,
                PartitionPath::Field("student_id".to_string()),
            )),
            store,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn health_echoes_request_id() -> anyhow::Result<()> {
        let response = app(state())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "req-1")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("req-1")
        );
        Ok(())
    }

    #[tokio::test]
    async fn me_without_token_is_unauthorized() -> anyhow::Result<()> {
        let response = app(state())
            .oneshot(Request::builder().uri("/auth/me").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_then_login_over_http() -> anyhow::Result<()> {
        let app = app(state());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/init-admin")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"username":"root","password":"Passw0rd!","email":"root@example.edu","display_name":"Root Admin","role":"admin","campus":"llano-largo"}"#,
                    ))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"username":"root","password":"Passw0rd!","campus":"llano-largo"}"#,
                    ))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    async fn error_kind(response: axum::response::Response) -> anyhow::Result<String> {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await?;
        let body: crate::auth::error::ErrorBody = serde_json::from_slice(&bytes)?;
        Ok(body.error)
    }

    #[tokio::test]
    async fn malformed_json_gets_the_error_envelope() -> anyhow::Result<()> {
        let app = app(state());
        for body in ["{not json", r#"{"username":"root"}"#] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/auth/login")
                        .header("content-type", "application/json")
                        .body(Body::from(body))?,
                )
                .await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(error_kind(response).await?, "validation_failed");
        }
        Ok(())
    }
}
