//! # API REST
//!
//! REST API implementation for PRM.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, bearer-token sessions)
//!
//! Every route except health, login, register and the API docs requires an
//! `Authorization: Bearer <idToken>` header. Unknown paths answer 404, but only once the
//! caller is authenticated.
//!
//! Uses `api-shared` for common types and utilities.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod custom_fields;
pub mod error;
pub mod patients;

use api_shared::{ErrorRes, FieldErrorRes, HealthRes, HealthService, SessionRes};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use prm_core::session::resolve_bearer;
use prm_core::AppServices;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::{ApiError, ApiResult};

/// Application state shared across REST API handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub services: AppServices,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        auth::register,
        auth::login,
        auth::logout,
        patients::list_patients,
        patients::create_patient,
        patients::get_patient,
        patients::edit_patient,
        patients::update_patient,
        patients::delete_patient,
        custom_fields::list_fields,
        custom_fields::create_field,
        custom_fields::update_field,
        custom_fields::delete_field,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        FieldErrorRes,
        SessionRes,
        api_shared::CredentialsReq,
        patients::SavedPatientRes,
        custom_fields::SavedFieldRes,
        prm_core::Patient,
        prm_core::PatientRecord,
        prm_core::PatientDraft,
        prm_core::PatientStatus,
        prm_core::Address,
        prm_core::CustomFieldDefinition,
        prm_core::CustomFieldInput,
        prm_core::FieldType,
        prm_core::views::Notice,
        prm_core::views::NoticeKind,
        prm_core::views::PatientTable,
        prm_core::views::Column,
        prm_core::views::PatientRow,
        prm_core::views::PatientDetailView,
        prm_core::views::AddressLines,
        prm_core::views::LabelledValue,
        prm_core::views::EditForm,
        prm_core::views::CustomFieldTable,
        prm_core::views::CustomFieldRow,
    ))
)]
pub struct ApiDoc;

/// Paths reachable without a session.
const PUBLIC_PATHS: &[&str] = &["/health", "/auth/login", "/auth/register"];
const DOC_PREFIXES: &[&str] = &["/swagger-ui", "/api-docs"];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || DOC_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Builds the REST router over `services`.
pub fn router(services: AppServices) -> Router {
    let state = AppState { services };

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route(
            "/patients/:id",
            get(patients::get_patient)
                .put(patients::update_patient)
                .delete(patients::delete_patient),
        )
        .route("/patients/:id/edit", get(patients::edit_patient))
        .route(
            "/custom-fields",
            get(custom_fields::list_fields).post(custom_fields::create_field),
        )
        .route(
            "/custom-fields/:id",
            put(custom_fields::update_field).delete(custom_fields::delete_field),
        )
        .fallback(not_found)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(state.clone(), require_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the REST server on `addr` until Ctrl-C.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails while running.
pub async fn run(addr: &str, services: AppServices) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("++ Starting PRM REST on {}", addr);
    axum::serve(listener, router(services))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("-- PRM REST stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Authenticates every non-public request from its bearer token.
///
/// Only [`PUBLIC_PATHS`] and the API docs skip the check; view paths such as `/login` are not
/// REST routes and are protected like any other unknown path. On success the caller's [`prm_core::AuthUser`] is stored in the request extensions.
async fn require_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if is_public_path(&path) {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(api_shared::auth::bearer_token)
        .map(str::to_owned);
    let session = resolve_bearer(state.services.auth.as_ref(), token.as_deref()).await;

    match session.user() {
        Some(user) => {
            req.extensions_mut().insert(user.clone());
            next.run(req).await
        }
        None => {
            tracing::debug!("unauthenticated request to {}", path);
            ApiError::from(prm_core::AuthError::NotAuthenticated).into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Returns the current health status of the PRM REST API service.
/// This endpoint is used for monitoring and load balancer health checks.
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

/// Not-found view for unknown paths.
async fn not_found() -> ApiError {
    ApiError::not_found("Page not found.")
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use prm_core::CoreConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    pub fn app() -> Router {
        let services =
            AppServices::build(CoreConfig::in_memory()).expect("build services should succeed");
        router(services)
    }

    /// Sends one request and returns the status and JSON body (`Null` when empty).
    pub async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Registers a fresh account and returns its bearer token.
    pub async fn register(app: &Router) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(serde_json::json!({
                "email": "clerk@clinic.test",
                "password": "secret1",
                "confirmPassword": "secret1",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["idToken"]
            .as_str()
            .expect("register should return a token")
            .to_string()
    }
}
