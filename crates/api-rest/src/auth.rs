//! Login, register and logout endpoints.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use api_shared::{CredentialsReq, ErrorRes, SessionRes};
use axum::{extract::State, http::StatusCode, response::Json, Extension};
use prm_core::views::Notice;
use prm_core::{AuthUser, Credentials};

fn session_res(user: &AuthUser, notice: Notice) -> SessionRes {
    SessionRes {
        uid: user.uid.clone(),
        email: user.email.as_str().to_string(),
        id_token: user.id_token().to_string(),
        expires_at: user.expires_at.to_rfc3339(),
        message: notice.message,
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = CredentialsReq,
    responses(
        (status = 201, description = "Account created and signed in", body = SessionRes),
        (status = 400, description = "Invalid email, weak password or mismatched confirmation", body = ErrorRes),
        (status = 409, description = "Email already in use", body = ErrorRes),
        (status = 503, description = "Auth provider unavailable", body = ErrorRes)
    )
)]
/// Create an account and sign it in
///
/// `confirmPassword` must equal `password`.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsReq>,
) -> ApiResult<(StatusCode, Json<SessionRes>)> {
    let credentials = Credentials::new(&req.email, req.password)?;
    credentials.check_confirmation(req.confirm_password.as_deref().unwrap_or_default())?;
    let user = state.services.auth.sign_up(&credentials).await?;
    tracing::info!("registered {}", user.uid);
    Ok((
        StatusCode::CREATED,
        Json(session_res(&user, Notice::registered())),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsReq,
    responses(
        (status = 200, description = "Signed in", body = SessionRes),
        (status = 401, description = "Invalid email or password", body = ErrorRes),
        (status = 503, description = "Auth provider unavailable", body = ErrorRes)
    )
)]
/// Sign in with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsReq>,
) -> ApiResult<Json<SessionRes>> {
    // A malformed email can never match an account.
    let credentials = Credentials::new(&req.email, req.password)
        .map_err(|_| ApiError::from(prm_core::AuthError::InvalidCredentials))?;
    let user = state.services.auth.sign_in(&credentials).await?;
    tracing::info!("signed in {}", user.uid);
    Ok(Json(session_res(&user, Notice::logged_in())))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Signed out", body = Notice),
        (status = 401, description = "Not signed in", body = ErrorRes)
    )
)]
/// End the caller's session
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Notice>> {
    state.services.auth.sign_out(&user).await?;
    tracing::info!("signed out {}", user.uid);
    Ok(Json(Notice::logged_out()))
}
