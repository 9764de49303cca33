//! Mapping from core errors to HTTP responses.

use api_shared::{ErrorRes, FieldErrorRes};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use prm_core::{AuthError, RecordError};

/// Path clients are sent to when they need to sign in.
pub const LOGIN_REDIRECT: &str = "/login";

/// A failed request: a status plus the JSON body to send.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorRes,
}

impl ApiError {
    pub fn new(status: StatusCode, body: ErrorRes) -> Self {
        Self { status, body }
    }

    /// 401 sending the client back to the login page.
    pub fn login_required(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ErrorRes::new(message).with_redirect(LOGIN_REDIRECT),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorRes::new(message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        let message = err.user_message();
        match err {
            RecordError::Validation(errors) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorRes::new(message).with_field_errors(
                    errors
                        .into_iter()
                        .map(|e| FieldErrorRes {
                            field: e.field,
                            message: e.message,
                        })
                        .collect(),
                ),
            ),
            RecordError::NotFound { .. } => Self::not_found(message),
            RecordError::StoreUnavailable(detail) => {
                tracing::error!("store unavailable: {}", detail);
                Self::new(StatusCode::SERVICE_UNAVAILABLE, ErrorRes::new(message))
            }
            RecordError::DeleteFailed { ref source, .. } => {
                tracing::error!("delete failed: {}", source);
                Self::new(StatusCode::BAD_GATEWAY, ErrorRes::new(message))
            }
            RecordError::CorruptDocument { ref reason, .. } => {
                tracing::error!("corrupt document: {}", reason);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorRes::new(message))
            }
            RecordError::Auth(e) => e.into(),
            RecordError::Cancelled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, ErrorRes::new(message))
            }
            RecordError::SubmissionInFlight(_) => {
                Self::new(StatusCode::CONFLICT, ErrorRes::new(message))
            }
            RecordError::ConfirmationRequired { prompt, .. } => Self::new(
                StatusCode::CONFLICT,
                ErrorRes::new(message).with_confirm(prompt),
            ),
            RecordError::InvalidInput(_) => {
                Self::new(StatusCode::BAD_REQUEST, ErrorRes::new(message))
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.user_message();
        if err.requires_login() {
            return Self::login_required(message);
        }
        match err {
            AuthError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, ErrorRes::new(message))
            }
            AuthError::EmailInUse => Self::new(StatusCode::CONFLICT, ErrorRes::new(message)),
            AuthError::WeakPassword | AuthError::PasswordMismatch | AuthError::InvalidEmail(_) => {
                Self::new(StatusCode::BAD_REQUEST, ErrorRes::new(message))
            }
            AuthError::Unavailable(detail) => {
                tracing::error!("auth provider unavailable: {}", detail);
                Self::new(StatusCode::SERVICE_UNAVAILABLE, ErrorRes::new(message))
            }
            other => {
                tracing::error!("auth provider error: {}", other);
                Self::new(StatusCode::BAD_GATEWAY, ErrorRes::new(message))
            }
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use prm_core::store::StoreError;
    use prm_core::{Collection, FieldError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                RecordError::Validation(vec![FieldError::new("dob", "Date of Birth is required")]),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                RecordError::NotFound {
                    collection: Collection::Patients,
                    id: "x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                RecordError::StoreUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RecordError::DeleteFailed {
                    collection: Collection::Patients,
                    id: "x".into(),
                    source: StoreError::Unavailable("503".into()),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                RecordError::SubmissionInFlight("create-patient:u1".into()),
                StatusCode::CONFLICT,
            ),
            (
                RecordError::Auth(AuthError::NotAuthenticated),
                StatusCode::UNAUTHORIZED,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_validation_carries_field_errors() {
        let err = ApiError::from(RecordError::Validation(vec![FieldError::new(
            "addresses.0.zip",
            "Invalid Zip Code",
        )]));
        assert_eq!(err.body.field_errors.len(), 1);
        assert_eq!(err.body.field_errors[0].field, "addresses.0.zip");
    }

    #[test]
    fn test_expired_session_redirects_to_login() {
        let err = ApiError::from(AuthError::SessionExpired);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.body.redirect.as_deref(), Some(LOGIN_REDIRECT));

        let err = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(err.body.redirect, None);
        assert_eq!(err.body.message, "Invalid email or password.");
    }
}
