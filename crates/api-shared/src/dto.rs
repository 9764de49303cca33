//! Wire types shared by the API surfaces.
//!
//! Field names are camelCase on the wire, matching the stored document format.

use serde::{Deserialize, Serialize};

/// One field-scoped validation message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FieldErrorRes {
    /// Field path, e.g. `firstName`, `addresses.0.zip` or `customFieldValues.<id>`.
    pub field: String,
    pub message: String,
}

/// Error body returned by every failing request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRes {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldErrorRes>,
    /// Set when the client should navigate elsewhere, e.g. `/login`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Confirmation prompt to show before retrying with `confirm=true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
}

impl ErrorRes {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_field_errors(mut self, field_errors: Vec<FieldErrorRes>) -> Self {
        self.field_errors = field_errors;
        self
    }

    pub fn with_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.redirect = Some(redirect.into());
        self
    }

    pub fn with_confirm(mut self, prompt: impl Into<String>) -> Self {
        self.confirm = Some(prompt.into());
        self
    }
}

/// Login or register form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsReq {
    pub email: String,
    pub password: String,
    /// Required on register only.
    #[serde(default)]
    pub confirm_password: Option<String>,
}

/// A signed-in session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRes {
    pub uid: String,
    pub email: String,
    /// Bearer token for subsequent requests.
    pub id_token: String,
    /// RFC 3339 expiry instant.
    pub expires_at: String,
    pub message: String,
}

/// Paging parameters of the patient list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Zero-based page index.
    pub page: Option<usize>,
    /// One of 10, 25, 50, 100.
    pub page_size: Option<usize>,
}

/// Delete confirmation flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConfirmQuery {
    /// Must be `true` for the delete to go ahead.
    #[serde(default)]
    pub confirm: bool,
}
