//! Custom field management endpoints.

use crate::error::ApiResult;
use crate::AppState;
use api_shared::{ConfirmQuery, ErrorRes};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use prm_core::views::{custom_field_table, CustomFieldTable, Notice};
use prm_core::{AuthUser, CallScope, CustomFieldDefinition, CustomFieldInput};
use serde::Serialize;

/// A saved definition and the success message to show.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SavedFieldRes {
    pub message: String,
    pub field: CustomFieldDefinition,
}

#[utoipa::path(
    get,
    path = "/custom-fields",
    responses(
        (status = 200, description = "Custom field management table", body = CustomFieldTable),
        (status = 401, description = "Not signed in", body = ErrorRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
/// List custom field definitions, sorted by label
pub async fn list_fields(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CustomFieldTable>> {
    let scope = CallScope::for_user(&user);
    let defs = state.services.registry.list_sorted(&scope).await?;
    Ok(Json(custom_field_table(&defs)))
}

#[utoipa::path(
    post,
    path = "/custom-fields",
    request_body = CustomFieldInput,
    responses(
        (status = 201, description = "Definition created", body = SavedFieldRes),
        (status = 422, description = "Missing label or unknown type", body = ErrorRes)
    )
)]
/// Define a new custom field
///
/// `fieldType` is one of `string`, `number`, `date`, `boolean`.
pub async fn create_field(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<CustomFieldInput>,
) -> ApiResult<(StatusCode, Json<SavedFieldRes>)> {
    let scope = CallScope::for_user(&user);
    let field = state.services.registry.create(&scope, &input).await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedFieldRes {
            message: Notice::field_saved().message,
            field,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/custom-fields/{id}",
    params(("id" = String, Path, description = "Custom field id")),
    request_body = CustomFieldInput,
    responses(
        (status = 200, description = "Definition updated", body = SavedFieldRes),
        (status = 404, description = "Custom field not found", body = ErrorRes),
        (status = 422, description = "Missing label or unknown type", body = ErrorRes)
    )
)]
/// Change a definition's label, type or required flag
///
/// Values already stored on patients are not converted.
pub async fn update_field(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(input): Json<CustomFieldInput>,
) -> ApiResult<Json<SavedFieldRes>> {
    let scope = CallScope::for_user(&user);
    let field = state.services.registry.update(&scope, &id, &input).await?;
    Ok(Json(SavedFieldRes {
        message: Notice::field_saved().message,
        field,
    }))
}

#[utoipa::path(
    delete,
    path = "/custom-fields/{id}",
    params(("id" = String, Path, description = "Custom field id"), ConfirmQuery),
    responses(
        (status = 200, description = "Definition deleted", body = Notice),
        (status = 409, description = "Confirmation required; `confirm` carries the prompt", body = ErrorRes),
        (status = 502, description = "Delete failed", body = ErrorRes)
    )
)]
/// Delete a definition
///
/// Patient values stored under the definition are kept but no longer shown.
pub async fn delete_field(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<ConfirmQuery>,
) -> ApiResult<Json<Notice>> {
    let scope = CallScope::for_user(&user);
    state
        .services
        .registry
        .delete_confirmed(&scope, &id, query.confirm)
        .await?;
    Ok(Json(Notice::field_deleted()))
}
