//! Patient endpoints: list, add, detail, edit and delete.

use crate::error::ApiResult;
use crate::AppState;
use api_shared::{ConfirmQuery, ErrorRes, PageQuery};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use prm_core::views::{
    patient_detail, patient_table, EditForm, Notice, PageRequest, PatientDetailView, PatientTable,
};
use prm_core::{AuthUser, CallScope, Patient, PatientDraft};
use serde::Serialize;

/// A saved patient and the success message to show.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SavedPatientRes {
    pub message: String,
    pub patient: Patient,
}

#[utoipa::path(
    get,
    path = "/patients",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of the patient table", body = PatientTable),
        (status = 400, description = "Unsupported page size", body = ErrorRes),
        (status = 401, description = "Not signed in", body = ErrorRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
/// List patients as a paged table
///
/// Columns are the standard fields followed by one column per custom field definition.
/// Patients keep the store's order; only the first address is summarised.
pub async fn list_patients(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PatientTable>> {
    let page = PageRequest::new(
        query.page.unwrap_or(0),
        query
            .page_size
            .unwrap_or(state.services.config.default_page_size()),
    )?;
    let scope = CallScope::for_user(&user);
    let defs = state.services.registry.list_sorted(&scope).await?;
    let patients = state.services.patients.list(&scope).await?;
    Ok(Json(patient_table(&patients, &defs, page)))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientDraft,
    responses(
        (status = 201, description = "Patient created", body = SavedPatientRes),
        (status = 409, description = "Submission already in flight", body = ErrorRes),
        (status = 422, description = "Validation failed", body = ErrorRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
/// Add a patient
///
/// The draft is validated against the fixed fields and every current custom field. Nothing is
/// written when validation fails.
pub async fn create_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(draft): Json<PatientDraft>,
) -> ApiResult<(StatusCode, Json<SavedPatientRes>)> {
    let scope = CallScope::for_user(&user);
    let patient = state.services.patients.create(&scope, draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedPatientRes {
            message: Notice::patient_added().message,
            patient,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient detail view", body = PatientDetailView),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// Patient detail view
pub async fn get_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<PatientDetailView>> {
    let scope = CallScope::for_user(&user);
    let defs = state.services.registry.list_sorted(&scope).await?;
    let patient = state.services.patients.get(&scope, &id).await?;
    Ok(Json(patient_detail(&patient, &defs)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/edit",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Edit form prefilled from the stored patient", body = EditForm),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// Load the edit form
///
/// Custom fields added since the patient was saved are present with empty defaults.
pub async fn edit_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<EditForm>> {
    let scope = CallScope::for_user(&user);
    Ok(Json(state.services.patients.load_for_edit(&scope, &id).await?))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    request_body = PatientDraft,
    responses(
        (status = 200, description = "Patient updated", body = SavedPatientRes),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 409, description = "Submission already in flight", body = ErrorRes),
        (status = 422, description = "Validation failed", body = ErrorRes)
    )
)]
/// Save the edit form
///
/// The draft replaces every stored field; a null `middleName` clears it.
pub async fn update_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(draft): Json<PatientDraft>,
) -> ApiResult<Json<SavedPatientRes>> {
    let scope = CallScope::for_user(&user);
    let patient = state.services.patients.update(&scope, &id, draft).await?;
    Ok(Json(SavedPatientRes {
        message: Notice::patient_updated().message,
        patient,
    }))
}

#[utoipa::path(
    delete,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id"), ConfirmQuery),
    responses(
        (status = 200, description = "Patient deleted", body = Notice),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 409, description = "Confirmation required; `confirm` carries the prompt", body = ErrorRes),
        (status = 502, description = "Delete failed", body = ErrorRes)
    )
)]
/// Delete a patient
///
/// Without `confirm=true` nothing is removed and the response carries the confirmation prompt.
pub async fn delete_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<ConfirmQuery>,
) -> ApiResult<Json<Notice>> {
    let scope = CallScope::for_user(&user);
    state
        .services
        .patients
        .delete(&scope, &id, query.confirm)
        .await?;
    Ok(Json(Notice::patient_deleted()))
}
