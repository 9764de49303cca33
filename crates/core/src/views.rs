//! View models for the presentation surfaces.
//!
//! The REST server and the CLI render the same structures. Custom columns and fields are
//! always built by iterating the current definitions, so values of deleted definitions never
//! appear in any view.

use crate::constants::{DEFAULT_PAGE_SIZE, PAGE_SIZE_OPTIONS};
use crate::custom_fields::{CustomFieldDefinition, CustomFieldValue, FieldType};
use crate::error::{RecordError, RecordResult};
use crate::patient::{Address, Patient, PatientDraft, PatientStatus};
use serde::{Deserialize, Serialize};

// ============================================================================
// Notices
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A transient message shown after an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub fn from_error(err: &RecordError) -> Self {
        Self::error(err.user_message())
    }

    pub fn patient_added() -> Self {
        Self::success("Patient added successfully!")
    }

    pub fn patient_updated() -> Self {
        Self::success("Patient updated successfully!")
    }

    pub fn patient_deleted() -> Self {
        Self::success("Patient deleted successfully!")
    }

    pub fn field_saved() -> Self {
        Self::success("Custom field saved successfully!")
    }

    pub fn field_deleted() -> Self {
        Self::success("Custom field deleted successfully!")
    }

    pub fn logged_in() -> Self {
        Self::success("Logged in successfully!")
    }

    pub fn registered() -> Self {
        Self::success("Registered successfully!")
    }

    pub fn logged_out() -> Self {
        Self::success("Logged out successfully!")
    }
}

// ============================================================================
// Patient table
// ============================================================================

/// Client-side paging request. `page` is zero-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// # Errors
    ///
    /// [`RecordError::InvalidInput`] if `page_size` is not one of the offered sizes.
    pub fn new(page: usize, page_size: usize) -> RecordResult<Self> {
        if !PAGE_SIZE_OPTIONS.contains(&page_size) {
            return Err(RecordError::InvalidInput(format!(
                "page size must be one of {PAGE_SIZE_OPTIONS:?}"
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// `firstName`, ..., `address` for standard columns; the definition id for custom ones.
    pub key: String,
    pub header: String,
    /// Set for custom columns only.
    pub field_type: Option<FieldType>,
}

impl Column {
    fn standard(key: &str, header: &str) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            field_type: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PatientRow {
    pub id: String,
    /// One rendered cell per column, in column order.
    pub cells: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientTable {
    pub columns: Vec<Column>,
    pub rows: Vec<PatientRow>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub page_count: usize,
}

fn standard_columns() -> Vec<Column> {
    vec![
        Column::standard("firstName", "First"),
        Column::standard("middleName", "Middle"),
        Column::standard("lastName", "Last"),
        Column::standard("dob", "DOB"),
        Column::standard("status", "Status"),
        Column::standard("address", "Address"),
    ]
}

/// Renders one row: the standard cells, then one cell per definition.
fn patient_row(patient: &Patient, field_defs: &[CustomFieldDefinition]) -> PatientRow {
    let r = &patient.record;
    let mut cells = vec![
        r.first_name.clone(),
        r.middle_name.clone().unwrap_or_default(),
        r.last_name.clone(),
        r.dob.clone(),
        r.status.to_string(),
        patient.address_summary(),
    ];
    cells.extend(field_defs.iter().map(|def| {
        CustomFieldValue::display_stored(def.field_type, r.custom_field_values.get(&def.id))
    }));
    PatientRow {
        id: patient.id.clone(),
        cells,
    }
}

/// Builds one page of the patient list.
///
/// Rows keep the store's order. A page past the end is clamped to the last page.
pub fn patient_table(
    patients: &[Patient],
    field_defs: &[CustomFieldDefinition],
    request: PageRequest,
) -> PatientTable {
    let mut columns = standard_columns();
    columns.extend(field_defs.iter().map(|def| Column {
        key: def.id.clone(),
        header: def.label.clone(),
        field_type: Some(def.field_type),
    }));

    let total = patients.len();
    let page_count = total.div_ceil(request.page_size).max(1);
    let page = request.page.min(page_count - 1);
    let rows = patients
        .iter()
        .skip(page * request.page_size)
        .take(request.page_size)
        .map(|p| patient_row(p, field_defs))
        .collect();

    PatientTable {
        columns,
        rows,
        page,
        page_size: request.page_size,
        total,
        page_count,
    }
}

// ============================================================================
// Patient detail
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressLines {
    pub address_line1: String,
    pub address_line2: Option<String>,
    /// `city, state zip`.
    pub locality: String,
}

impl From<&Address> for AddressLines {
    fn from(address: &Address) -> Self {
        Self {
            address_line1: address.address_line1.clone(),
            address_line2: address
                .address_line2
                .clone()
                .filter(|l| !l.trim().is_empty()),
            locality: format!("{}, {} {}", address.city, address.state, address.zip),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LabelledValue {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetailView {
    pub id: String,
    pub name: String,
    pub dob: String,
    pub status: PatientStatus,
    /// Every address, in order.
    pub addresses: Vec<AddressLines>,
    /// Set when the patient has no addresses.
    pub addresses_message: Option<String>,
    pub custom_fields: Vec<LabelledValue>,
}

pub fn patient_detail(patient: &Patient, field_defs: &[CustomFieldDefinition]) -> PatientDetailView {
    let r = &patient.record;
    let addresses: Vec<AddressLines> = r.addresses.iter().map(AddressLines::from).collect();
    let addresses_message = addresses
        .is_empty()
        .then(|| "No addresses available.".to_string());
    PatientDetailView {
        id: patient.id.clone(),
        name: patient.full_name(),
        dob: r.dob.clone(),
        status: r.status,
        addresses,
        addresses_message,
        custom_fields: field_defs
            .iter()
            .map(|def| LabelledValue {
                label: def.label.clone(),
                value: CustomFieldValue::display_stored(
                    def.field_type,
                    r.custom_field_values.get(&def.id),
                ),
            })
            .collect(),
    }
}

// ============================================================================
// Edit form
// ============================================================================

/// Content of the edit patient form: the merged draft and the fields to render.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditForm {
    pub id: String,
    pub draft: PatientDraft,
    pub fields: Vec<CustomFieldDefinition>,
    pub status_options: Vec<PatientStatus>,
}

impl EditForm {
    /// `merged` must already carry defaults for every definition in `fields`.
    pub fn new(merged: &Patient, fields: Vec<CustomFieldDefinition>) -> Self {
        Self {
            id: merged.id.clone(),
            draft: merged.to_draft(),
            fields,
            status_options: PatientStatus::ALL.to_vec(),
        }
    }
}

// ============================================================================
// Custom field management
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldRow {
    pub id: String,
    pub label: String,
    /// Capitalised type name, e.g. `Number`.
    pub field_type: String,
    /// `Yes` or `No`.
    pub required: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldTable {
    pub rows: Vec<CustomFieldRow>,
    /// Set when no fields are defined.
    pub empty_message: Option<String>,
}

pub fn custom_field_table(field_defs: &[CustomFieldDefinition]) -> CustomFieldTable {
    let rows: Vec<CustomFieldRow> = field_defs
        .iter()
        .map(|def| CustomFieldRow {
            id: def.id.clone(),
            label: def.label.clone(),
            field_type: def.field_type.display_name().to_string(),
            required: if def.required { "Yes" } else { "No" }.to_string(),
        })
        .collect();
    let empty_message = rows
        .is_empty()
        .then(|| "No custom fields defined.".to_string());
    CustomFieldTable {
        rows,
        empty_message,
    }
}
