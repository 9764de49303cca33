//! Patient entity: shape, validation and merge rules.
//!
//! Everything here is pure. [`crate::service::PatientService`] composes these functions with
//! the store client.
//!
//! Stored shape (collection `patients`, id never in the body):
//!
//! ```json
//! {
//!   "firstName": "Jane", "middleName": null, "lastName": "Doe",
//!   "dob": "1990-01-01", "status": "Active",
//!   "addresses": [{"id": "…", "addressLine1": "123 Main St", "city": "Springfield",
//!                  "state": "IL", "zip": "62704"}],
//!   "customFieldValues": {"<fieldId>": "…"}
//! }
//! ```

use crate::constants::NOT_AVAILABLE;
use crate::custom_fields::{CustomFieldDefinition, CustomFieldValue, FieldType};
use crate::error::{RecordError, RecordResult};
use crate::validation::{
    address_path, custom_field_path, is_blank, is_iso_date, is_valid_zip, require, FieldError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Lifecycle stage of a patient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum PatientStatus {
    Inquiry,
    Onboarding,
    Active,
    Churned,
}

impl PatientStatus {
    pub const ALL: [PatientStatus; 4] = [
        PatientStatus::Inquiry,
        PatientStatus::Onboarding,
        PatientStatus::Active,
        PatientStatus::Churned,
    ];

    /// Parses a status name, ignoring case and surrounding whitespace.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(input))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::Inquiry => "Inquiry",
            PatientStatus::Onboarding => "Onboarding",
            PatientStatus::Active => "Active",
            PatientStatus::Churned => "Churned",
        }
    }
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A postal address owned by a patient.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    /// Unique within the owning patient; assigned before the first save.
    pub id: Option<String>,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Address {
    /// `line1 line2, city, state zip`, with line 2 omitted when blank.
    pub fn one_line(&self) -> String {
        let street = match self.address_line2.as_deref().map(str::trim) {
            Some(line2) if !line2.is_empty() => format!("{} {}", self.address_line1, line2),
            _ => self.address_line1.clone(),
        };
        format!("{street}, {}, {} {}", self.city, self.state, self.zip)
    }

    fn validate(&self, index: usize, errors: &mut Vec<FieldError>) {
        require(errors, address_path(index, "addressLine1"), "Address Line 1", &self.address_line1);
        require(errors, address_path(index, "city"), "City", &self.city);
        require(errors, address_path(index, "state"), "State", &self.state);
        if require(errors, address_path(index, "zip"), "Zip Code", &self.zip)
            && !is_valid_zip(&self.zip)
        {
            errors.push(FieldError::new(address_path(index, "zip"), "Invalid Zip Code"));
        }
    }
}

/// Unvalidated content of the add and edit patient forms.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientDraft {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    /// ISO `YYYY-MM-DD`.
    pub dob: String,
    pub status: String,
    pub addresses: Vec<Address>,
    #[schema(value_type = Object)]
    pub custom_field_values: BTreeMap<String, Value>,
}

/// Stored body of a patient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub first_name: String,
    /// Always written, as `null` when absent, so an update clears a previous value.
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub dob: String,
    pub status: PatientStatus,
    #[serde(default)]
    pub addresses: Vec<Address>,
    /// Values keyed by custom field id. May hold values of deleted definitions.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub custom_field_values: BTreeMap<String, Value>,
}

/// A stored patient with its store-assigned id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Patient {
    pub id: String,
    #[serde(flatten)]
    pub record: PatientRecord,
}

impl Patient {
    /// `first middle last`, skipping a blank middle name.
    pub fn full_name(&self) -> String {
        let r = &self.record;
        match r.middle_name.as_deref().map(str::trim) {
            Some(middle) if !middle.is_empty() => {
                format!("{} {} {}", r.first_name, middle, r.last_name)
            }
            _ => format!("{} {}", r.first_name, r.last_name),
        }
    }

    /// Summary of the first address, see [`address_summary`].
    pub fn address_summary(&self) -> String {
        address_summary(&self.record.addresses)
    }

    /// Draft pre-filled with this patient, for the edit form.
    pub fn to_draft(&self) -> PatientDraft {
        let r = &self.record;
        PatientDraft {
            first_name: r.first_name.clone(),
            middle_name: r.middle_name.clone(),
            last_name: r.last_name.clone(),
            dob: r.dob.clone(),
            status: r.status.as_str().to_string(),
            addresses: r.addresses.clone(),
            custom_field_values: r.custom_field_values.clone(),
        }
    }

    /// Reads a custom value under its definition's type.
    pub fn custom_value(&self, def: &CustomFieldDefinition) -> Option<CustomFieldValue> {
        self.record
            .custom_field_values
            .get(&def.id)
            .and_then(|raw| CustomFieldValue::from_stored(def.field_type, raw))
    }
}

impl PatientDraft {
    /// Converts a validated draft into its stored form, trimming the fixed text attributes.
    ///
    /// # Errors
    ///
    /// [`RecordError::Validation`] if the status is not a known value, which [`validate`]
    /// already reports.
    pub fn into_record(self) -> RecordResult<PatientRecord> {
        let status = PatientStatus::parse(&self.status).ok_or_else(|| {
            RecordError::Validation(vec![FieldError::new("status", "Status is required")])
        })?;
        Ok(PatientRecord {
            first_name: self.first_name.trim().to_string(),
            middle_name: self
                .middle_name
                .filter(|m| !is_blank(m))
                .map(|m| m.trim().to_string()),
            last_name: self.last_name.trim().to_string(),
            dob: self.dob.trim().to_string(),
            status,
            addresses: self.addresses,
            custom_field_values: self.custom_field_values,
        })
    }
}

/// Validates a draft against the current custom field definitions.
///
/// Checks the fixed attributes, every address, and every definition in `field_defs`. Values
/// for ids that have no definition are ignored.
///
/// # Errors
///
/// Returns every field-scoped failure found, in form order.
pub fn validate(
    draft: &PatientDraft,
    field_defs: &[CustomFieldDefinition],
) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    require(&mut errors, "firstName", "First name", &draft.first_name);
    require(&mut errors, "lastName", "Last name", &draft.last_name);
    if require(&mut errors, "dob", "Date of Birth", &draft.dob) && !is_iso_date(draft.dob.trim()) {
        errors.push(FieldError::new(
            "dob",
            "Date of Birth must be a valid date (YYYY-MM-DD)",
        ));
    }
    if require(&mut errors, "status", "Status", &draft.status)
        && PatientStatus::parse(&draft.status).is_none()
    {
        errors.push(FieldError::new(
            "status",
            "Status must be one of Inquiry, Onboarding, Active, Churned",
        ));
    }

    if draft.addresses.is_empty() {
        errors.push(FieldError::new("addresses", "At least one address is required"));
    }
    for (index, address) in draft.addresses.iter().enumerate() {
        address.validate(index, &mut errors);
    }

    for def in field_defs {
        let raw = draft
            .custom_field_values
            .get(&def.id)
            .unwrap_or(&Value::Null);
        let path = custom_field_path(&def.id);
        match CustomFieldValue::decode(def.field_type, raw) {
            Ok(None) if def.required => {
                errors.push(FieldError::new(path, format!("{} is required", def.label)));
            }
            Ok(Some(CustomFieldValue::Date(date))) if !is_iso_date(&date) => {
                errors.push(FieldError::new(path, type_message(def)));
            }
            Ok(_) => {}
            Err(_) => errors.push(FieldError::new(path, type_message(def))),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn type_message(def: &CustomFieldDefinition) -> String {
    match def.field_type {
        FieldType::String => format!("{} must be text", def.label),
        FieldType::Number => format!("{} must be a number", def.label),
        FieldType::Date => format!("{} must be a valid date", def.label),
        FieldType::Boolean => format!("{} must be yes or no", def.label),
    }
}

/// Fills in a type-appropriate empty value for every definition the patient has no value
/// for. Existing values, including orphans, are kept.
///
/// Used when displaying or editing, never when saving. Idempotent.
pub fn merge(stored: &Patient, field_defs: &[CustomFieldDefinition]) -> Patient {
    let mut merged = stored.clone();
    for def in field_defs {
        let values = &mut merged.record.custom_field_values;
        match values.get(&def.id) {
            Some(v) if !v.is_null() => {}
            _ => {
                values.insert(def.id.clone(), CustomFieldValue::empty_for(def.field_type));
            }
        }
    }
    merged
}

/// Assigns a fresh id to every address that lacks one. Existing ids are kept.
pub fn prepare_for_save(mut draft: PatientDraft) -> PatientDraft {
    for address in &mut draft.addresses {
        if address.id.as_deref().map_or(true, is_blank) {
            address.id = Some(prm_uuid::new_address_id());
        }
    }
    draft
}

/// One-line summary of the first address, `"N/A"` when there are none.
///
/// Only the first address is summarised; list views never show the others.
pub fn address_summary(addresses: &[Address]) -> String {
    addresses
        .first()
        .map(Address::one_line)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Rewrites free-text custom values into the JSON form of their definition's type.
///
/// Form and command-line input arrive as strings; numbers and booleans are converted so
/// validation and storage see typed values. Text that does not convert is kept and reported
/// by [`validate`].
pub fn normalise_custom_values(
    mut draft: PatientDraft,
    field_defs: &[CustomFieldDefinition],
) -> PatientDraft {
    for def in field_defs {
        if let Some(Value::String(raw)) = draft.custom_field_values.get(&def.id) {
            let coerced = crate::custom_fields::coerce_input(def.field_type, raw);
            draft.custom_field_values.insert(def.id.clone(), coerced);
        }
    }
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address() -> Address {
        Address {
            id: None,
            address_line1: "123 Main St".into(),
            address_line2: None,
            city: "Springfield".into(),
            state: "IL".into(),
            zip: "62704".into(),
        }
    }

    fn draft() -> PatientDraft {
        PatientDraft {
            first_name: "Jane".into(),
            middle_name: None,
            last_name: "Doe".into(),
            dob: "1990-01-01".into(),
            status: "Active".into(),
            addresses: vec![address()],
            custom_field_values: BTreeMap::new(),
        }
    }

    fn def(id: &str, label: &str, field_type: FieldType, required: bool) -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: id.into(),
            label: label.into(),
            field_type,
            required,
        }
    }

    fn patient(values: BTreeMap<String, Value>) -> Patient {
        let mut d = draft();
        d.custom_field_values = values;
        Patient {
            id: "p1".into(),
            record: d.into_record().expect("draft should convert"),
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_draft_passes() {
        assert_eq!(validate(&draft(), &[]), Ok(()));
    }

    #[test]
    fn test_required_fixed_attributes() {
        let empty = PatientDraft {
            addresses: vec![address()],
            ..PatientDraft::default()
        };
        let errors = validate(&empty, &[]).expect_err("empty draft should fail");
        assert_eq!(fields(&errors), vec!["firstName", "lastName", "dob", "status"]);
        assert_eq!(errors[0].message, "First name is required");
        assert_eq!(errors[2].message, "Date of Birth is required");
    }

    #[test]
    fn test_each_blank_required_field_is_rejected() {
        let blanks: [fn(&mut PatientDraft); 4] = [
            |d| d.first_name = " ".into(),
            |d| d.last_name = String::new(),
            |d| d.dob = String::new(),
            |d| d.status = String::new(),
        ];
        for blank in blanks {
            let mut d = draft();
            blank(&mut d);
            assert!(validate(&d, &[]).is_err());
        }
    }

    #[test]
    fn test_dob_and_status_must_parse() {
        let mut d = draft();
        d.dob = "01/01/1990".into();
        d.status = "Retired".into();
        let errors = validate(&d, &[]).expect_err("should fail");
        assert_eq!(fields(&errors), vec!["dob", "status"]);
    }

    #[test]
    fn test_address_rules() {
        let mut d = draft();
        d.addresses[0].zip = "1234".into();
        d.addresses.push(Address {
            zip: "62704-1234".into(),
            city: String::new(),
            ..address()
        });
        let errors = validate(&d, &[]).expect_err("should fail");
        assert_eq!(
            errors,
            vec![
                FieldError::new("addresses.0.zip", "Invalid Zip Code"),
                FieldError::new("addresses.1.city", "City is required"),
            ]
        );

        d.addresses.clear();
        let errors = validate(&d, &[]).expect_err("should fail");
        assert_eq!(fields(&errors), vec!["addresses"]);
    }

    #[test]
    fn test_zip_and_dob_reject_non_ascii_and_loose_forms() {
        let mut d = draft();
        d.addresses[0].zip = "\u{FF16}\u{FF12}\u{FF17}\u{FF10}\u{FF14}".into();
        d.dob = "1990-1-1".into();
        let errors = validate(&d, &[]).expect_err("should fail");
        assert_eq!(fields(&errors), vec!["dob", "addresses.0.zip"]);
    }

    #[test]
    fn test_into_record_trims_fixed_attributes() {
        let mut d = draft();
        d.first_name = " Jane ".into();
        d.middle_name = Some(" Q ".into());
        d.last_name = "Doe  ".into();
        d.dob = " 1990-01-01".into();
        assert_eq!(validate(&d, &[]), Ok(()));

        let record = d.into_record().expect("draft should convert");
        assert_eq!(record.first_name, "Jane");
        assert_eq!(record.middle_name.as_deref(), Some("Q"));
        assert_eq!(record.last_name, "Doe");
        assert_eq!(record.dob, "1990-01-01");
    }

    #[test]
    fn test_custom_field_rules() {
        let defs = vec![
            def("ins", "Insurance Number", FieldType::String, true),
            def("w", "Weight", FieldType::Number, false),
            def("v", "Visit", FieldType::Date, false),
            def("c", "Consent", FieldType::Boolean, true),
        ];
        let mut d = draft();
        d.custom_field_values.insert("w".into(), json!("heavy"));
        d.custom_field_values.insert("v".into(), json!("2024-13-01"));
        d.custom_field_values.insert("orphan".into(), json!({"any": "thing"}));

        let errors = validate(&d, &defs).expect_err("should fail");
        assert_eq!(
            errors,
            vec![
                FieldError::new("customFieldValues.ins", "Insurance Number is required"),
                FieldError::new("customFieldValues.w", "Weight must be a number"),
                FieldError::new("customFieldValues.v", "Visit must be a valid date"),
                FieldError::new("customFieldValues.c", "Consent is required"),
            ]
        );

        d.custom_field_values.insert("ins".into(), json!("ABC-123"));
        d.custom_field_values.insert("w".into(), json!(0));
        d.custom_field_values.insert("v".into(), json!(""));
        d.custom_field_values.insert("c".into(), json!(false));
        assert_eq!(validate(&d, &defs), Ok(()));
    }

    #[test]
    fn test_merge_fills_defaults_and_is_idempotent() {
        let defs = vec![
            def("s", "S", FieldType::String, false),
            def("n", "N", FieldType::Number, false),
            def("d", "D", FieldType::Date, false),
            def("b", "B", FieldType::Boolean, false),
        ];
        let mut values = BTreeMap::new();
        values.insert("n".to_string(), json!(5));
        values.insert("b".to_string(), Value::Null);
        values.insert("orphan".to_string(), json!("kept"));
        let stored = patient(values);

        let once = merge(&stored, &defs);
        let twice = merge(&once, &defs);

        assert_eq!(once, twice);
        let v = &once.record.custom_field_values;
        assert_eq!(v["s"], json!(""));
        assert_eq!(v["n"], json!(5));
        assert_eq!(v["d"], json!(""));
        assert_eq!(v["b"], json!(false));
        assert_eq!(v["orphan"], json!("kept"));
    }

    #[test]
    fn test_prepare_for_save_assigns_missing_ids_only() {
        let mut d = draft();
        d.addresses[0].id = Some("keep-me".into());
        d.addresses.push(address());
        d.addresses.push(Address {
            id: Some(String::new()),
            ..address()
        });

        let prepared = prepare_for_save(d);

        assert_eq!(prepared.addresses[0].id.as_deref(), Some("keep-me"));
        let a = prepared.addresses[1].id.clone().expect("id should be assigned");
        let b = prepared.addresses[2].id.clone().expect("id should be assigned");
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_address_summary() {
        assert_eq!(address_summary(&[]), "N/A");
        assert_eq!(
            address_summary(&[address()]),
            "123 Main St, Springfield, IL 62704"
        );
        let with_line2 = Address {
            address_line2: Some("Apt 4".into()),
            ..address()
        };
        assert_eq!(
            address_summary(&[with_line2, address()]),
            "123 Main St Apt 4, Springfield, IL 62704"
        );
        let blank_line2 = Address {
            address_line2: Some("  ".into()),
            ..address()
        };
        assert_eq!(blank_line2.one_line(), "123 Main St, Springfield, IL 62704");
    }

    #[test]
    fn test_record_wire_shape() {
        let record = draft().into_record().expect("draft should convert");
        let value = serde_json::to_value(&record).expect("serialise should succeed");
        assert_eq!(value["firstName"], "Jane");
        assert_eq!(value["middleName"], Value::Null);
        assert_eq!(value["status"], "Active");
        assert_eq!(value["addresses"][0]["addressLine1"], "123 Main St");
        assert!(value.get("id").is_none());

        let p = Patient {
            id: "p1".into(),
            record,
        };
        let flat = serde_json::to_value(&p).expect("serialise should succeed");
        assert_eq!(flat["id"], "p1");
        assert_eq!(flat["lastName"], "Doe");
    }

    #[test]
    fn test_normalise_custom_values() {
        let defs = vec![
            def("n", "N", FieldType::Number, false),
            def("b", "B", FieldType::Boolean, false),
        ];
        let mut d = draft();
        d.custom_field_values.insert("n".into(), json!("42"));
        d.custom_field_values.insert("b".into(), json!("no"));
        d.custom_field_values.insert("x".into(), json!("untouched"));

        let n = normalise_custom_values(d, &defs);
        assert_eq!(n.custom_field_values["n"], json!(42));
        assert_eq!(n.custom_field_values["b"], json!(false));
        assert_eq!(n.custom_field_values["x"], json!("untouched"));
    }

    #[test]
    fn test_full_name() {
        let mut p = patient(BTreeMap::new());
        assert_eq!(p.full_name(), "Jane Doe");
        p.record.middle_name = Some("Q".into());
        assert_eq!(p.full_name(), "Jane Q Doe");
    }
}
