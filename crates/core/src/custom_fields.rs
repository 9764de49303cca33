//! Custom field registry.
//!
//! Custom fields are user-defined extra attributes applied to every patient. Each
//! definition lives in the `customFields` collection; a patient stores its values in
//! `customFieldValues`, keyed by definition id.
//!
//! The reference from a patient value to its definition is weak. Deleting a definition never
//! touches patient documents: orphaned values stay stored and are simply no longer rendered,
//! because every view iterates the current definitions rather than the stored values. Editing
//! a definition's type does not retype stored values either; they are reinterpreted under the
//! new type when read.

use crate::cancel::CallScope;
use crate::client::RecordStoreClient;
use crate::constants::NOT_AVAILABLE;
use crate::error::{RecordError, RecordResult};
use crate::store::Collection;
use crate::validation::FieldError;
use chrono::NaiveDate;
use prm_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value type of a custom field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
}

impl FieldType {
    pub const ALL: [FieldType; 4] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Date,
        FieldType::Boolean,
    ];

    /// Parses the wire name of a field type, ignoring case and surrounding whitespace.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(input))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
        }
    }

    /// Name shown in the field management table.
    pub fn display_name(self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Date => "Date",
            FieldType::Boolean => "Boolean",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom field definition with its store-assigned id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldDefinition {
    pub id: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// Stored body of a definition; the id is never part of it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldBody {
    label: String,
    field_type: FieldType,
    #[serde(default)]
    required: bool,
}

impl FieldBody {
    fn into_definition(self, id: String) -> CustomFieldDefinition {
        CustomFieldDefinition {
            id,
            label: self.label,
            field_type: self.field_type,
            required: self.required,
        }
    }
}

/// Unvalidated input of the create and edit forms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldInput {
    pub label: String,
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
}

impl CustomFieldInput {
    pub fn new(label: impl Into<String>, field_type: impl Into<String>, required: bool) -> Self {
        Self {
            label: label.into(),
            field_type: field_type.into(),
            required,
        }
    }

    fn validate(&self) -> RecordResult<FieldBody> {
        let mut errors = Vec::new();
        let label = match NonEmptyText::new(&self.label) {
            Ok(label) => Some(label),
            Err(_) => {
                errors.push(FieldError::new("label", "Label is required"));
                None
            }
        };
        let field_type = match FieldType::parse(&self.field_type) {
            Some(t) => Some(t),
            None if self.field_type.trim().is_empty() => {
                errors.push(FieldError::new("fieldType", "Field type is required"));
                None
            }
            None => {
                errors.push(FieldError::new(
                    "fieldType",
                    format!("Unknown field type '{}'", self.field_type.trim()),
                ));
                None
            }
        };

        match (label, field_type) {
            (Some(label), Some(field_type)) if errors.is_empty() => Ok(FieldBody {
                label: label.into_inner(),
                field_type,
                required: self.required,
            }),
            _ => Err(RecordError::Validation(errors)),
        }
    }
}

// ============================================================================
// Custom field values
// ============================================================================

/// A custom field value interpreted under its definition's type.
#[derive(Clone, Debug, PartialEq)]
pub enum CustomFieldValue {
    Text(String),
    Number(f64),
    /// ISO `YYYY-MM-DD` as entered.
    Date(String),
    Bool(bool),
}

/// A stored value whose JSON type cannot represent the definition's type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeMismatch {
    pub expected: FieldType,
}

impl CustomFieldValue {
    /// Interprets a stored value under `field_type`.
    ///
    /// Returns `Ok(None)` for absent values (`null`, empty or blank strings) and
    /// `Err(TypeMismatch)` when the value is present but cannot be read as `field_type`.
    pub fn decode(field_type: FieldType, raw: &Value) -> Result<Option<Self>, TypeMismatch> {
        let mismatch = TypeMismatch {
            expected: field_type,
        };
        if let Value::String(s) = raw {
            if s.trim().is_empty() {
                return Ok(None);
            }
        }
        match (field_type, raw) {
            (_, Value::Null) => Ok(None),
            (FieldType::String, Value::String(s)) => Ok(Some(Self::Text(s.clone()))),
            (FieldType::String, Value::Number(n)) => Ok(Some(Self::Text(n.to_string()))),
            (FieldType::String, Value::Bool(b)) => Ok(Some(Self::Text(b.to_string()))),
            (FieldType::Number, Value::Number(n)) => {
                n.as_f64().map(|f| Some(Self::Number(f))).ok_or(mismatch)
            }
            (FieldType::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| Some(Self::Number(f)))
                .ok_or(mismatch),
            (FieldType::Date, Value::String(s)) => Ok(Some(Self::Date(s.trim().to_string()))),
            (FieldType::Boolean, Value::Bool(b)) => Ok(Some(Self::Bool(*b))),
            (FieldType::Boolean, Value::String(s)) => match s.trim() {
                "true" => Ok(Some(Self::Bool(true))),
                "false" => Ok(Some(Self::Bool(false))),
                _ => Err(mismatch),
            },
            _ => Err(mismatch),
        }
    }

    /// Lenient form of [`Self::decode`] used at the store boundary: mismatches read as absent.
    pub fn from_stored(field_type: FieldType, raw: &Value) -> Option<Self> {
        Self::decode(field_type, raw).ok().flatten()
    }

    /// JSON form written to the store.
    pub fn to_stored(&self) -> Value {
        match self {
            Self::Text(s) | Self::Date(s) => Value::String(s.clone()),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::from(*n as i64),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
        }
    }

    /// Type-appropriate empty default used when merging a patient for editing.
    pub fn empty_for(field_type: FieldType) -> Value {
        match field_type {
            FieldType::String | FieldType::Date => Value::String(String::new()),
            FieldType::Number => Value::from(0),
            FieldType::Boolean => Value::Bool(false),
        }
    }

    /// Human-readable rendering for tables and the detail view.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Self::Date(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.format("%m/%d/%Y").to_string())
                .unwrap_or_else(|_| s.clone()),
            Self::Bool(true) => "Yes".into(),
            Self::Bool(false) => "No".into(),
        }
    }

    /// Renders an optional stored value under `field_type`, `"N/A"` when absent.
    pub fn display_stored(field_type: FieldType, raw: Option<&Value>) -> String {
        raw.and_then(|v| Self::from_stored(field_type, v))
            .map(|v| v.display())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Converts free text from a form or the command line into the stored JSON form.
///
/// Blank input becomes `null`. Text that cannot be read as `field_type` is kept as a string
/// so validation can report it against the field.
pub fn coerce_input(field_type: FieldType, raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match field_type {
        FieldType::String => Value::String(raw.to_string()),
        FieldType::Date => Value::String(trimmed.to_string()),
        FieldType::Number | FieldType::Boolean => {
            let candidate = match field_type {
                FieldType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                    "true" | "yes" | "y" | "1" | "on" => Value::Bool(true),
                    "false" | "no" | "n" | "0" | "off" => Value::Bool(false),
                    _ => Value::String(trimmed.to_string()),
                },
                _ => Value::String(trimmed.to_string()),
            };
            match CustomFieldValue::decode(field_type, &candidate) {
                Ok(Some(value)) => value.to_stored(),
                _ => candidate,
            }
        }
    }
}

/// Confirmation shown before a definition is deleted.
pub const DELETE_FIELD_PROMPT: &str = "Are you sure you want to delete this custom field?";

// ============================================================================
// Registry
// ============================================================================

/// CRUD over custom field definitions.
#[derive(Clone, Debug)]
pub struct CustomFieldRegistry {
    client: RecordStoreClient,
}

impl CustomFieldRegistry {
    pub fn new(client: RecordStoreClient) -> Self {
        Self { client }
    }

    /// All definitions in the store's natural order.
    pub async fn list(&self, scope: &CallScope) -> RecordResult<Vec<CustomFieldDefinition>> {
        let bodies: Vec<(String, FieldBody)> = self
            .client
            .get_all(scope, Collection::CustomFields)
            .await?;
        Ok(bodies
            .into_iter()
            .map(|(id, body)| body.into_definition(id))
            .collect())
    }

    /// All definitions sorted by label (case-insensitive), then id.
    ///
    /// Rendering paths use this so column order is stable across loads.
    pub async fn list_sorted(
        &self,
        scope: &CallScope,
    ) -> RecordResult<Vec<CustomFieldDefinition>> {
        let mut defs = self.list(scope).await?;
        sort_definitions(&mut defs);
        Ok(defs)
    }

    pub async fn get(&self, scope: &CallScope, id: &str) -> RecordResult<CustomFieldDefinition> {
        let body: FieldBody = self
            .client
            .get_by_id(scope, Collection::CustomFields, id)
            .await?;
        Ok(body.into_definition(id.to_string()))
    }

    /// Validates and stores a new definition.
    ///
    /// # Errors
    ///
    /// [`RecordError::Validation`] if the label is empty or the type is not recognised; no
    /// store call is made in that case.
    pub async fn create(
        &self,
        scope: &CallScope,
        input: &CustomFieldInput,
    ) -> RecordResult<CustomFieldDefinition> {
        let body = input.validate()?;
        let id = self
            .client
            .add(scope, Collection::CustomFields, &body)
            .await?;
        tracing::info!("created custom field {} ({})", id, body.field_type);
        Ok(body.into_definition(id))
    }

    /// Replaces label, type and required flag of an existing definition.
    ///
    /// Stored patient values are not retyped.
    pub async fn update(
        &self,
        scope: &CallScope,
        id: &str,
        input: &CustomFieldInput,
    ) -> RecordResult<CustomFieldDefinition> {
        let body = input.validate()?;
        self.client
            .update(scope, Collection::CustomFields, id, &body)
            .await?;
        tracing::info!("updated custom field {}", id);
        Ok(body.into_definition(id.to_string()))
    }

    /// Deletes a definition. Patient values that reference it are left untouched.
    pub async fn delete(&self, scope: &CallScope, id: &str) -> RecordResult<()> {
        self.client
            .delete(scope, Collection::CustomFields, id)
            .await?;
        tracing::info!("deleted custom field {}", id);
        Ok(())
    }

    /// Deletes a definition in one step when the caller has already confirmed.
    ///
    /// # Errors
    ///
    /// [`RecordError::ConfirmationRequired`] when `confirmed` is false; nothing is removed.
    pub async fn delete_confirmed(
        &self,
        scope: &CallScope,
        id: &str,
        confirmed: bool,
    ) -> RecordResult<()> {
        if !confirmed {
            return Err(RecordError::ConfirmationRequired {
                collection: Collection::CustomFields,
                id: id.to_string(),
                prompt: DELETE_FIELD_PROMPT.into(),
            });
        }
        self.delete(scope, id).await
    }
}

/// Sorts definitions by label (case-insensitive), then id.
pub fn sort_definitions(defs: &mut [CustomFieldDefinition]) {
    defs.sort_by(|a, b| {
        a.label
            .to_lowercase()
            .cmp(&b.label.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}
