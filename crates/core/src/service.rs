//! Patient lifecycle operations.
//!
//! [`PatientService`] composes the pure entity rules in [`crate::patient`] with the store
//! client. Validation always runs against the registry as it is at submission time and
//! always completes before any patient write is issued.
//!
//! Concurrent edits of the same patient are last-writer-wins; nothing here detects them.

use crate::cancel::CallScope;
use crate::client::RecordStoreClient;
use crate::custom_fields::CustomFieldRegistry;
use crate::error::{RecordError, RecordResult};
use crate::patient::{self, Patient, PatientDraft, PatientRecord};
use crate::store::Collection;
use crate::views::EditForm;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Keys of submissions currently in flight.
///
/// A second submit of the same form while the first is still running is rejected instead
/// of issuing a duplicate store call.
#[derive(Clone, Debug, Default)]
pub struct SubmissionGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct SubmissionTicket {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`RecordError::SubmissionInFlight`] if `key` is already held.
    pub fn begin(&self, key: impl Into<String>) -> RecordResult<SubmissionTicket> {
        let key = key.into();
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| RecordError::SubmissionInFlight(key.clone()))?;
        if !in_flight.insert(key.clone()) {
            tracing::warn!("rejected duplicate submission {}", key);
            return Err(RecordError::SubmissionInFlight(key));
        }
        Ok(SubmissionTicket {
            key,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }
}

impl Drop for SubmissionTicket {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}

/// Key guarding the add patient form of `owner`.
pub fn create_key(owner: &str) -> String {
    format!("create-patient:{owner}")
}

/// Key guarding the edit form of patient `id`.
pub fn update_key(id: &str) -> String {
    format!("update-patient:{id}")
}

/// A delete that has been requested but not yet confirmed.
#[derive(Debug)]
pub struct PendingDelete {
    pub id: String,
    pub name: String,
    /// Question shown to the user before the delete is issued.
    pub prompt: String,
    client: RecordStoreClient,
}

impl PendingDelete {
    /// Issues the delete.
    ///
    /// # Errors
    ///
    /// [`RecordError::DeleteFailed`] carrying the store failure; the patient is unchanged.
    pub async fn confirm(self, scope: &CallScope) -> RecordResult<()> {
        self.client
            .delete(scope, Collection::Patients, &self.id)
            .await?;
        tracing::info!("deleted patient {}", self.id);
        Ok(())
    }

    /// Error returned to callers that attempted the delete without confirming.
    pub fn into_confirmation_required(self) -> RecordError {
        RecordError::ConfirmationRequired {
            collection: Collection::Patients,
            id: self.id,
            prompt: self.prompt,
        }
    }
}

/// Pure patient data operations over a record store.
#[derive(Clone, Debug)]
pub struct PatientService {
    client: RecordStoreClient,
    registry: CustomFieldRegistry,
    guard: SubmissionGuard,
}

impl PatientService {
    pub fn new(client: RecordStoreClient, registry: CustomFieldRegistry) -> Self {
        Self {
            client,
            registry,
            guard: SubmissionGuard::new(),
        }
    }

    pub fn registry(&self) -> &CustomFieldRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &SubmissionGuard {
        &self.guard
    }

    /// Validates and prepares a draft for saving.
    ///
    /// Lists the registry once, then validates without touching the patient collection.
    async fn checked_record(
        &self,
        scope: &CallScope,
        draft: PatientDraft,
    ) -> RecordResult<PatientRecord> {
        let defs = self.registry.list(scope).await?;
        let draft = patient::normalise_custom_values(draft, &defs);
        patient::validate(&draft, &defs).map_err(RecordError::Validation)?;
        patient::prepare_for_save(draft).into_record()
    }

    /// Creates a patient from the add patient form.
    ///
    /// # Errors
    ///
    /// - [`RecordError::SubmissionInFlight`] if the same owner's add form is already saving
    /// - [`RecordError::Validation`] with every field error; nothing is written
    /// - [`RecordError::StoreUnavailable`] or [`RecordError::Cancelled`] from the store
    pub async fn create(&self, scope: &CallScope, draft: PatientDraft) -> RecordResult<Patient> {
        let _ticket = self.guard.begin(create_key(scope.owner()))?;
        let record = self.checked_record(scope, draft).await?;
        let id = self.client.add(scope, Collection::Patients, &record).await?;
        tracing::info!("created patient {}", id);
        Ok(Patient { id, record })
    }

    /// All patients in the store's natural order. Undecodable documents are skipped.
    pub async fn list(&self, scope: &CallScope) -> RecordResult<Vec<Patient>> {
        let records: Vec<(String, PatientRecord)> = self
            .client
            .get_all(scope, Collection::Patients)
            .await?;
        Ok(records
            .into_iter()
            .map(|(id, record)| Patient { id, record })
            .collect())
    }

    pub async fn get(&self, scope: &CallScope, id: &str) -> RecordResult<Patient> {
        let record: PatientRecord = self
            .client
            .get_by_id(scope, Collection::Patients, id)
            .await?;
        Ok(Patient {
            id: id.to_string(),
            record,
        })
    }

    /// Loads a patient for the edit form, merged with defaults for every current field.
    pub async fn load_for_edit(&self, scope: &CallScope, id: &str) -> RecordResult<EditForm> {
        let defs = self.registry.list_sorted(scope).await?;
        let stored = self.get(scope, id).await?;
        let merged = patient::merge(&stored, &defs);
        Ok(EditForm::new(&merged, defs))
    }

    /// Republishes the full patient document from the edit form.
    ///
    /// # Errors
    ///
    /// As for [`Self::create`], plus [`RecordError::NotFound`] if the patient was deleted in
    /// the meantime.
    pub async fn update(
        &self,
        scope: &CallScope,
        id: &str,
        draft: PatientDraft,
    ) -> RecordResult<Patient> {
        let _ticket = self.guard.begin(update_key(id))?;
        let record = self.checked_record(scope, draft).await?;
        self.client
            .update(scope, Collection::Patients, id, &record)
            .await?;
        tracing::info!("updated patient {}", id);
        Ok(Patient {
            id: id.to_string(),
            record,
        })
    }

    /// Starts a delete. Nothing is removed until [`PendingDelete::confirm`] is called.
    pub async fn request_delete(&self, scope: &CallScope, id: &str) -> RecordResult<PendingDelete> {
        let patient = self.get(scope, id).await?;
        let name = patient.full_name();
        Ok(PendingDelete {
            id: patient.id,
            prompt: format!("Are you sure you want to delete {name}? This action cannot be undone."),
            name,
            client: self.client.clone(),
        })
    }

    /// Deletes a patient in one step when the caller has already confirmed.
    ///
    /// # Errors
    ///
    /// [`RecordError::ConfirmationRequired`] carrying the prompt when `confirmed` is false.
    pub async fn delete(&self, scope: &CallScope, id: &str, confirmed: bool) -> RecordResult<()> {
        let pending = self.request_delete(scope, id).await?;
        if !confirmed {
            return Err(pending.into_confirmation_required());
        }
        pending.confirm(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_fields::CustomFieldInput;
    use crate::patient::Address;
    use crate::store::MemoryStore;
    use crate::views::{patient_table, PageRequest};
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, PatientService) {
        let store = Arc::new(MemoryStore::new());
        let client = RecordStoreClient::new(store.clone());
        let service = PatientService::new(client.clone(), CustomFieldRegistry::new(client));
        (store, service)
    }

    fn jane() -> PatientDraft {
        PatientDraft {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            dob: "1990-01-01".into(),
            status: "Active".into(),
            addresses: vec![Address {
                address_line1: "123 Main St".into(),
                city: "Springfield".into(),
                state: "IL".into(),
                zip: "62704".into(),
                ..Address::default()
            }],
            ..PatientDraft::default()
        }
    }

    #[tokio::test]
    async fn test_required_custom_field_end_to_end() {
        let (store, service) = setup();
        let scope = CallScope::new();
        let insurance = service
            .registry()
            .create(&scope, &CustomFieldInput::new("Insurance Number", "string", true))
            .await
            .expect("create field should succeed");

        let mut draft = jane();
        draft
            .custom_field_values
            .insert(insurance.id.clone(), json!(""));
        let err = service
            .create(&scope, draft.clone())
            .await
            .expect_err("create should fail validation");
        assert_eq!(
            err.field_errors(),
            &[crate::validation::FieldError::new(
                format!("customFieldValues.{}", insurance.id),
                "Insurance Number is required"
            )]
        );
        assert_eq!(store.calls(Collection::Patients).add, 0);

        draft
            .custom_field_values
            .insert(insurance.id.clone(), json!("INS-001"));
        let created = service
            .create(&scope, draft)
            .await
            .expect("create should succeed");
        assert_eq!(store.calls(Collection::Patients).add, 1);
        assert!(created.record.addresses[0].id.is_some());

        let patients = service.list(&scope).await.expect("list should succeed");
        let defs = service.registry().list_sorted(&scope).await.expect("list should succeed");
        let table = patient_table(&patients, &defs, PageRequest::default());
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].id, created.id);
        assert_eq!(table.rows[0].cells[0], "Jane");
        assert_eq!(table.rows[0].cells.last().map(String::as_str), Some("INS-001"));
    }

    #[tokio::test]
    async fn test_deleted_field_value_stays_stored_but_is_not_rendered() {
        let (store, service) = setup();
        let scope = CallScope::new();
        let field = service
            .registry()
            .create(&scope, &CustomFieldInput::new("Allergies", "string", false))
            .await
            .expect("create field should succeed");
        let mut draft = jane();
        draft
            .custom_field_values
            .insert(field.id.clone(), json!("Peanuts"));
        let created = service.create(&scope, draft).await.expect("create should succeed");

        service
            .registry()
            .delete(&scope, &field.id)
            .await
            .expect("delete field should succeed");

        let raw = store
            .peek(Collection::Patients, &created.id)
            .await
            .expect("patient should be stored");
        assert_eq!(raw["customFieldValues"][&field.id], "Peanuts");

        let defs = service.registry().list_sorted(&scope).await.expect("list should succeed");
        let patients = service.list(&scope).await.expect("list should succeed");
        let table = patient_table(&patients, &defs, PageRequest::default());
        assert!(!table.rows[0].cells.iter().any(|c| c == "Peanuts"));
        let form = service
            .load_for_edit(&scope, &created.id)
            .await
            .expect("load_for_edit should succeed");
        assert!(form.fields.is_empty());
        let detail = crate::views::patient_detail(&patients[0], &defs);
        assert!(detail.custom_fields.is_empty());
    }

    #[tokio::test]
    async fn test_load_for_edit_merges_new_fields() {
        let (_store, service) = setup();
        let scope = CallScope::new();
        let created = service.create(&scope, jane()).await.expect("create should succeed");
        let field = service
            .registry()
            .create(&scope, &CustomFieldInput::new("Weight", "number", false))
            .await
            .expect("create field should succeed");

        let form = service
            .load_for_edit(&scope, &created.id)
            .await
            .expect("load_for_edit should succeed");

        assert_eq!(form.draft.custom_field_values[&field.id], json!(0));
        assert_eq!(form.fields.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_address_ids_and_clears_middle_name() {
        let (store, service) = setup();
        let scope = CallScope::new();
        let mut draft = jane();
        draft.middle_name = Some("Q".into());
        let created = service.create(&scope, draft).await.expect("create should succeed");
        let address_id = created.record.addresses[0].id.clone();

        let mut edit = created.to_draft();
        edit.middle_name = None;
        edit.status = "Churned".into();
        service
            .update(&scope, &created.id, edit)
            .await
            .expect("update should succeed");

        let fetched = service.get(&scope, &created.id).await.expect("get should succeed");
        assert_eq!(fetched.record.addresses[0].id, address_id);
        assert_eq!(fetched.record.middle_name, None);
        assert_eq!(fetched.record.status.as_str(), "Churned");
        assert_eq!(store.calls(Collection::Patients).update, 1);
    }

    #[tokio::test]
    async fn test_update_missing_patient_is_not_found() {
        let (_store, service) = setup();
        let err = service
            .update(&CallScope::new(), "missing", jane())
            .await
            .expect_err("update should fail");
        assert!(matches!(err, RecordError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let (store, service) = setup();
        let scope = CallScope::new();
        let created = service.create(&scope, jane()).await.expect("create should succeed");

        let err = service
            .delete(&scope, &created.id, false)
            .await
            .expect_err("unconfirmed delete should fail");
        match err {
            RecordError::ConfirmationRequired { prompt, .. } => assert_eq!(
                prompt,
                "Are you sure you want to delete Jane Doe? This action cannot be undone."
            ),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.calls(Collection::Patients).delete, 0);

        service
            .delete(&scope, &created.id, true)
            .await
            .expect("confirmed delete should succeed");
        assert!(store.peek(Collection::Patients, &created.id).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_patient() {
        let (store, service) = setup();
        let scope = CallScope::new();
        let created = service.create(&scope, jane()).await.expect("create should succeed");
        let pending = service
            .request_delete(&scope, &created.id)
            .await
            .expect("request_delete should succeed");

        store.set_online(false);
        let err = pending.confirm(&scope).await.expect_err("delete should fail");
        assert_eq!(err.user_message(), "Failed to delete patient. Please try again.");

        store.set_online(true);
        assert!(store.peek(Collection::Patients, &created.id).await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected() {
        let (store, service) = setup();
        let scope = CallScope::new();
        let _held = service
            .guard()
            .begin(create_key(scope.owner()))
            .expect("first submission should be accepted");

        let err = service
            .create(&scope, jane())
            .await
            .expect_err("second submission should be rejected");
        assert!(matches!(err, RecordError::SubmissionInFlight(_)));
        assert_eq!(store.calls(Collection::Patients).add, 0);
    }

    #[tokio::test]
    async fn test_ticket_released_after_submission() {
        let (_store, service) = setup();
        let scope = CallScope::new();
        service.create(&scope, jane()).await.expect("create should succeed");
        assert!(!service.guard().is_in_flight(&create_key(scope.owner())));
        service.create(&scope, jane()).await.expect("second create should succeed");
    }

    #[tokio::test]
    async fn test_cancelled_create_writes_nothing() {
        let (store, service) = setup();
        let scope = CallScope::new();
        scope.cancel();

        let err = service.create(&scope, jane()).await.expect_err("create should be cancelled");
        assert!(matches!(err, RecordError::Cancelled));
        assert_eq!(store.calls(Collection::Patients).writes(), 0);
    }
}
