//! Record store client.
//!
//! The only component that talks to a [`DocumentStore`]. It serialises typed records to
//! documents, maps store failures into [`RecordError`]s and logs them before they are turned
//! into user-facing messages.

use crate::cancel::CallScope;
use crate::error::{RecordError, RecordResult};
use crate::store::{Collection, Document, DocumentStore, StoreError, StoredDocument};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct RecordStoreClient {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for RecordStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStoreClient")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl RecordStoreClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Inserts `value` and returns the store-assigned id.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidInput`] if `value` does not serialise to a JSON object
    /// - [`RecordError::StoreUnavailable`] or [`RecordError::Cancelled`] from the store
    pub async fn add<T: Serialize>(
        &self,
        scope: &CallScope,
        collection: Collection,
        value: &T,
    ) -> RecordResult<String> {
        let data = to_document(value)?;
        self.store
            .add(scope, collection, data)
            .await
            .map_err(|e| log_failure("add", collection, "", e))
    }

    /// Returns every record of the collection.
    ///
    /// Documents that cannot be decoded as `T` are skipped with a warning, so one corrupt
    /// document never hides the rest of the collection.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        scope: &CallScope,
        collection: Collection,
    ) -> RecordResult<Vec<(String, T)>> {
        let documents = self
            .store
            .get_all(scope, collection)
            .await
            .map_err(|e| log_failure("list", collection, "", e))?;

        let mut records = Vec::with_capacity(documents.len());
        for doc in documents {
            match from_document::<T>(collection, doc) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping {}", e),
            }
        }
        Ok(records)
    }

    /// # Errors
    ///
    /// - [`RecordError::NotFound`] if no document has this id
    /// - [`RecordError::CorruptDocument`] if the document cannot be decoded as `T`
    pub async fn get_by_id<T: DeserializeOwned>(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> RecordResult<T> {
        let doc = self.get_raw(scope, collection, id).await?;
        from_document::<T>(collection, doc).map(|(_, record)| record)
    }

    /// Fetches a document without decoding it.
    pub async fn get_raw(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> RecordResult<StoredDocument> {
        self.store
            .get_by_id(scope, collection, id)
            .await
            .map_err(|e| log_failure("get", collection, id, e))
    }

    /// Writes the top-level fields of `value` over the stored document.
    ///
    /// Not-found is detected by the store itself; there is no local pre-check.
    pub async fn update<T: Serialize>(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
        value: &T,
    ) -> RecordResult<()> {
        let data = to_document(value)?;
        self.store
            .update(scope, collection, id, data)
            .await
            .map_err(|e| log_failure("update", collection, id, e))
    }

    /// # Errors
    ///
    /// Every store failure other than cancellation is wrapped in
    /// [`RecordError::DeleteFailed`].
    pub async fn delete(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> RecordResult<()> {
        match self.store.delete(scope, collection, id).await {
            Ok(()) => Ok(()),
            Err(StoreError::Cancelled) => Err(RecordError::Cancelled),
            Err(source) => {
                tracing::error!("failed to delete {}/{}: {}", collection, id, source);
                Err(RecordError::DeleteFailed {
                    collection,
                    id: id.to_string(),
                    source,
                })
            }
        }
    }
}

fn log_failure(op: &str, collection: Collection, id: &str, err: StoreError) -> RecordError {
    match &err {
        StoreError::NotFound { .. } | StoreError::Cancelled => {
            tracing::debug!("{} {}/{}: {}", op, collection, id, err)
        }
        _ => tracing::error!("{} {}/{} failed: {}", op, collection, id, err),
    }
    RecordError::from_store(err)
}

fn to_document<T: Serialize>(value: &T) -> RecordResult<Document> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(RecordError::InvalidInput(
            "record must serialise to a JSON object".into(),
        )),
        Err(e) => Err(RecordError::InvalidInput(format!(
            "record could not be serialised: {e}"
        ))),
    }
}

fn from_document<T: DeserializeOwned>(
    collection: Collection,
    doc: StoredDocument,
) -> RecordResult<(String, T)> {
    serde_json::from_value(serde_json::Value::Object(doc.data))
        .map(|record| (doc.id.clone(), record))
        .map_err(|e| RecordError::CorruptDocument {
            collection,
            id: doc.id,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Label {
        label: String,
    }

    fn setup() -> (Arc<MemoryStore>, RecordStoreClient) {
        let store = Arc::new(MemoryStore::new());
        let client = RecordStoreClient::new(store.clone());
        (store, client)
    }

    #[tokio::test]
    async fn test_get_all_skips_undecodable_documents() {
        let (store, client) = setup();
        store
            .insert_with_id(Collection::CustomFields, "ok", json!({"label": "A"}).as_object().cloned().unwrap())
            .await;
        store
            .insert_with_id(Collection::CustomFields, "bad", json!({"label": 5}).as_object().cloned().unwrap())
            .await;

        let all: Vec<(String, Label)> = client
            .get_all(&CallScope::new(), Collection::CustomFields)
            .await
            .expect("get_all should succeed");

        assert_eq!(all, vec![("ok".to_string(), Label { label: "A".into() })]);
    }

    #[tokio::test]
    async fn test_get_by_id_reports_corrupt_document() {
        let (store, client) = setup();
        store
            .insert_with_id(Collection::CustomFields, "bad", json!({"label": 5}).as_object().cloned().unwrap())
            .await;

        let err = client
            .get_by_id::<Label>(&CallScope::new(), Collection::CustomFields, "bad")
            .await
            .expect_err("get_by_id should fail");
        assert!(matches!(err, RecordError::CorruptDocument { .. }));
    }

    #[tokio::test]
    async fn test_failures_map_to_record_errors() {
        let (store, client) = setup();
        let scope = CallScope::new();

        let missing = client
            .get_by_id::<Label>(&scope, Collection::CustomFields, "nope")
            .await
            .expect_err("get_by_id should fail");
        assert!(matches!(missing, RecordError::NotFound { .. }));

        store.set_online(false);
        let unavailable = client
            .add(&scope, Collection::CustomFields, &Label { label: "A".into() })
            .await
            .expect_err("add should fail");
        assert!(matches!(unavailable, RecordError::StoreUnavailable(_)));

        let delete = client
            .delete(&scope, Collection::CustomFields, "x")
            .await
            .expect_err("delete should fail");
        assert!(matches!(delete, RecordError::DeleteFailed { .. }));
    }

    #[tokio::test]
    async fn test_add_rejects_non_object_records() {
        let (store, client) = setup();
        let err = client
            .add(&CallScope::new(), Collection::Patients, &"just a string")
            .await
            .expect_err("add should fail");
        assert!(matches!(err, RecordError::InvalidInput(_)));
        assert_eq!(store.calls(Collection::Patients).add, 0);
    }
}
