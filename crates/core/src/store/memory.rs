//! In-process document store.
//!
//! Documents live in a `BTreeMap` per collection keyed by a random auto-id, so the natural
//! iteration order is effectively arbitrary, as it is for the hosted store. The store counts
//! every call it receives and can be switched offline to exercise the unavailable path.

use super::{merge_top_level, Collection, Document, DocumentStore, StoreError, StoreResult, StoredDocument};
use crate::cancel::CallScope;
use async_trait::async_trait;
use prm_uuid::DocumentId;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

/// Number of calls of each kind received for one collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub add: usize,
    pub get_all: usize,
    pub get_by_id: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    /// Calls that would modify the store.
    pub fn writes(&self) -> usize {
        self.add + self.update + self.delete
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Document>>>,
    calls: Mutex<HashMap<Collection, CallCounts>>,
    online: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Switches the simulated connection. While offline every call fails as unavailable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Calls received so far for `collection`.
    pub fn calls(&self, collection: Collection) -> CallCounts {
        self.calls
            .lock()
            .map(|calls| calls.get(&collection).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Inserts a document under a caller-chosen id, bypassing call accounting.
    ///
    /// Used to seed fixtures.
    pub async fn insert_with_id(&self, collection: Collection, id: &str, data: Document) {
        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Reads a raw document, bypassing call accounting.
    pub async fn peek(&self, collection: Collection, id: &str) -> Option<Document> {
        self.collections
            .read()
            .await
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    fn record(&self, collection: Collection, bump: impl FnOnce(&mut CallCounts)) {
        if let Ok(mut calls) = self.calls.lock() {
            bump(calls.entry(collection).or_default());
        }
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn add(
        &self,
        scope: &CallScope,
        collection: Collection,
        data: Document,
    ) -> StoreResult<String> {
        self.record(collection, |c| c.add += 1);
        scope
            .run(async {
                self.ensure_online()?;
                let mut collections = self.collections.write().await;
                let docs = collections.entry(collection).or_default();
                let mut id = DocumentId::generate().into_inner();
                while docs.contains_key(&id) {
                    id = DocumentId::generate().into_inner();
                }
                docs.insert(id.clone(), data);
                Ok(id)
            })
            .await
    }

    async fn get_all(
        &self,
        scope: &CallScope,
        collection: Collection,
    ) -> StoreResult<Vec<StoredDocument>> {
        self.record(collection, |c| c.get_all += 1);
        scope
            .run(async {
                self.ensure_online()?;
                let collections = self.collections.read().await;
                Ok(collections
                    .get(&collection)
                    .map(|docs| {
                        docs.iter()
                            .map(|(id, data)| StoredDocument {
                                id: id.clone(),
                                data: data.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            })
            .await
    }

    async fn get_by_id(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> StoreResult<StoredDocument> {
        self.record(collection, |c| c.get_by_id += 1);
        scope
            .run(async {
                self.ensure_online()?;
                let collections = self.collections.read().await;
                collections
                    .get(&collection)
                    .and_then(|docs| docs.get(id))
                    .map(|data| StoredDocument {
                        id: id.to_string(),
                        data: data.clone(),
                    })
                    .ok_or_else(|| StoreError::NotFound {
                        collection,
                        id: id.to_string(),
                    })
            })
            .await
    }

    async fn update(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
        data: Document,
    ) -> StoreResult<()> {
        self.record(collection, |c| c.update += 1);
        scope
            .run(async {
                self.ensure_online()?;
                let mut collections = self.collections.write().await;
                let existing = collections
                    .get_mut(&collection)
                    .and_then(|docs| docs.get_mut(id))
                    .ok_or_else(|| StoreError::NotFound {
                        collection,
                        id: id.to_string(),
                    })?;
                merge_top_level(existing, data);
                Ok(())
            })
            .await
    }

    async fn delete(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> StoreResult<()> {
        self.record(collection, |c| c.delete += 1);
        scope
            .run(async {
                self.ensure_online()?;
                if let Some(docs) = self.collections.write().await.get_mut(&collection) {
                    docs.remove(id);
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().expect("fixture should be an object")
    }

    #[tokio::test]
    async fn test_add_then_get_by_id() {
        let store = MemoryStore::new();
        let scope = CallScope::new();

        let id = store
            .add(&scope, Collection::Patients, doc(json!({"firstName": "Jane"})))
            .await
            .expect("add should succeed");
        let fetched = store
            .get_by_id(&scope, Collection::Patients, &id)
            .await
            .expect("get_by_id should succeed");

        assert_eq!(fetched.id, id);
        assert_eq!(fetched.data["firstName"], "Jane");
        assert_eq!(store.calls(Collection::Patients).add, 1);
        assert_eq!(store.calls(Collection::Patients).get_by_id, 1);
        assert_eq!(store.calls(Collection::CustomFields), CallCounts::default());
    }

    #[tokio::test]
    async fn test_get_by_id_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get_by_id(&CallScope::new(), Collection::Patients, "nope")
            .await
            .expect_err("get_by_id should fail");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found_and_merges_existing() {
        let store = MemoryStore::new();
        let scope = CallScope::new();

        let err = store
            .update(&scope, Collection::CustomFields, "nope", Document::new())
            .await
            .expect_err("update should fail");
        assert!(matches!(err, StoreError::NotFound { .. }));

        store
            .insert_with_id(Collection::CustomFields, "f1", doc(json!({"label": "A", "required": true})))
            .await;
        store
            .update(&scope, Collection::CustomFields, "f1", doc(json!({"label": "B"})))
            .await
            .expect("update should succeed");

        let stored = store.peek(Collection::CustomFields, "f1").await.unwrap();
        assert_eq!(stored["label"], "B");
        assert_eq!(stored["required"], true);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let scope = CallScope::new();
        store.insert_with_id(Collection::Patients, "p1", Document::new()).await;

        store.delete(&scope, Collection::Patients, "p1").await.expect("delete should succeed");
        store.delete(&scope, Collection::Patients, "p1").await.expect("second delete should succeed");

        assert!(store.peek(Collection::Patients, "p1").await.is_none());
        assert_eq!(store.calls(Collection::Patients).delete, 2);
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let store = MemoryStore::new();
        store.set_online(false);

        let err = store
            .get_all(&CallScope::new(), Collection::Patients)
            .await
            .expect_err("get_all should fail");
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_online(true);
        assert!(store.get_all(&CallScope::new(), Collection::Patients).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_scope_writes_nothing() {
        let store = MemoryStore::new();
        let scope = CallScope::new();
        scope.cancel();

        let err = store
            .add(&scope, Collection::Patients, doc(json!({"firstName": "Jane"})))
            .await
            .expect_err("add should be cancelled");

        assert!(matches!(err, StoreError::Cancelled));
        let all = store
            .get_all(&CallScope::new(), Collection::Patients)
            .await
            .expect("get_all should succeed");
        assert!(all.is_empty());
    }
}
