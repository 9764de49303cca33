//! Document store seam.
//!
//! [`DocumentStore`] is the only abstraction over the external persistence provider. Every
//! other component goes through [`crate::client::RecordStoreClient`], which in turn only
//! talks to this trait, so tests swap in [`MemoryStore`] without touching anything else.
//!
//! Documents are schemaless JSON objects. Ids are assigned by the store on insert and are
//! never part of the stored body.
//!
//! Backends:
//! - [`MemoryStore`]: in-process, for tests and demos
//! - [`FileStore`]: one JSON file per document under a local data directory
//! - [`FirestoreStore`]: the hosted document database over its REST API

use crate::cancel::CallScope;
use crate::constants::{CUSTOM_FIELDS_COLLECTION, PATIENTS_COLLECTION};
use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod file;
pub mod firestore;
pub mod memory;

pub use file::FileStore;
pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::{CallCounts, MemoryStore};

/// A document body as stored.
pub type Document = Map<String, Value>;

/// The two logical collections of the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Patients,
    CustomFields,
}

impl Collection {
    /// Collection name in the store.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Patients => PATIENTS_COLLECTION,
            Collection::CustomFields => CUSTOM_FIELDS_COLLECTION,
        }
    }

    /// Singular human-readable name of a document in this collection.
    pub fn kind(self) -> &'static str {
        match self {
            Collection::Patients => "patient",
            Collection::CustomFields => "custom field",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A document together with its store-assigned id.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: Collection, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected the request: {0}")]
    Rejected(String),
    #[error("malformed document {collection}/{id}: {reason}")]
    Malformed {
        collection: Collection,
        id: String,
        reason: String,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Asynchronous CRUD over a collection-organised document database.
///
/// Every call is a fresh round trip; implementations must not cache. There is no
/// transactionality across documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short name used in logs.
    fn backend_name(&self) -> &'static str;

    /// Inserts a document and returns the id the store assigned to it.
    async fn add(
        &self,
        scope: &CallScope,
        collection: Collection,
        data: Document,
    ) -> StoreResult<String>;

    /// Returns every document of the collection in the store's natural order.
    ///
    /// Callers must not rely on that order.
    async fn get_all(
        &self,
        scope: &CallScope,
        collection: Collection,
    ) -> StoreResult<Vec<StoredDocument>>;

    /// Fails with [`StoreError::NotFound`] if no document has this id.
    async fn get_by_id(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> StoreResult<StoredDocument>;

    /// Replaces the given top-level fields of an existing document; fields not present in
    /// `data` are kept. Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
        data: Document,
    ) -> StoreResult<()>;

    /// Deletes a document. Deleting a missing document succeeds.
    async fn delete(&self, scope: &CallScope, collection: Collection, id: &str)
        -> StoreResult<()>;
}

/// Shallow merge used by the local backends to mirror the hosted store's update semantics.
pub(crate) fn merge_top_level(existing: &mut Document, update: Document) {
    for (key, value) in update {
        existing.insert(key, value);
    }
}
