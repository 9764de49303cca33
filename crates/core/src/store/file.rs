//! Local JSON document store.
//!
//! Layout:
//!
//! ```text
//! <data_dir>/
//!   patients/<id>.json
//!   customFields/<id>.json
//! ```
//!
//! Writes go to a temporary sibling file which is then renamed over the target, so a reader
//! never observes a half-written document. Files that fail to parse are skipped by
//! [`DocumentStore::get_all`] with a warning and reported as malformed by
//! [`DocumentStore::get_by_id`].

use super::{merge_top_level, Collection, Document, DocumentStore, StoreError, StoreResult, StoredDocument};
use crate::cancel::CallScope;
use async_trait::async_trait;
use prm_uuid::DocumentId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const DOCUMENT_EXT: &str = "json";

#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.name())
    }

    /// Resolves the path of a document, rejecting ids that could escape the collection
    /// directory.
    fn document_path(&self, collection: Collection, id: &str) -> StoreResult<PathBuf> {
        if !DocumentId::is_valid(id) {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(self
            .collection_dir(collection)
            .join(format!("{id}.{DOCUMENT_EXT}")))
    }

    async fn read_document(&self, collection: Collection, id: &str) -> StoreResult<Document> {
        let path = self.document_path(collection, id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    collection,
                    id: id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        parse_document(collection, id, &bytes)
    }

    async fn write_document(
        &self,
        collection: Collection,
        id: &str,
        data: &Document,
    ) -> StoreResult<()> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir).await?;

        let target = self.document_path(collection, id)?;
        let tmp = dir.join(format!(".{id}.{}.tmp", DocumentId::generate()));
        let bytes = serde_json::to_vec_pretty(data)?;

        fs::write(&tmp, &bytes).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn parse_document(collection: Collection, id: &str, bytes: &[u8]) -> StoreResult<Document> {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Malformed {
            collection,
            id: id.to_string(),
            reason: "document is not a JSON object".into(),
        }),
        Err(e) => Err(StoreError::Malformed {
            collection,
            id: id.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn add(
        &self,
        scope: &CallScope,
        collection: Collection,
        data: Document,
    ) -> StoreResult<String> {
        scope
            .run(async {
                let mut id = DocumentId::generate().into_inner();
                while fs::try_exists(self.document_path(collection, &id)?).await? {
                    id = DocumentId::generate().into_inner();
                }
                self.write_document(collection, &id, &data).await?;
                tracing::debug!("file store: added {}/{}", collection, id);
                Ok(id)
            })
            .await
    }

    async fn get_all(
        &self,
        scope: &CallScope,
        collection: Collection,
    ) -> StoreResult<Vec<StoredDocument>> {
        scope
            .run(async {
                let dir = self.collection_dir(collection);
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => return Err(e.into()),
                };

                let mut documents = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
                        continue;
                    }
                    let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    if !DocumentId::is_valid(id) {
                        continue;
                    }

                    let bytes = match fs::read(&path).await {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!("failed to read {}: {}", path.display(), e);
                            continue;
                        }
                    };
                    match parse_document(collection, id, &bytes) {
                        Ok(data) => documents.push(StoredDocument {
                            id: id.to_string(),
                            data,
                        }),
                        Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
                    }
                }
                Ok(documents)
            })
            .await
    }

    async fn get_by_id(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> StoreResult<StoredDocument> {
        scope
            .run(async {
                let data = self.read_document(collection, id).await?;
                Ok(StoredDocument {
                    id: id.to_string(),
                    data,
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
        scope
            .run(async {
                let mut existing = self.read_document(collection, id).await?;
                merge_top_level(&mut existing, data);
                self.write_document(collection, id, &existing).await?;
                tracing::debug!("file store: updated {}/{}", collection, id);
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
        scope
            .run(async {
                let path = match self.document_path(collection, id) {
                    Ok(path) => path,
                    // An id that can never name a document is already deleted.
                    Err(StoreError::NotFound { .. }) => return Ok(()),
                    Err(e) => return Err(e),
                };
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!("file store: deleted {}/{}", collection, id);
                        Ok(())
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().expect("fixture should be an object")
    }

    #[tokio::test]
    async fn test_add_writes_json_file_without_id_in_body() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path());
        let scope = CallScope::new();

        let id = store
            .add(&scope, Collection::Patients, doc(json!({"firstName": "Jane"})))
            .await
            .expect("add should succeed");

        let path = temp_dir.path().join("patients").join(format!("{id}.json"));
        let contents = std::fs::read_to_string(&path).expect("document file should exist");
        let parsed: serde_json::Value = serde_json::from_str(&contents).expect("valid json");
        assert_eq!(parsed, json!({"firstName": "Jane"}));
    }

    #[tokio::test]
    async fn test_get_all_skips_corrupt_documents() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path());
        let scope = CallScope::new();

        store
            .add(&scope, Collection::CustomFields, doc(json!({"label": "Allergies"})))
            .await
            .expect("add should succeed");
        let dir = temp_dir.path().join("customFields");
        std::fs::write(dir.join("broken.json"), "{not json").expect("write should succeed");
        std::fs::write(dir.join("notes.txt"), "ignored").expect("write should succeed");

        let all = store
            .get_all(&scope, Collection::CustomFields)
            .await
            .expect("get_all should succeed");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data["label"], "Allergies");

        let err = store
            .get_by_id(&scope, Collection::CustomFields, "broken")
            .await
            .expect_err("corrupt document should fail");
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_get_all_on_missing_directory_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path().join("does-not-exist"));
        let all = store
            .get_all(&CallScope::new(), Collection::Patients)
            .await
            .expect("get_all should succeed");
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path());
        let scope = CallScope::new();

        let err = store
            .update(&scope, Collection::Patients, "missing", Document::new())
            .await
            .expect_err("update should fail");
        assert!(matches!(err, StoreError::NotFound { .. }));

        let id = store
            .add(&scope, Collection::Patients, doc(json!({"firstName": "Jane", "lastName": "Doe"})))
            .await
            .expect("add should succeed");
        store
            .update(&scope, Collection::Patients, &id, doc(json!({"firstName": "Janet"})))
            .await
            .expect("update should succeed");

        let fetched = store
            .get_by_id(&scope, Collection::Patients, &id)
            .await
            .expect("get_by_id should succeed");
        assert_eq!(fetched.data["firstName"], "Janet");
        assert_eq!(fetched.data["lastName"], "Doe");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_rejects_traversal() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path());
        let scope = CallScope::new();

        let id = store
            .add(&scope, Collection::Patients, Document::new())
            .await
            .expect("add should succeed");
        store.delete(&scope, Collection::Patients, &id).await.expect("delete should succeed");
        store.delete(&scope, Collection::Patients, &id).await.expect("repeat delete should succeed");
        store
            .delete(&scope, Collection::Patients, "../../etc/passwd")
            .await
            .expect("invalid id delete should succeed");

        let err = store
            .get_by_id(&scope, Collection::Patients, "../secret")
            .await
            .expect_err("traversal should fail");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
