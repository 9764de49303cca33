//! Hosted document database backend (Firestore REST API, v1).
//!
//! Documents are exchanged in the provider's typed value encoding (`stringValue`,
//! `integerValue`, `mapValue`, ...). The codec in this module converts between that encoding
//! and plain JSON, so the rest of the crate only ever sees [`Document`]s.
//!
//! Every request carries the caller's ID token from the [`CallScope`] as a bearer credential,
//! and the project API key when one is configured.

use super::{Collection, Document, DocumentStore, StoreError, StoreResult, StoredDocument};
use crate::cancel::CallScope;
use async_trait::async_trait;
use prm_uuid::DocumentId;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::time::Duration;

pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_PAGE_SIZE: u32 = 300;

/// Connection settings for the hosted store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: None,
            base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// URL of a collection in the default database.
    pub fn collection_url(&self, collection: Collection) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            collection.name()
        )
    }
}

#[derive(Debug)]
pub struct FirestoreStore {
    http_client: reqwest::Client,
    config: FirestoreConfig,
}

#[derive(Debug, Deserialize)]
struct RemoteDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RemoteDocument>,
    next_page_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> StoreResult<Self> {
        if config.project_id.trim().is_empty() {
            return Err(StoreError::Rejected("project id cannot be empty".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        tracing::info!(
            "Firestore store for project {} at {}",
            config.project_id,
            config.base_url
        );
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_url(&self, collection: Collection, id: &str) -> StoreResult<String> {
        if !DocumentId::is_valid(id) {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(format!("{}/{}", self.config.collection_url(collection), id))
    }

    fn authorise(&self, scope: &CallScope, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = match scope.id_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        match &self.config.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        collection: Collection,
        id: &str,
    ) -> StoreResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, collection, id, &body))
    }

    async fn fetch(
        &self,
        scope: &CallScope,
        collection: Collection,
        id: &str,
    ) -> StoreResult<StoredDocument> {
        let url = self.document_url(collection, id)?;
        let response = self
            .send(self.authorise(scope, self.http_client.get(url)), collection, id)
            .await?;
        let remote: RemoteDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        into_stored(collection, remote)
    }
}

/// Maps a non-success HTTP status to a store error.
pub(crate) fn map_status(status: StatusCode, collection: Collection, id: &str, body: &str) -> StoreError {
    let detail = error_message(body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound {
            collection,
            id: id.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Rejected(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => StoreError::Unavailable(detail),
        s if s.is_server_error() => StoreError::Unavailable(detail),
        _ => StoreError::Rejected(detail),
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn id_from_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn into_stored(collection: Collection, remote: RemoteDocument) -> StoreResult<StoredDocument> {
    let id = id_from_name(&remote.name).to_string();
    let data = decode_fields(&remote.fields).map_err(|reason| StoreError::Malformed {
        collection,
        id: id.clone(),
        reason,
    })?;
    Ok(StoredDocument { id, data })
}

// ============================================================================
// Value codec
// ============================================================================

/// Encodes a plain JSON value in the provider's typed encoding.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encodes the top-level fields of a document.
pub fn encode_fields(document: &Document) -> Map<String, Value> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Decodes a value from the provider's typed encoding.
///
/// Timestamps, references and bytes decode to their string forms; geo points decode to a
/// `{latitude, longitude}` object.
pub fn decode_value(value: &Value) -> Result<Value, String> {
    let Some(obj) = value.as_object() else {
        return Err(format!("expected a typed value object, got {value}"));
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Err("empty typed value".into());
    };
    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| format!("invalid booleanValue {inner}")),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| format!("invalid integerValue {inner}"))
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            let f = parsed.ok_or_else(|| format!("invalid doubleValue {inner}"))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| format!("invalid {kind} {inner}")),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|vs| vs.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Object(fields))
        }
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(Value::from(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(Value::from(0.0)),
        })),
        other => Err(format!("unsupported value type {other}")),
    }
}

/// Decodes the `fields` map of a remote document.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Document, String> {
    fields
        .iter()
        .map(|(key, value)| {
            decode_value(value)
                .map(|v| (key.clone(), v))
                .map_err(|e| format!("field {key}: {e}"))
        })
        .collect()
}

/// Quotes a top-level field name for use in an update mask.
fn field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn backend_name(&self) -> &'static str {
        "firestore"
    }

    async fn add(
        &self,
        scope: &CallScope,
        collection: Collection,
        data: Document,
    ) -> StoreResult<String> {
        scope
            .run(async {
                let url = self.config.collection_url(collection);
                let body = json!({ "fields": encode_fields(&data) });
                let request = self.authorise(scope, self.http_client.post(url).json(&body));
                let response = self.send(request, collection, "").await?;
                let remote: RemoteDocument = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                let id = id_from_name(&remote.name).to_string();
                tracing::debug!("firestore: added {}/{}", collection, id);
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
                let url = self.config.collection_url(collection);
                let mut documents = Vec::new();
                let mut page_token: Option<String> = None;

                loop {
                    let mut request = self
                        .http_client
                        .get(&url)
                        .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
                    if let Some(token) = &page_token {
                        request = request.query(&[("pageToken", token.as_str())]);
                    }
                    let response = self
                        .send(self.authorise(scope, request), collection, "")
                        .await?;
                    let page: ListResponse = response
                        .json()
                        .await
                        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

                    for remote in page.documents {
                        match into_stored(collection, remote) {
                            Ok(doc) => documents.push(doc),
                            Err(e) => tracing::warn!("skipping document: {}", e),
                        }
                    }

                    match page.next_page_token.filter(|t| !t.is_empty()) {
                        Some(token) => page_token = Some(token),
                        None => break,
                    }
                }

                tracing::debug!("firestore: listed {} {}", documents.len(), collection);
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
        scope.run(self.fetch(scope, collection, id)).await
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
                // An empty update mask would replace the whole document.
                if data.is_empty() {
                    return self.fetch(scope, collection, id).await.map(|_| ());
                }

                let url = self.document_url(collection, id)?;
                let mut params = vec![("currentDocument.exists".to_string(), "true".to_string())];
                params.extend(
                    data.keys()
                        .map(|k| ("updateMask.fieldPaths".to_string(), field_path(k))),
                );
                let body = json!({ "fields": encode_fields(&data) });
                let request = self.http_client.patch(url).query(&params).json(&body);
                self.send(self.authorise(scope, request), collection, id)
                    .await?;
                tracing::debug!("firestore: updated {}/{}", collection, id);
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
                let url = match self.document_url(collection, id) {
                    Ok(url) => url,
                    Err(StoreError::NotFound { .. }) => return Ok(()),
                    Err(e) => return Err(e),
                };
                match self
                    .send(self.authorise(scope, self.http_client.delete(url)), collection, id)
                    .await
                {
                    Ok(_) | Err(StoreError::NotFound { .. }) => {
                        tracing::debug!("firestore: deleted {}/{}", collection, id);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }
}
