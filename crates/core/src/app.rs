//! Service wiring.
//!
//! [`AppServices`] builds the store, auth provider and record services from a resolved
//! [`CoreConfig`]. Both the REST server and the CLI start from here so the two surfaces share
//! the same backends and behaviour.

use crate::auth::{AuthProvider, FirebaseAuthProvider, LocalAuthProvider};
use crate::client::RecordStoreClient;
use crate::config::{AuthBackend, CoreConfig, StoreBackend};
use crate::custom_fields::CustomFieldRegistry;
use crate::error::{RecordError, RecordResult};
use crate::service::PatientService;
use crate::store::{DocumentStore, FileStore, FirestoreStore, MemoryStore};
use std::sync::Arc;

/// Shared handles to every core service.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<CoreConfig>,
    pub client: RecordStoreClient,
    pub registry: CustomFieldRegistry,
    pub patients: PatientService,
    pub auth: Arc<dyn AuthProvider>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("store", &self.client.backend_name())
            .field("auth", &self.auth.provider_name())
            .finish()
    }
}

impl AppServices {
    /// Builds every service for `config`.
    ///
    /// # Errors
    ///
    /// [`RecordError::StoreUnavailable`] if the store cannot be opened, or
    /// [`RecordError::Auth`] if the account file is unreadable.
    pub fn build(config: CoreConfig) -> RecordResult<Self> {
        let store: Arc<dyn DocumentStore> = match config.store() {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::File { data_dir } => Arc::new(FileStore::new(data_dir.clone())),
            StoreBackend::Firestore(fs) => Arc::new(
                FirestoreStore::new(fs.clone())
                    .map_err(|e| RecordError::StoreUnavailable(e.to_string()))?,
            ),
        };

        let auth: Arc<dyn AuthProvider> = match config.auth() {
            AuthBackend::Local { users_file: None } => {
                Arc::new(LocalAuthProvider::in_memory(config.session_ttl()))
            }
            AuthBackend::Local {
                users_file: Some(path),
            } => Arc::new(LocalAuthProvider::open(path.clone(), config.session_ttl())?),
            AuthBackend::Firebase { api_key } => Arc::new(FirebaseAuthProvider::new(
                api_key.clone(),
                config.session_ttl(),
            )?),
        };

        tracing::info!(
            "services ready: store={} auth={}",
            store.backend_name(),
            auth.provider_name()
        );

        Ok(Self::with_backends(config, store, auth))
    }

    /// Wires services over already-built backends.
    pub fn with_backends(
        config: CoreConfig,
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let client = RecordStoreClient::new(store);
        let registry = CustomFieldRegistry::new(client.clone());
        let patients = PatientService::new(client.clone(), registry.clone());
        Self {
            config: Arc::new(config),
            client,
            registry,
            patients,
            auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CallScope;
    use crate::custom_fields::CustomFieldInput;

    #[tokio::test]
    async fn test_build_in_memory() {
        let services = AppServices::build(CoreConfig::in_memory()).expect("build should succeed");
        assert_eq!(services.client.backend_name(), "memory");
        assert_eq!(services.auth.provider_name(), "local");

        let scope = CallScope::new();
        services
            .registry
            .create(&scope, &CustomFieldInput::new("Allergies", "string", false))
            .await
            .expect("create should succeed");

        // The patient service sees the same registry.
        let fields = services
            .patients
            .registry()
            .list(&scope)
            .await
            .expect("list should succeed");
        assert_eq!(fields.len(), 1);
    }

    #[tokio::test]
    async fn test_build_file_backend() {
        let dir = tempfile::tempdir().expect("tempdir should succeed");
        let config = CoreConfig::new(
            StoreBackend::File {
                data_dir: dir.path().to_path_buf(),
            },
            AuthBackend::Local {
                users_file: Some(dir.path().join("users.json")),
            },
            60,
            10,
        )
        .expect("config should be valid");
        let services = AppServices::build(config).expect("build should succeed");
        assert_eq!(services.client.backend_name(), "file");
    }
}
