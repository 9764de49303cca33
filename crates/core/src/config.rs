//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.
//!
//! Binaries call [`ConfigValues::from_env`] once and hand the result to
//! [`CoreConfig::from_values`]; tests build [`ConfigValues`] directly.

use crate::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_PATIENT_DATA_DIR, DEFAULT_SESSION_TTL_SECS, PAGE_SIZE_OPTIONS,
    USERS_FILENAME,
};
use crate::error::{RecordError, RecordResult};
use crate::store::FirestoreConfig;
use std::path::{Path, PathBuf};

pub const ENV_STORE: &str = "PRM_STORE";
pub const ENV_PATIENT_DATA_DIR: &str = "PATIENT_DATA_DIR";
pub const ENV_AUTH: &str = "PRM_AUTH";
pub const ENV_FIREBASE_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
pub const ENV_FIREBASE_API_KEY: &str = "FIREBASE_API_KEY";
pub const ENV_SESSION_TTL_SECS: &str = "PRM_SESSION_TTL_SECS";
pub const ENV_PAGE_SIZE: &str = "PRM_PAGE_SIZE";

/// Which document store backs the record store client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File { data_dir: PathBuf },
    Firestore(FirestoreConfig),
}

/// Which identity service authenticates users.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthBackend {
    /// Local accounts; persisted to `users_file` when set.
    Local { users_file: Option<PathBuf> },
    Firebase { api_key: String },
}

/// Raw configuration strings, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigValues {
    pub store: Option<String>,
    pub patient_data_dir: Option<String>,
    pub auth: Option<String>,
    pub firebase_project_id: Option<String>,
    pub firebase_api_key: Option<String>,
    pub session_ttl_secs: Option<String>,
    pub page_size: Option<String>,
}

impl ConfigValues {
    /// Reads every variable from the process environment. Call once at startup.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            store: var(ENV_STORE),
            patient_data_dir: var(ENV_PATIENT_DATA_DIR),
            auth: var(ENV_AUTH),
            firebase_project_id: var(ENV_FIREBASE_PROJECT_ID),
            firebase_api_key: var(ENV_FIREBASE_API_KEY),
            session_ttl_secs: var(ENV_SESSION_TTL_SECS),
            page_size: var(ENV_PAGE_SIZE),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    store: StoreBackend,
    auth: AuthBackend,
    session_ttl_secs: i64,
    default_page_size: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// [`RecordError::InvalidInput`] if the TTL is negative or the page size is not offered.
    pub fn new(
        store: StoreBackend,
        auth: AuthBackend,
        session_ttl_secs: i64,
        default_page_size: usize,
    ) -> RecordResult<Self> {
        if session_ttl_secs < 0 {
            return Err(RecordError::InvalidInput(
                "session TTL cannot be negative".into(),
            ));
        }
        if !PAGE_SIZE_OPTIONS.contains(&default_page_size) {
            return Err(RecordError::InvalidInput(format!(
                "page size must be one of {PAGE_SIZE_OPTIONS:?}"
            )));
        }
        Ok(Self {
            store,
            auth,
            session_ttl_secs,
            default_page_size,
        })
    }

    /// In-memory store and accounts; for tests and demos.
    pub fn in_memory() -> Self {
        Self {
            store: StoreBackend::Memory,
            auth: AuthBackend::Local { users_file: None },
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Validates raw configuration values.
    ///
    /// Defaults: file store under `patient_data`, local accounts in `<data_dir>/users.json`,
    /// one hour sessions, ten rows per page.
    ///
    /// # Errors
    ///
    /// [`RecordError::InvalidInput`] naming the offending variable.
    pub fn from_values(values: ConfigValues) -> RecordResult<Self> {
        let data_dir = PathBuf::from(
            values
                .patient_data_dir
                .as_deref()
                .unwrap_or(DEFAULT_PATIENT_DATA_DIR),
        );

        let store = match values.store.as_deref().map(str::trim) {
            None | Some("file") => StoreBackend::File {
                data_dir: data_dir.clone(),
            },
            Some("memory") => StoreBackend::Memory,
            Some("firestore") => {
                let project_id = values.firebase_project_id.clone().ok_or_else(|| {
                    RecordError::InvalidInput(format!(
                        "{ENV_FIREBASE_PROJECT_ID} is required when {ENV_STORE}=firestore"
                    ))
                })?;
                StoreBackend::Firestore(
                    FirestoreConfig::new(project_id).with_api_key(values.firebase_api_key.clone()),
                )
            }
            Some(other) => {
                return Err(RecordError::InvalidInput(format!(
                    "{ENV_STORE} must be one of memory, file, firestore (got '{other}')"
                )))
            }
        };

        let auth = match values.auth.as_deref().map(str::trim) {
            None | Some("local") => AuthBackend::Local {
                users_file: match store {
                    StoreBackend::Memory => None,
                    _ => Some(data_dir.join(USERS_FILENAME)),
                },
            },
            Some("firebase") => AuthBackend::Firebase {
                api_key: values.firebase_api_key.clone().ok_or_else(|| {
                    RecordError::InvalidInput(format!(
                        "{ENV_FIREBASE_API_KEY} is required when {ENV_AUTH}=firebase"
                    ))
                })?,
            },
            Some(other) => {
                return Err(RecordError::InvalidInput(format!(
                    "{ENV_AUTH} must be one of local, firebase (got '{other}')"
                )))
            }
        };

        let session_ttl_secs = parse_number(
            ENV_SESSION_TTL_SECS,
            values.session_ttl_secs.as_deref(),
            DEFAULT_SESSION_TTL_SECS,
        )?;
        let default_page_size =
            parse_number(ENV_PAGE_SIZE, values.page_size.as_deref(), DEFAULT_PAGE_SIZE)?;

        Self::new(store, auth, session_ttl_secs, default_page_size)
    }

    pub fn store(&self) -> &StoreBackend {
        &self.store
    }

    pub fn auth(&self) -> &AuthBackend {
        &self.auth
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// Data directory of the file store, if that is the configured backend.
    pub fn patient_data_dir(&self) -> Option<&Path> {
        match &self.store {
            StoreBackend::File { data_dir } => Some(data_dir),
            _ => None,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: Option<&str>, default: T) -> RecordResult<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RecordError::InvalidInput(format!("{name} must be a number (got '{raw}')"))),
    }
}
