//! Constants used throughout the PRM core crate.
//!
//! This module contains collection names, display sentinels and paging limits so that
//! every presentation path agrees on them.

/// Collection holding patient documents.
pub const PATIENTS_COLLECTION: &str = "patients";

/// Collection holding custom field definition documents.
pub const CUSTOM_FIELDS_COLLECTION: &str = "customFields";

/// Default directory for file-backed storage when no explicit directory is configured.
pub const DEFAULT_PATIENT_DATA_DIR: &str = "patient_data";

/// Filename for locally registered users (local auth provider).
pub const USERS_FILENAME: &str = "users.json";

/// Pattern every address zip code must match.
pub const ZIP_PATTERN: &str = r"^[0-9]{5}(-[0-9]{4})?$";

/// Shown wherever a value is missing in a rendered view.
pub const NOT_AVAILABLE: &str = "N/A";

/// Page sizes offered by the patient table.
pub const PAGE_SIZE_OPTIONS: [usize; 4] = [10, 25, 50, 100];

/// Default page size of the patient table.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default lifetime of a locally issued session token.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 6;
