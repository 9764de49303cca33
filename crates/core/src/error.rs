use crate::auth::AuthError;
use crate::store::{Collection, StoreError};
use crate::validation::FieldError;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
    #[error("{} not found: {id}", collection.kind())]
    NotFound { collection: Collection, id: String },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("failed to delete {} {id}: {source}", collection.kind())]
    DeleteFailed {
        collection: Collection,
        id: String,
        #[source]
        source: StoreError,
    },
    #[error("stored {} {id} could not be decoded: {reason}", collection.kind())]
    CorruptDocument {
        collection: Collection,
        id: String,
        reason: String,
    },
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("a submission is already in flight: {0}")]
    SubmissionInFlight(String),
    #[error("deleting {} {id} requires confirmation", collection.kind())]
    ConfirmationRequired {
        collection: Collection,
        id: String,
        prompt: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type RecordResult<T> = std::result::Result<T, RecordError>;

impl RecordError {
    /// Message safe to show to a user.
    ///
    /// Provider error strings never leak through here; they are only logged.
    pub fn user_message(&self) -> String {
        match self {
            RecordError::Validation(_) => "Please correct the highlighted fields.".into(),
            RecordError::NotFound { collection, .. } => {
                format!("{} not found.", capitalise(collection.kind()))
            }
            RecordError::StoreUnavailable(_) => {
                "The record store is unavailable. Please try again.".into()
            }
            RecordError::DeleteFailed { collection, .. } => {
                format!("Failed to delete {}. Please try again.", collection.kind())
            }
            RecordError::CorruptDocument { collection, .. } => {
                format!("The stored {} could not be read.", collection.kind())
            }
            RecordError::Auth(e) => e.user_message(),
            RecordError::Cancelled => "The request was cancelled.".into(),
            RecordError::SubmissionInFlight(_) => {
                "This form is already being submitted. Please wait.".into()
            }
            RecordError::ConfirmationRequired { prompt, .. } => prompt.clone(),
            RecordError::InvalidInput(msg) => msg.clone(),
        }
    }

    /// Field errors carried by a validation failure, empty for every other kind.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            RecordError::Validation(errors) => errors,
            _ => &[],
        }
    }

    /// Maps a store failure for a non-delete operation.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => RecordError::NotFound { collection, id },
            StoreError::Cancelled => RecordError::Cancelled,
            other => RecordError::StoreUnavailable(other.to_string()),
        }
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
