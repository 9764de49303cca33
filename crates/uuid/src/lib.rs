//! Identifier utilities.
//!
//! PRM works with two kinds of identifier:
//!
//! - **Document ids** name a stored document inside a collection. They are assigned by the
//!   store on insert. The hosted store uses 20-character alphanumeric auto-ids; the local
//!   backends generate ids of the same shape with [`DocumentId::generate`] so the two are
//!   interchangeable.
//! - **Address ids** name an address row inside a patient document. They are assigned
//!   client-side (a hyphenated UUID v4) when a form adds a row, or when a record is prepared
//!   for saving and a row is still missing one.
//!
//! Document ids supplied from outside (REST paths, CLI arguments) are validated with
//! [`DocumentId::parse`] before they reach a store. Local backends use the id as a file
//! name, so the accepted alphabet is deliberately small.

mod service;

pub use service::{new_address_id, DocumentId, AUTO_ID_LEN, MAX_ID_LEN};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
