//! # PRM Core
//!
//! Core business logic for the patient records manager.
//!
//! This crate contains pure data operations over a document store:
//! - Patient creation, listing, editing and deletion with dynamic custom fields
//! - The custom-field schema registry
//! - Authentication providers and the session gate
//! - Presentation-neutral view models (tables, detail views, edit forms)
//!
//! **No API concerns**: HTTP servers, command-line parsing and request/response types belong in
//! `api-rest`, `cli` or `api-shared`.

pub mod app;
pub mod auth;
pub mod cancel;
pub mod client;
pub mod config;
pub mod constants;
pub mod custom_fields;
pub mod error;
pub mod patient;
pub mod service;
pub mod session;
pub mod store;
pub mod validation;
pub mod views;

pub use app::AppServices;
pub use auth::{AuthError, AuthProvider, AuthResult, AuthUser, Credentials};
pub use cancel::{CallScope, CancelToken};
pub use client::RecordStoreClient;
pub use config::{AuthBackend, ConfigValues, CoreConfig, StoreBackend};
pub use custom_fields::{
    CustomFieldDefinition, CustomFieldInput, CustomFieldRegistry, CustomFieldValue, FieldType,
};
pub use error::{RecordError, RecordResult};
pub use patient::{Address, Patient, PatientDraft, PatientRecord, PatientStatus};
pub use service::{PatientService, PendingDelete};
pub use session::{GateDecision, Route, SessionContext, SessionState};
pub use store::{Collection, DocumentStore, StoreError};
pub use validation::FieldError;
