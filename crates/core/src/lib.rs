//! FeatureSync core library.
//!
//! This crate reconciles an authoritative JSON dataset with a hosted feature
//! layer: it resolves a credential into a token, indexes the layer's features
//! by name, and pushes one attribute update per matched source record. The
//! outcome of every record is collected into a [`ReconciliationReport`].

pub mod auth;
pub mod config;
pub mod errors;
pub mod feature_service;
pub mod mapping;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod source;

// Re-exports for convenience.
pub use auth::Credential;
pub use config::AppConfig;
pub use mapping::{FieldMapper, FieldMapping};
pub use models::{Outcome, ReconciliationReport, RunSummary};
pub use reconcile::{reconcile, reconcile_with_summary, ReconciliationConfig};
