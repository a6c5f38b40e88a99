//! Error types for the FeatureSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type. [`ReconcileError`] is what a reconciliation run returns: every
//! variant of it aborts the run.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

// ---------------------------------------------------------------------------
// Run-level error
// ---------------------------------------------------------------------------

/// Fatal errors of a reconciliation run. No partial report is produced.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The shared HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The update call for a matched record failed below the application level.
    #[error("update of '{name}' failed: {source}")]
    Update {
        name: String,
        #[source]
        source: UpdateError,
    },

    /// The field mapper could not produce attributes for a record.
    #[error("mapping of '{name}' failed: {source}")]
    Mapping {
        name: String,
        #[source]
        source: MappingError,
    },
}

// ---------------------------------------------------------------------------
// Credential errors
// ---------------------------------------------------------------------------

/// Errors from resolving a credential into a token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint returned a non-success status code.
    #[error("token endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// The token endpoint answered with an error object.
    #[error("token request rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The response carried no `token` field.
    #[error("token response did not contain a token")]
    MissingToken,

    /// The response body was not valid JSON.
    #[error("token response parse error: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

/// Errors from loading the source dataset.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP-level transport error.
    #[error("source request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The source URL returned a non-success status code.
    #[error("source returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// The body was not valid JSON.
    #[error("source body is not valid JSON: {0}")]
    Parse(String),

    /// The body was valid JSON but not an array of records.
    #[error("source body is not a JSON array of records")]
    NotAnArray,

    /// A record has no string value under the natural-key field.
    #[error("source record {index} has no string '{field}' field")]
    MissingName { index: usize, field: String },
}

// ---------------------------------------------------------------------------
// Remote index errors
// ---------------------------------------------------------------------------

/// Errors from querying the feature service for its current features.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP-level transport error.
    #[error("feature query failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The query endpoint returned a non-success status code.
    #[error("feature query returned HTTP {status}")]
    Status { status: u16 },

    /// The service answered with an error object (e.g. an invalid token).
    #[error("feature service error (code {code}): {message}")]
    Service { code: i64, message: String },

    /// The response had no `features` array.
    #[error("feature query response has no 'features' array")]
    MissingFeatures,

    /// The body was not valid JSON.
    #[error("feature query response parse error: {0}")]
    Parse(String),

    /// Two remote features share a name and strict duplicate checking is on.
    #[error("duplicate remote feature name '{name}'")]
    DuplicateName { name: String },
}

// ---------------------------------------------------------------------------
// Update errors
// ---------------------------------------------------------------------------

/// Transport-level failures of a single `applyEdits` call.
///
/// An `error` object inside a successful response is not an `UpdateError`;
/// it is classified into the report's `errors` bucket instead.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// HTTP-level transport error.
    #[error("applyEdits request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The edit endpoint returned a non-success status code.
    #[error("applyEdits returned HTTP {status}")]
    Status { status: u16 },
}

// ---------------------------------------------------------------------------
// Mapping errors
// ---------------------------------------------------------------------------

/// Errors from turning a source record into remote attributes.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A mapped source field is absent from the record.
    #[error("source field '{0}' is missing")]
    MissingField(String),

    /// A mapped source field holds an object or array.
    #[error("source field '{0}' is not a scalar value")]
    NotScalar(String),

    /// A mapping targets the attribute that identifies the remote feature.
    #[error("mapping may not target the reserved attribute '{0}'")]
    ReservedField(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// Errors from the run-summary notification channel.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Slack webhook delivery failed.
    #[error("Slack notification failed: {0}")]
    SlackError(String),

    /// HTTP error during notification delivery.
    #[error("notification HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}
