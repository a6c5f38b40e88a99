//! TOML-based configuration system for FeatureSync.
//!
//! Secrets (tokens, passwords, webhook URLs) are never stored inline: they are
//! `_env` fields that name environment variables. The actual values are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{Credential, DEFAULT_TOKEN_URL};
use crate::errors::ConfigError;
use crate::mapping::MappingConfig;
use crate::reconcile::ReconciliationConfig;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run behaviour and logging.
    #[serde(default)]
    pub run: RunConfig,

    /// Where the authoritative records come from.
    pub source: SourceConfig,

    /// The feature layer to reconcile against.
    pub feature_service: FeatureServiceConfig,

    /// How to obtain a token.
    pub auth: AuthConfig,

    /// Source field to remote attribute mapping.
    #[serde(default)]
    pub mapping: MappingConfig,

    /// Run summary notifications.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Client-wide request timeout. Transport defaults apply when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Abort the run when two remote features share a name.
    #[serde(default)]
    pub strict_duplicates: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            timeout_secs: None,
            strict_duplicates: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL returning a JSON array of records.
    pub url: String,

    /// Record field holding the natural key (default `name`).
    #[serde(default = "default_source_name_field")]
    pub name_field: String,
}

fn default_source_name_field() -> String {
    "name".into()
}

// ---------------------------------------------------------------------------
// Feature service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureServiceConfig {
    /// Feature layer URL, e.g. `https://services.arcgis.com/<org>/arcgis/rest/services/<name>/FeatureServer/0`.
    pub url: String,

    /// Remote attribute holding the natural key (default `pa_name`).
    #[serde(default = "default_remote_name_field")]
    pub name_field: String,

    /// Remote attribute holding the object id (default `OBJECTID`).
    #[serde(default = "default_object_id_field")]
    pub object_id_field: String,
}

fn default_remote_name_field() -> String {
    "pa_name".into()
}
fn default_object_id_field() -> String {
    "OBJECTID".into()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Which kind of credential a run uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// A ready-to-use token.
    #[default]
    Token,
    /// A username/password pair exchanged for a token.
    Username,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Username => write!(f, "username"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Environment variable holding the token (token mode).
    #[serde(default)]
    pub token_env: Option<String>,

    /// Account name (username mode).
    #[serde(default)]
    pub username: Option<String>,

    /// Environment variable holding the password (username mode).
    #[serde(default)]
    pub password_env: Option<String>,

    /// Token exchange endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.into()
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// When a run summary is posted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyOn {
    Always,
    /// Only when a record failed to match, was rejected, or was ambiguous.
    #[default]
    Problems,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationConfig {
    /// Environment variable holding the Slack incoming-webhook URL.
    #[serde(default)]
    pub slack_webhook_url_env: Option<String>,

    #[serde(default)]
    pub notify_on: NotifyOn,

    /// Resolved Slack webhook URL.
    #[serde(skip)]
    pub slack_webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// Missing variables log a warning but do not fail here; whether a secret
    /// is required depends on the auth mode and is checked by
    /// [`reconciliation_config`](Self::reconciliation_config).
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.auth.token_env {
            self.auth.token = resolve_optional_env(env_name, "auth.token_env");
        }

        if let Some(ref env_name) = self.auth.password_env {
            self.auth.password = resolve_optional_env(env_name, "auth.password_env");
        }

        if let Some(ref env_name) = self.notifications.slack_webhook_url_env {
            self.notifications.slack_webhook_url =
                resolve_optional_env(env_name, "notifications.slack_webhook_url_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("source.url", &self.source.url)?;
        validate_url("feature_service.url", &self.feature_service.url)?;

        for (field, value) in [
            ("source.name_field", &self.source.name_field),
            ("feature_service.name_field", &self.feature_service.name_field),
            (
                "feature_service.object_id_field",
                &self.feature_service.object_id_field,
            ),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "field name must not be empty".into(),
                });
            }
        }

        match self.auth.mode {
            AuthMode::Token => {
                if self.auth.token_env.is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: "auth.token_env".into(),
                        detail: "token mode requires token_env".into(),
                    });
                }
            }
            AuthMode::Username => {
                if self.auth.username.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::InvalidValue {
                        field: "auth.username".into(),
                        detail: "username mode requires a username".into(),
                    });
                }
                if self.auth.password_env.is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: "auth.password_env".into(),
                        detail: "username mode requires password_env".into(),
                    });
                }
                validate_url("auth.token_url", &self.auth.token_url)?;
            }
        }

        if self.run.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "run.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }

        if let Err(e) = self
            .mapping
            .check_reserved(&self.feature_service.object_id_field)
        {
            return Err(ConfigError::InvalidValue {
                field: "mapping.fields".into(),
                detail: e.to_string(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// The credential for the configured auth mode.
    ///
    /// Fails if the secret the mode needs was not resolved.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        match self.auth.mode {
            AuthMode::Token => {
                let token = self.auth.token.clone().ok_or_else(|| ConfigError::EnvVarMissing {
                    var: self.auth.token_env.clone().unwrap_or_default(),
                    field: "auth.token_env".into(),
                })?;
                Ok(Credential::Token(token))
            }
            AuthMode::Username => {
                let password =
                    self.auth
                        .password
                        .clone()
                        .ok_or_else(|| ConfigError::EnvVarMissing {
                            var: self.auth.password_env.clone().unwrap_or_default(),
                            field: "auth.password_env".into(),
                        })?;
                Ok(Credential::UsernamePassword {
                    username: self.auth.username.clone().unwrap_or_default(),
                    password,
                })
            }
        }
    }

    /// Build the runtime settings for one reconciliation run.
    pub fn reconciliation_config(&self) -> Result<ReconciliationConfig, ConfigError> {
        let mut config = ReconciliationConfig::new(
            self.source.url.clone(),
            self.feature_service.url.clone(),
            self.credential()?,
        );
        config.source_name_field = self.source.name_field.clone();
        config.remote_name_field = self.feature_service.name_field.clone();
        config.object_id_field = self.feature_service.object_id_field.clone();
        config.token_url = self.auth.token_url.clone();
        config.timeout = self.run.timeout_secs.map(Duration::from_secs);
        config.strict_duplicates = self.run.strict_duplicates;
        Ok(config)
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: "URL must not be empty".into(),
        });
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: "URL must start with http:// or https://".into(),
        });
    }
    Ok(())
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
