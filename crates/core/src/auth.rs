//! Credential resolution: pass a token through or exchange a username and
//! password for one.

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::config::AuthMode;
use crate::errors::AuthError;
use crate::models::ServiceFault;

/// ArcGIS Online token exchange endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://www.arcgis.com/sharing/generateToken";

/// Referer the issued token is bound to.
const TOKEN_REFERER: &str = "localhost";

/// Requested token lifetime in minutes.
const TOKEN_EXPIRATION_MINUTES: &str = "60";

/// How a run authenticates against the feature service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// A token that is already valid and used as-is.
    Token(String),
    /// An account exchanged for a token once per run.
    UsernamePassword { username: String, password: String },
}

impl Credential {
    pub fn mode(&self) -> AuthMode {
        match self {
            Self::Token(_) => AuthMode::Token,
            Self::UsernamePassword { .. } => AuthMode::Username,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
            Self::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    error: Option<ServiceFault>,
}

/// Turns a [`Credential`] into a bearer token.
#[derive(Clone)]
pub struct CredentialProvider {
    http: reqwest::Client,
    token_url: String,
}

impl CredentialProvider {
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }

    /// Resolve a credential into a token.
    ///
    /// A token credential is returned unchanged without any network call; a
    /// username/password credential costs exactly one exchange request.
    pub async fn resolve(&self, credential: &Credential) -> Result<String, AuthError> {
        match credential {
            Credential::Token(token) => {
                debug!("using caller-supplied token");
                Ok(token.clone())
            }
            Credential::UsernamePassword { username, password } => {
                self.generate_token(username, password).await
            }
        }
    }

    #[instrument(skip(self, password), fields(token_url = %self.token_url))]
    async fn generate_token(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let resp = self
            .http
            .get(&self.token_url)
            .query(&[
                ("username", username),
                ("password", password),
                ("f", "json"),
                ("referer", TOKEN_REFERER),
                ("expiration", TOKEN_EXPIRATION_MINUTES),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| AuthError::Parse(e.to_string()))?;

        match parsed {
            TokenResponse {
                token: Some(token), ..
            } => {
                info!("token issued");
                Ok(token)
            }
            TokenResponse {
                error: Some(fault), ..
            } => Err(AuthError::Rejected {
                code: fault.code,
                message: fault.describe(),
            }),
            _ => Err(AuthError::MissingToken),
        }
    }
}
