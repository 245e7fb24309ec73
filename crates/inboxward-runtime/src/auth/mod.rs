//! OAuth credentials for the Gmail adapter.
//!
//! Credentials come from an authorized-user token file:
//!
//! ```json
//! {
//!   "token": "ya29...",
//!   "refresh_token": "1//0g...",
//!   "token_uri": "https://oauth2.googleapis.com/token",
//!   "client_id": "....apps.googleusercontent.com",
//!   "client_secret": "...",
//!   "scopes": ["https://www.googleapis.com/auth/gmail.modify"],
//!   "expiry": "2025-03-14T09:26:53.000Z"
//! }
//! ```
//!
//! Tokens are held as [`SecretString`] and never appear in `Debug` output.
//! An expired token is refreshed once at startup and written back. When there
//! is no usable token, [`GmailCredentials::authorize`] runs the browser
//! consent flow against the client secrets file and writes a new token file.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(feature = "gmail")]
mod consent;
#[cfg(feature = "gmail")]
mod pkce;

#[cfg(feature = "gmail")]
pub use consent::{run_consent, ClientSecrets, ConsentFlow};
#[cfg(feature = "gmail")]
pub use pkce::PkceChallenge;

/// Scopes the agent needs: message modification and filter settings.
pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.settings.basic",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Errors from loading or refreshing credentials. All are fatal at startup.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token file not found at {0}; authorize the account first")]
    MissingTokenFile(PathBuf),

    #[error("Failed to access token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse token file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Token file has no access token and no refresh token")]
    MissingAccessToken,

    #[error("Access token expired and no refresh token is available")]
    Expired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Client secrets file not found at {0}; download it from the Google Cloud console")]
    MissingClientSecrets(PathBuf),

    #[error("Invalid client secrets: {0}")]
    InvalidClientSecrets(String),

    #[error("Consent listener failed: {0}")]
    Listener(#[source] std::io::Error),

    #[error("Authorization was denied: {0}")]
    ConsentDenied(String),

    #[error("Authorization redirect carried an unexpected state")]
    StateMismatch,

    #[error("No authorization received within {0:?}")]
    ConsentTimedOut(std::time::Duration),

    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),
}

/// Token endpoint reply, for both code exchange and refresh.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// On-disk layout of the authorized-user file.
#[derive(Debug, Serialize, Deserialize)]
struct AuthorizedUserFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Loaded Gmail credentials.
pub struct GmailCredentials {
    path: PathBuf,
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    client_id: String,
    client_secret: Option<SecretString>,
    token_uri: String,
    scopes: Vec<String>,
    expiry: Option<DateTime<Utc>>,
}

impl fmt::Debug for GmailCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmailCredentials")
            .field("path", &self.path)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl GmailCredentials {
    /// Read credentials from a token file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(AuthError::MissingTokenFile(path));
        }

        let contents = fs::read_to_string(&path).map_err(|source| AuthError::Io {
            path: path.clone(),
            source,
        })?;
        let file: AuthorizedUserFile =
            serde_json::from_str(&contents).map_err(|source| AuthError::Parse {
                path: path.clone(),
                source,
            })?;

        if file.token.is_none() && file.refresh_token.is_none() {
            return Err(AuthError::MissingAccessToken);
        }

        Ok(Self {
            path,
            access_token: file.token.map(SecretString::from),
            refresh_token: file.refresh_token.map(SecretString::from),
            client_id: file.client_id,
            client_secret: file.client_secret.map(SecretString::from),
            token_uri: file.token_uri,
            scopes: file.scopes,
            expiry: file.expiry,
        })
    }

    /// Write the current state back to the token file.
    pub fn save(&self) -> Result<(), AuthError> {
        let file = AuthorizedUserFile {
            token: self.access_token.as_ref().map(|t| t.expose_secret().to_string()),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self
                .client_secret
                .as_ref()
                .map(|s| s.expose_secret().to_string()),
            scopes: self.scopes.clone(),
            expiry: self.expiry,
        };

        let io_error = |source| AuthError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| AuthError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(io_error)
    }

    /// Expired, or missing an access token. Uses a 60 second buffer.
    pub fn needs_refresh(&self) -> bool {
        self.access_token.is_none()
            || self
                .expiry
                .is_some_and(|exp| Utc::now() + ChronoDuration::seconds(60) >= exp)
    }

    /// Whether a refresh token is on hand.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// The bearer token, for the `Authorization` header only.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_ref().map(|t| t.expose_secret())
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Exchange the refresh token for a new access token.
    #[cfg(feature = "gmail")]
    pub async fn refresh(&mut self, timeout: std::time::Duration) -> Result<(), AuthError> {
        let refresh_token = self.refresh_token.as_ref().ok_or(AuthError::Expired)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::RefreshFailed(format!("HTTP client error: {}", e)))?;

        let mut params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.client_id.clone()),
            ("refresh_token", refresh_token.expose_secret().to_string()),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.expose_secret().to_string()));
        }

        let response = client
            .post(&self.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::RefreshFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        self.access_token = Some(SecretString::from(body.access_token));
        if let Some(rotated) = body.refresh_token {
            self.refresh_token = Some(SecretString::from(rotated));
        }
        self.expiry = body
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        Ok(())
    }

    /// Credentials with a usable access token.
    ///
    /// Loads the token file and refreshes it when expired. A missing,
    /// unreadable or unrefreshable token falls through to the consent flow,
    /// which needs the client secrets file. A refreshed token is written
    /// back; failing to write it is only logged.
    #[cfg(feature = "gmail")]
    pub async fn authorize(config: &crate::config::GmailConfig) -> Result<Self, AuthError> {
        match Self::load(&config.token_file) {
            Ok(mut credentials) => {
                if !credentials.needs_refresh() {
                    return Ok(credentials);
                }
                if credentials.can_refresh() {
                    tracing::info!("Refreshing expired access token");
                    match credentials.refresh(config.timeout).await {
                        Ok(()) => {
                            if let Err(e) = credentials.save() {
                                tracing::warn!(error = %e, "Failed to save refreshed token");
                            }
                            return Ok(credentials);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Token refresh failed, asking for consent again");
                        }
                    }
                } else {
                    tracing::info!("Access token expired and cannot be refreshed");
                }
            }
            Err(
                e @ (AuthError::MissingTokenFile(_)
                | AuthError::Parse { .. }
                | AuthError::MissingAccessToken),
            ) => {
                tracing::info!(reason = %e, "No usable token, starting consent flow");
            }
            Err(e) => return Err(e),
        }

        run_consent(
            &config.credentials_file,
            &config.token_file,
            config.timeout,
            config.consent_timeout,
        )
        .await
    }
}
