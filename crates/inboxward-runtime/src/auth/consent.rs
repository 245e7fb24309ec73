//! Installed-app consent flow.
//!
//! Used when there is no usable token. The user approves access in a
//! browser, Google redirects to a loopback listener with an authorization
//! code, and the code is exchanged (with PKCE) for tokens that are written
//! to the token file. The client secrets file is the one downloaded from the
//! Google Cloud console for a "Desktop app" OAuth client.

use chrono::{Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use super::pkce::{random_token, PkceChallenge};
use super::{AuthError, GmailCredentials, TokenResponse, DEFAULT_TOKEN_URI, GMAIL_SCOPES};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Largest redirect request we are willing to read.
const MAX_REQUEST_BYTES: usize = 16 * 1024;

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<RawClientSecrets>,
    web: Option<RawClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct RawClientSecrets {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// OAuth client registration.
pub struct ClientSecrets {
    pub client_id: String,
    client_secret: Option<SecretString>,
    pub auth_uri: String,
    pub token_uri: String,
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ClientSecrets {
    /// Read a client secrets file. A missing file is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AuthError::MissingClientSecrets(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents).map_err(|e| match e {
            AuthError::Parse { source, .. } => AuthError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    fn from_json(contents: &str) -> Result<Self, AuthError> {
        let file: ClientSecretsFile =
            serde_json::from_str(contents).map_err(|source| AuthError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        let raw = file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidClientSecrets("expected an \"installed\" or \"web\" client".to_string())
        })?;

        Ok(Self {
            client_id: raw.client_id,
            client_secret: raw.client_secret.map(SecretString::from),
            auth_uri: raw.auth_uri.unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: raw.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }
}

/// One consent attempt: PKCE pair, CSRF state and redirect target.
pub struct ConsentFlow {
    secrets: ClientSecrets,
    pkce: PkceChallenge,
    state: String,
    redirect_uri: String,
}

impl ConsentFlow {
    pub fn new(secrets: ClientSecrets, redirect_uri: impl Into<String>) -> Self {
        Self {
            secrets,
            pkce: PkceChallenge::generate(),
            state: random_token(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// The URL the user opens to approve access.
    pub fn authorization_url(&self) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.secrets.auth_uri)
            .map_err(|e| AuthError::InvalidClientSecrets(format!("auth_uri: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &GMAIL_SCOPES.join(" "))
            .append_pair("state", &self.state)
            .append_pair("code_challenge", self.pkce.challenge())
            .append_pair("code_challenge_method", self.pkce.method())
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url)
    }

    /// Trade an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<TokenResponse, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ExchangeFailed(format!("HTTP client error: {}", e)))?;

        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("client_id", self.secrets.client_id.clone()),
            ("code_verifier", self.pkce.verifier().to_string()),
        ];
        if let Some(secret) = &self.secrets.client_secret {
            params.push(("client_secret", secret.expose_secret().to_string()));
        }

        let response = client
            .post(&self.secrets.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::ExchangeFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))
    }

    /// Credentials bound to `token_file`, built from an exchange response.
    pub fn into_credentials(self, token_file: &Path, response: TokenResponse) -> GmailCredentials {
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => GMAIL_SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        GmailCredentials {
            path: token_file.to_path_buf(),
            access_token: Some(SecretString::from(response.access_token)),
            refresh_token: response.refresh_token.map(SecretString::from),
            client_id: self.secrets.client_id,
            client_secret: self.secrets.client_secret,
            token_uri: self.secrets.token_uri,
            scopes,
            expiry: response
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

/// Pull the authorization code out of a redirect request line.
///
/// `Ok(None)` for requests that are not the redirect (e.g. `/favicon.ico`).
pub(crate) fn parse_redirect(
    request_line: &str,
    expected_state: &str,
) -> Result<Option<String>, AuthError> {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return Ok(None);
    };
    let Ok(url) = Url::parse("http://localhost").and_then(|base| base.join(target)) else {
        return Ok(None);
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AuthError::ConsentDenied(value.into_owned())),
            _ => {}
        }
    }

    match code {
        None => Ok(None),
        Some(_) if state.as_deref() != Some(expected_state) => Err(AuthError::StateMismatch),
        Some(code) => Ok(Some(code)),
    }
}

async fn read_request_line(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < MAX_REQUEST_BYTES {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&buf);
    Ok(text.lines().next().unwrap_or_default().to_string())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Failed to answer consent redirect");
    }
    let _ = stream.shutdown().await;
}

/// Wait on `listener` until the browser delivers the redirect.
pub(crate) async fn receive_code(
    listener: &TcpListener,
    expected_state: &str,
) -> Result<String, AuthError> {
    loop {
        let (mut stream, _) = listener.accept().await.map_err(AuthError::Listener)?;
        let line = match read_request_line(&mut stream).await {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Dropped connection on consent listener");
                continue;
            }
        };

        match parse_redirect(&line, expected_state) {
            Ok(Some(code)) => {
                respond(
                    &mut stream,
                    "200 OK",
                    "<html><body>Authorization complete. You can close this window.</body></html>",
                )
                .await;
                return Ok(code);
            }
            Ok(None) => respond(&mut stream, "404 Not Found", "").await,
            Err(e) => {
                respond(
                    &mut stream,
                    "400 Bad Request",
                    "<html><body>Authorization failed. Check the terminal.</body></html>",
                )
                .await;
                return Err(e);
            }
        }
    }
}

/// Run the full consent flow and write the token file.
pub async fn run_consent(
    credentials_file: &Path,
    token_file: &Path,
    timeout: Duration,
    consent_timeout: Duration,
) -> Result<GmailCredentials, AuthError> {
    let secrets = ClientSecrets::load(credentials_file)?;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(AuthError::Listener)?;
    let port = listener.local_addr().map_err(AuthError::Listener)?.port();

    let flow = ConsentFlow::new(secrets, format!("http://127.0.0.1:{}", port));
    let url = flow.authorization_url()?;

    info!(url = %url, "Open this URL in a browser to authorize Gmail access");
    if let Err(e) = opener::open(url.as_str()) {
        warn!(error = %e, "Could not open a browser; open the URL manually");
    }

    let code = tokio::time::timeout(consent_timeout, receive_code(&listener, flow.state()))
        .await
        .map_err(|_| AuthError::ConsentTimedOut(consent_timeout))??;

    let response = flow.exchange_code(&code, timeout).await?;
    let credentials = flow.into_credentials(token_file, response);
    credentials.save()?;
    info!(path = %token_file.display(), "Saved OAuth token");
    Ok(credentials)
}
