//! Gmail REST adapter.
//!
//! Talks to `gmail/v1/users/me` with a bearer token. Each request is a
//! single attempt bounded by the configured timeout.

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Mailbox, MailboxError, MessageDetails, MessageRef};
use crate::auth::GmailCredentials;
use crate::config::GmailConfig;
use inboxward_core::{extract_email_address, SafetyFilter};

const INBOX_LABEL: &str = "INBOX";

/// Gmail mailbox for the authorized user.
pub struct GmailMailbox {
    base_url: String,
    access_token: SecretString,
    timeout: Duration,
    client: reqwest::Client,
    safety: SafetyFilter,

    /// Lower-cased label name -> label id
    label_ids: Cache<String, String>,
}

impl fmt::Debug for GmailMailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmailMailbox")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

impl GmailMailbox {
    /// Build the adapter. `safety` guards filter creation.
    pub fn new(
        config: &GmailConfig,
        credentials: &GmailCredentials,
        safety: SafetyFilter,
    ) -> Result<Self, MailboxError> {
        let access_token = credentials
            .access_token()
            .map(|t| SecretString::from(t.to_string()))
            .ok_or_else(|| MailboxError::Rejected("no access token available".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailboxError::HttpError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
            timeout: config.timeout,
            client,
            safety,
            label_ids: Cache::new(1_000),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> MailboxError {
        if e.is_timeout() {
            MailboxError::HttpError(format!("timeout after {:?}", self.timeout))
        } else {
            MailboxError::HttpError(e.to_string())
        }
    }

    /// Send a request and decode the JSON body. `Ok(None)` on 404.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, MailboxError> {
        let response = request
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = match response.json::<GoogleErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(MailboxError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| MailboxError::ParseError(e.to_string()))
    }

    async fn send_required<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, MailboxError> {
        self.send(request).await?.ok_or_else(|| MailboxError::ApiError {
            status: 404,
            message: format!("{} not found", what),
        })
    }

    /// Resolve a label id by name, case-insensitively, creating it if absent.
    async fn label_id(&self, label_name: &str) -> Result<String, MailboxError> {
        let key = label_name.to_lowercase();
        if let Some(id) = self.label_ids.get(&key).await {
            return Ok(id);
        }

        let listed: ListLabelsResponse = self
            .send_required(self.client.get(self.url("labels")), "labels")
            .await
            .map_err(|e| label_error(label_name, e))?;

        let mut found = None;
        for label in listed.labels {
            let name = label.name.to_lowercase();
            if name == key {
                found = Some(label.id.clone());
            }
            self.label_ids.insert(name, label.id).await;
        }
        if let Some(id) = found {
            return Ok(id);
        }

        let created: Label = self
            .send_required(
                self.client
                    .post(self.url("labels"))
                    .json(&create_label_body(label_name)),
                "label",
            )
            .await
            .map_err(|e| label_error(label_name, e))?;

        info!(label = %created.name, id = %created.id, "Created label");
        self.label_ids.insert(key, created.id.clone()).await;
        Ok(created.id)
    }

    async fn modify(&self, id: &str, body: JsonValue) -> Result<(), MailboxError> {
        self.send_required::<JsonValue>(
            self.client
                .post(self.url(&format!("messages/{}/modify", id)))
                .json(&body),
            "message",
        )
        .await
        .map(|_| ())
    }
}

/// `messages.modify` body that applies one label.
pub(crate) fn add_label_body(label_id: &str) -> JsonValue {
    json!({ "addLabelIds": [label_id], "removeLabelIds": [] })
}

/// `messages.modify` body that moves a message out of the inbox.
pub(crate) fn archive_body() -> JsonValue {
    json!({ "removeLabelIds": [INBOX_LABEL] })
}

/// `settings.filters.create` body: label and skip the inbox for one sender.
pub(crate) fn filter_body(sender: &str, label_id: &str) -> JsonValue {
    json!({
        "criteria": { "from": sender },
        "action": {
            "addLabelIds": [label_id],
            "removeLabelIds": [INBOX_LABEL],
        },
    })
}

pub(crate) fn create_label_body(name: &str) -> JsonValue {
    json!({ "name": name })
}

fn label_error(label: &str, e: MailboxError) -> MailboxError {
    MailboxError::LabelError {
        label: label.to_string(),
        reason: e.to_string(),
    }
}

/// Build message details from a `messages.get` response.
///
/// Missing headers default to subject "No Subject" and sender "Unknown".
pub(crate) fn details_from_json(id: &str, message: &JsonValue) -> MessageDetails {
    let header = |name: &str| {
        message
            .get("payload")
            .and_then(|p| p.get("headers"))
            .and_then(JsonValue::as_array)
            .and_then(|headers| {
                headers.iter().find(|h| {
                    h.get("name")
                        .and_then(JsonValue::as_str)
                        .is_some_and(|n| n.eq_ignore_ascii_case(name))
                })
            })
            .and_then(|h| h.get("value"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    };

    let subject = header("Subject").unwrap_or_else(|| "No Subject".to_string());
    let sender = header("From").unwrap_or_else(|| "Unknown".to_string());
    let email_address = extract_email_address(&sender);

    MessageDetails {
        id: id.to_string(),
        subject,
        email_address,
        sender,
        snippet: message
            .get("snippet")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        thread_id: message
            .get("threadId")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn list_messages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        let max = max_results.to_string();
        let listed: Option<ListMessagesResponse> = self
            .send(
                self.client
                    .get(self.url("messages"))
                    .query(&[("q", query), ("maxResults", max.as_str())]),
            )
            .await?;

        let messages = listed.map(|l| l.messages).unwrap_or_default();
        debug!(query, count = messages.len(), "Listed messages");
        Ok(messages)
    }

    async fn get_message_details(&self, id: &str) -> Result<Option<MessageDetails>, MailboxError> {
        let message: Option<JsonValue> = self
            .send(self.client.get(self.url(&format!("messages/{}", id))).query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
            ]))
            .await?;

        Ok(message.map(|m| details_from_json(id, &m)))
    }

    async fn add_label(&self, id: &str, label_name: &str) -> Result<(), MailboxError> {
        let label_id = self.label_id(label_name).await?;
        self.modify(id, add_label_body(&label_id)).await?;
        info!(message_id = id, label = label_name, "Added label");
        Ok(())
    }

    async fn archive_message(&self, id: &str) -> Result<(), MailboxError> {
        self.modify(id, archive_body()).await?;
        info!(message_id = id, "Archived message");
        Ok(())
    }

    async fn create_filter(&self, sender: &str, label_name: &str) -> Result<(), MailboxError> {
        if let Some(matched) = self.safety.check_sender(sender) {
            warn!(sender, rule = matched.rule(), "Refusing filter for protected sender");
            return Err(MailboxError::ProtectedSender(sender.to_string()));
        }

        let label_id = self.label_id(label_name).await?;
        self.send_required::<JsonValue>(
            self.client
                .post(self.url("settings/filters"))
                .json(&filter_body(sender, &label_id)),
            "filter",
        )
        .await?;
        info!(sender, label = label_name, "Created filter");
        Ok(())
    }

    fn name(&self) -> &str {
        "gmail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordedRequest, StubServer};
    use std::fs;

    fn mailbox_at(base_url: &str) -> GmailMailbox {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, r#"{"token": "abc"}"#).unwrap();
        let credentials = GmailCredentials::load(&path).unwrap();
        let config = GmailConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            ..GmailConfig::default()
        };
        GmailMailbox::new(&config, &credentials, SafetyFilter::default()).unwrap()
    }

    fn mailbox() -> GmailMailbox {
        mailbox_at(&GmailConfig::default().base_url)
    }

    /// Minimal Gmail: one user label, creation, modify, filters, a message list.
    fn gmail_api(request: &RecordedRequest) -> (u16, String) {
        match (request.method.as_str(), request.path()) {
            ("GET", "/labels") => (
                200,
                json!({
                    "labels": [
                        { "id": "INBOX", "name": "INBOX", "type": "system" },
                        { "id": "Label_7", "name": "AUTO/Newsletter", "type": "user" }
                    ]
                })
                .to_string(),
            ),
            ("POST", "/labels") => {
                let name = request.json()["name"].as_str().unwrap_or_default().to_string();
                (200, json!({ "id": "Label_9", "name": name }).to_string())
            }
            ("POST", path) if path.ends_with("/modify") => (200, "{}".to_string()),
            ("POST", "/settings/filters") => (200, json!({ "id": "filter_1" }).to_string()),
            ("GET", "/messages") => (
                200,
                json!({ "messages": [{ "id": "m1", "threadId": "t1" }] }).to_string(),
            ),
            _ => (
                404,
                json!({ "error": { "code": 404, "message": "Not Found" } }).to_string(),
            ),
        }
    }

    fn modify_bodies(server: &StubServer) -> Vec<JsonValue> {
        server
            .requests()
            .iter()
            .filter(|r| r.path().ends_with("/modify"))
            .map(RecordedRequest::json)
            .collect()
    }

    #[test]
    fn test_request_bodies() {
        assert_eq!(
            add_label_body("Label_7"),
            json!({ "addLabelIds": ["Label_7"], "removeLabelIds": [] })
        );
        assert_eq!(archive_body(), json!({ "removeLabelIds": ["INBOX"] }));
        assert_eq!(
            filter_body("news@marketing.com", "Label_7"),
            json!({
                "criteria": { "from": "news@marketing.com" },
                "action": { "addLabelIds": ["Label_7"], "removeLabelIds": ["INBOX"] }
            })
        );
        assert_eq!(create_label_body("AUTO/Promotion"), json!({ "name": "AUTO/Promotion" }));
    }

    #[tokio::test]
    async fn test_label_lookup_is_case_insensitive_and_cached() {
        let server = StubServer::start(gmail_api).await;
        let mailbox = mailbox_at(&server.base_url);

        mailbox.add_label("m1", "AUTO/Newsletter").await.unwrap();
        mailbox.add_label("m2", "auto/newsletter").await.unwrap();

        assert_eq!(server.count("GET", "/labels"), 1);
        assert_eq!(server.count("POST", "/labels"), 0);

        let bodies = modify_bodies(&server);
        assert_eq!(bodies.len(), 2);
        for body in bodies {
            assert_eq!(body, add_label_body("Label_7"));
        }
        assert_eq!(server.count("POST", "/messages/m1/modify"), 1);
        assert_eq!(server.count("POST", "/messages/m2/modify"), 1);
    }

    #[tokio::test]
    async fn test_missing_label_created_once() {
        let server = StubServer::start(gmail_api).await;
        let mailbox = mailbox_at(&server.base_url);

        mailbox.add_label("m1", "AUTO/Promotion").await.unwrap();
        mailbox.add_label("m2", "AUTO/Promotion").await.unwrap();

        assert_eq!(server.count("GET", "/labels"), 1);
        assert_eq!(server.count("POST", "/labels"), 1);

        let created: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| r.method == "POST" && r.path() == "/labels")
            .collect();
        assert_eq!(created[0].json(), create_label_body("AUTO/Promotion"));
        assert!(modify_bodies(&server)
            .iter()
            .all(|body| *body == add_label_body("Label_9")));
    }

    #[tokio::test]
    async fn test_archive_removes_inbox() {
        let server = StubServer::start(gmail_api).await;
        let mailbox = mailbox_at(&server.base_url);

        mailbox.archive_message("m1").await.unwrap();

        assert_eq!(server.count("POST", "/messages/m1/modify"), 1);
        assert_eq!(modify_bodies(&server), vec![archive_body()]);
        assert_eq!(server.count("GET", "/labels"), 0);
    }

    #[tokio::test]
    async fn test_create_filter_sends_criteria_and_action() {
        let server = StubServer::start(gmail_api).await;
        let mailbox = mailbox_at(&server.base_url);

        mailbox
            .create_filter("news@marketing.com", "AUTO/Newsletter")
            .await
            .unwrap();

        let filters: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| r.path() == "/settings/filters")
            .collect();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].json(), filter_body("news@marketing.com", "Label_7"));
    }

    #[tokio::test]
    async fn test_list_and_missing_message() {
        let server = StubServer::start(gmail_api).await;
        let mailbox = mailbox_at(&server.base_url);

        let listed = mailbox.list_messages("is:unread", 5).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "m1");

        let requests = server.requests();
        let list_request = &requests[0];
        assert!(list_request.target.contains("maxResults=5"));
        assert!(list_request.target.contains("q=is%3Aunread"));

        assert!(mailbox.get_message_details("gone").await.unwrap().is_none());
    }

    #[test]
    fn test_details_from_metadata() {
        let message = json!({
            "id": "18c2",
            "threadId": "18c1",
            "snippet": "Here are the top stories",
            "payload": {
                "headers": [
                    { "name": "From", "value": "Newsletter <news@marketing.com>" },
                    { "name": "Subject", "value": "Weekly Newsletter" }
                ]
            }
        });

        let details = details_from_json("18c2", &message);
        assert_eq!(details.subject, "Weekly Newsletter");
        assert_eq!(details.sender, "Newsletter <news@marketing.com>");
        assert_eq!(details.email_address, "news@marketing.com");
        assert_eq!(details.snippet, "Here are the top stories");
        assert_eq!(details.thread_id, "18c1");
    }

    #[test]
    fn test_details_defaults() {
        let details = details_from_json("x", &json!({ "payload": { "headers": [] } }));
        assert_eq!(details.subject, "No Subject");
        assert_eq!(details.sender, "Unknown");
        assert_eq!(details.email_address, "Unknown");
        assert_eq!(details.snippet, "");
    }

    #[test]
    fn test_header_names_case_insensitive() {
        let message = json!({
            "payload": { "headers": [{ "name": "subject", "value": "lower" }] }
        });
        assert_eq!(details_from_json("x", &message).subject, "lower");
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let debug_output = format!("{:?}", mailbox());
        assert!(!debug_output.contains("abc"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_filter_for_protected_domain_refused() {
        let result = mailbox()
            .create_filter("alerts@chase.com", "AUTO/Promotion")
            .await;
        assert!(matches!(result, Err(MailboxError::ProtectedSender(_))));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = GmailConfig {
            base_url: "https://example.test/gmail/v1/users/me/".to_string(),
            ..GmailConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, r#"{"token": "abc"}"#).unwrap();
        let credentials = GmailCredentials::load(&path).unwrap();
        let mailbox = GmailMailbox::new(&config, &credentials, SafetyFilter::default()).unwrap();
        assert_eq!(
            mailbox.url("labels"),
            "https://example.test/gmail/v1/users/me/labels"
        );
    }
}
