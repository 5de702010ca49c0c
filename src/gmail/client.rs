//! Gmail REST client

use async_trait::async_trait;
use lettre::message::Mailbox;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;
use crate::Result;
use crate::auth::TokenSource;
use crate::error::Error;
use super::mime::{Payload, build_raw, parse_mailbox};
use super::{GmailApi, MailMessage, MailThread, OutgoingMessage, ThreadSummary};

/// Gmail API client for the authenticated user
#[derive(Clone)]
pub struct GmailClient {
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    client: Client,
    sender: Arc<OnceCell<Mailbox>>,
}

impl GmailClient {
    /// `base_url` is the `users/me` root, e.g. `https://gmail.googleapis.com/gmail/v1/users/me`
    pub fn new(base_url: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            client: Client::new(),
            sender: Arc::new(OnceCell::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// URL of one message or thread; the id comes from the model
    fn resource_url(&self, collection: &str, id: &str) -> Result<Url> {
        let well_formed = !id.is_empty()
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(Error::Tool(format!("Invalid Gmail id: '{}'", id)));
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Tool(format!("Invalid Gmail base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Tool(format!("Gmail base URL cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .push(collection)
            .push(id);
        Ok(url)
    }

    /// The authenticated account's address, looked up once
    async fn sender(&self) -> Result<Mailbox> {
        let sender = self.sender
            .get_or_try_init(|| async {
                let request = self.client.get(self.url("profile"));
                let profile: Profile = self.send_json(request, "profile lookup").await?;
                parse_mailbox(&profile.email_address)
            })
            .await?;
        Ok(sender.clone())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let token = self.tokens.access_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Error::Tool(format!("Gmail {} failed ({}): {}", what, status, error_text)));
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<IdRef>,
}

#[derive(Debug, Deserialize)]
struct ThreadList {
    #[serde(default)]
    threads: Vec<RawThreadRef>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawThreadRef {
    id: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Payload,
}

impl From<RawMessage> for MailMessage {
    fn from(raw: RawMessage) -> Self {
        let header = |name: &str| raw.payload.header(name).unwrap_or_default().to_string();
        Self {
            subject: header("Subject"),
            sender: header("From"),
            to: header("To"),
            cc: header("Cc"),
            date: header("Date"),
            body: raw.payload.text_body(),
            id: raw.id,
            thread_id: raw.thread_id,
            snippet: raw.snippet,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawThread {
    id: String,
    #[serde(default)]
    messages: Vec<RawThreadRef>,
}

#[async_trait]
impl GmailApi for GmailClient {
    async fn search_messages(&self, query: &str, max_results: u32) -> Result<Vec<MailMessage>> {
        let request = self.client
            .get(self.url("messages"))
            .query(&[("q", query.to_string()), ("maxResults", max_results.to_string())]);
        let list: MessageList = self.send_json(request, "message search").await?;

        let mut messages = Vec::with_capacity(list.messages.len());
        for entry in list.messages {
            messages.push(self.get_message(&entry.id).await?);
        }
        Ok(messages)
    }

    async fn search_threads(&self, query: &str, max_results: u32) -> Result<Vec<ThreadSummary>> {
        let request = self.client
            .get(self.url("threads"))
            .query(&[("q", query.to_string()), ("maxResults", max_results.to_string())]);
        let list: ThreadList = self.send_json(request, "thread search").await?;

        Ok(list.threads
            .into_iter()
            .map(|t| ThreadSummary { id: t.id, snippet: t.snippet })
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage> {
        let request = self.client
            .get(self.resource_url("messages", id)?)
            .query(&[("format", "full")]);
        let raw: RawMessage = self.send_json(request, "message fetch").await?;
        Ok(raw.into())
    }

    async fn get_thread(&self, id: &str) -> Result<MailThread> {
        let request = self.client
            .get(self.resource_url("threads", id)?)
            .query(&[("format", "minimal")]);
        let raw: RawThread = self.send_json(request, "thread fetch").await?;

        Ok(MailThread {
            id: raw.id,
            messages: raw.messages
                .into_iter()
                .map(|m| ThreadSummary { id: m.id, snippet: m.snippet })
                .collect(),
        })
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<String> {
        let raw = build_raw(&self.sender().await?, message)?;
        let request = self.client
            .post(self.url("messages/send"))
            .json(&json!({ "raw": raw }));
        let sent: IdRef = self.send_json(request, "send").await?;
        Ok(sent.id)
    }

    async fn create_draft(&self, message: &OutgoingMessage) -> Result<String> {
        let raw = build_raw(&self.sender().await?, message)?;
        let request = self.client
            .post(self.url("drafts"))
            .json(&json!({ "message": { "raw": raw } }));
        let draft: IdRef = self.send_json(request, "draft creation").await?;
        Ok(draft.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GmailClient {
        GmailClient::new(&format!("{}/gmail/v1/users/me/", server.uri()), Arc::new(StaticToken("tok")))
    }

    fn full_message(id: &str, subject: &str) -> serde_json::Value {
        json!({
            "id": id,
            "threadId": format!("t-{}", id),
            "snippet": "snip",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "Subject", "value": subject},
                    {"name": "From", "value": "Ann <ann@example.com>"}
                ],
                "body": {"data": URL_SAFE_NO_PAD.encode("body text")}
            }
        })
    }

    #[tokio::test]
    async fn test_search_messages_fetches_each_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "is:unread"))
            .and(query_param("maxResults", "2"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "m1", "threadId": "t-m1"}, {"id": "m2", "threadId": "t-m2"}]
            })))
            .mount(&server)
            .await;
        for (id, subject) in [("m1", "First"), ("m2", "Second")] {
            Mock::given(method("GET"))
                .and(path(format!("/gmail/v1/users/me/messages/{}", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(full_message(id, subject)))
                .mount(&server)
                .await;
        }

        let messages = client(&server).search_messages("is:unread", 2).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].subject, "First");
        assert_eq!(messages[1].thread_id, "t-m2");
        assert_eq!(messages[0].sender, "Ann <ann@example.com>");
        assert_eq!(messages[0].body, "body text");
    }

    #[tokio::test]
    async fn test_empty_search_has_no_messages_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
            .mount(&server)
            .await;

        let messages = client(&server).search_messages("from:nobody", 10).await.unwrap();
        assert!(messages.is_empty());
    }

    async fn mount_profile(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"emailAddress": "me@example.com"})))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn posted_raw(server: &MockServer, at: &str) -> String {
        let requests = server.received_requests().await.unwrap();
        let request = requests.iter().find(|r| r.url.path() == at).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let raw = body.pointer("/raw").or_else(|| body.pointer("/message/raw")).unwrap();
        String::from_utf8(URL_SAFE_NO_PAD.decode(raw.as_str().unwrap()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_send_posts_raw_message() {
        let server = MockServer::start().await;
        mount_profile(&server).await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sent-1"})))
            .expect(2)
            .mount(&server)
            .await;

        let message = OutgoingMessage {
            to: vec!["bob@example.com".to_string()],
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
            ..Default::default()
        };
        let gmail = client(&server);
        assert_eq!(gmail.send_message(&message).await.unwrap(), "sent-1");
        assert_eq!(gmail.send_message(&message).await.unwrap(), "sent-1");

        let raw = posted_raw(&server, "/gmail/v1/users/me/messages/send").await;
        assert!(raw.contains("From: me@example.com\r\n"));
        assert!(raw.contains("To: bob@example.com\r\n"));
    }

    #[tokio::test]
    async fn test_create_draft_wraps_message() {
        let server = MockServer::start().await;
        mount_profile(&server).await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/drafts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "d-9", "message": {"id": "m"}})))
            .mount(&server)
            .await;

        let message = OutgoingMessage {
            to: vec!["bob@example.com".to_string()],
            subject: "Draft".to_string(),
            body: "Later".to_string(),
            ..Default::default()
        };
        assert_eq!(client(&server).create_draft(&message).await.unwrap(), "d-9");

        let raw = posted_raw(&server, "/gmail/v1/users/me/drafts").await;
        assert!(raw.contains("Subject: Draft\r\n"));
        assert!(raw.contains("Later"));
    }

    #[tokio::test]
    async fn test_ids_cannot_leave_their_collection() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "x"})))
            .expect(0)
            .mount(&server)
            .await;

        let gmail = client(&server);
        for id in ["../drafts", "m1/attachments", "", "m1?format=raw"] {
            let err = gmail.get_message(id).await.unwrap_err();
            assert!(matches!(err, Error::Tool(ref msg) if msg.contains("Invalid Gmail id")), "{}", id);
        }
        assert!(gmail.get_thread("..").await.is_err());
    }

    #[tokio::test]
    async fn test_api_error_is_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/threads/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Requested entity was not found."))
            .mount(&server)
            .await;

        let err = client(&server).get_thread("missing").await.unwrap_err();
        assert!(matches!(err, Error::Tool(ref msg) if msg.contains("404")));
    }
}
