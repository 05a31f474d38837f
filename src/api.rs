//! HTTP API client.
//!
//! The server owns notification state. This module covers the three calls
//! the subsystem makes against it:
//!
//! - `GET  /api/notifications?user_id=&user_role=`  list for a binding
//! - `PUT  /api/notifications/{id}/read`            acknowledge a read
//! - `POST /broadcasting/auth`                      sign a private channel
//!
//! All requests carry the session token as a Bearer header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::notification::{ConnectionBinding, Notification, NotificationId};

/// Server-side notification list and read acknowledgements.
#[async_trait]
pub trait NotificationApi: Send + Sync + std::fmt::Debug {
    /// Fetch the authoritative notification list for `binding`.
    async fn list_notifications(&self, binding: &ConnectionBinding) -> Result<Vec<Notification>>;

    /// Acknowledge that `id` has been read.
    async fn mark_as_read(&self, id: NotificationId) -> Result<()>;
}

/// Signs private channel subscriptions for the push transport.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync + std::fmt::Debug {
    /// Return the auth signature for `channel_name` on socket `socket_id`.
    async fn authorize(&self, socket_id: &str, channel_name: &str) -> Result<String>;
}

/// List responses come back bare or wrapped in `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<Notification>),
    Wrapped { data: Vec<Notification> },
}

impl ListResponse {
    fn into_vec(self) -> Vec<Notification> {
        match self {
            Self::Bare(list) | Self::Wrapped { data: list } => list,
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    socket_id: &'a str,
    channel_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    auth: String,
}

/// API client for the notification server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    server_url: String,
    token: String,
}

impl ApiClient {
    /// Creates a new API client.
    ///
    /// # Arguments
    ///
    /// * `server_url` - Base URL of the server (no trailing slash needed)
    /// * `token` - Session token sent as a Bearer credential
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, server_url, token))
    }

    /// Creates an API client with a pre-configured HTTP client.
    pub fn with_client(
        client: Client,
        server_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let server_url: String = server_url.into();
        Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

#[async_trait]
impl NotificationApi for ApiClient {
    async fn list_notifications(&self, binding: &ConnectionBinding) -> Result<Vec<Notification>> {
        let url = format!("{}/api/notifications", self.server_url);
        let user_id = binding.user_id.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("user_id", user_id.as_str()), ("user_role", binding.user_role.as_str())])
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .send()
            .await
            .context("Notification list request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list notifications: {}", response.status());
        }

        let list: ListResponse = response
            .json()
            .await
            .context("Failed to parse notification list")?;
        let list = list.into_vec();
        log::debug!("[Api] Fetched {} notifications for {}", list.len(), binding);
        Ok(list)
    }

    async fn mark_as_read(&self, id: NotificationId) -> Result<()> {
        let url = format!("{}/api/notifications/{}/read", self.server_url, id);

        let response = self
            .client
            .put(&url)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .send()
            .await
            .context("Mark-as-read request failed")?;

        if response.status().is_success() {
            log::debug!("[Api] Acknowledged read of {}", id);
            Ok(())
        } else {
            anyhow::bail!("Failed to mark {} as read: {}", id, response.status())
        }
    }
}

#[async_trait]
impl ChannelAuthorizer for ApiClient {
    async fn authorize(&self, socket_id: &str, channel_name: &str) -> Result<String> {
        let url = format!("{}/broadcasting/auth", self.server_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .json(&AuthRequest {
                socket_id,
                channel_name,
            })
            .send()
            .await
            .context("Channel auth request failed")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Channel auth rejected for {}: {}",
                channel_name,
                response.status()
            );
        }

        let body: AuthResponse = response
            .json()
            .await
            .context("Failed to parse channel auth response")?;
        Ok(body.auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), "sess_abc").unwrap()
    }

    #[tokio::test]
    async fn test_list_notifications_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/notifications"))
            .and(query_param("user_id", "42"))
            .and(query_param("user_role", "creator"))
            .and(header("Authorization", "Bearer sess_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1, "event_type": "NEW_BOOKING", "is_read": false },
                { "id": 2, "event_type": "message", "is_read": true }
            ])))
            .mount(&server)
            .await;

        let list = client(&server)
            .list_notifications(&ConnectionBinding::new(42, "creator"))
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, NotificationId(1));
    }

    #[tokio::test]
    async fn test_list_notifications_wrapped_in_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/notifications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": 3, "event_type": "NEW_REVIEW" }]
            })))
            .mount(&server)
            .await;

        let list = client(&server)
            .list_notifications(&ConnectionBinding::new(7, "brand"))
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].event_type, "NEW_REVIEW");
    }

    #[tokio::test]
    async fn test_list_notifications_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/notifications"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client(&server)
            .list_notifications(&ConnectionBinding::new(7, "brand"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mark_as_read_puts_to_id_path() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/notifications/5/read"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).mark_as_read(NotificationId(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_as_read_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).mark_as_read(NotificationId(5)).await.is_err());
    }

    #[tokio::test]
    async fn test_authorize_returns_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/broadcasting/auth"))
            .and(body_json(serde_json::json!({
                "socket_id": "123.456",
                "channel_name": "private-notifications.creator.42"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "auth": "key:sig" })),
            )
            .mount(&server)
            .await;

        let auth = client(&server)
            .authorize("123.456", "private-notifications.creator.42")
            .await
            .unwrap();
        assert_eq!(auth, "key:sig");
    }

    #[tokio::test]
    async fn test_authorize_forbidden_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/broadcasting/auth"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = client(&server).authorize("1.2", "private-x").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let api = ApiClient::new("https://api.example.com/", "t").unwrap();
        assert_eq!(api.server_url(), "https://api.example.com");
    }
}
