//! REST client for the backend API.
//!
//! # Example
//!
//! ```rust,no_run
//! use sts_client::{ApiClient, ClientConfig};
//!
//! # async fn example() -> Result<(), sts_client::ClientError> {
//! let client = ApiClient::new(ClientConfig::from_env()?)?;
//! for container in client.list_containers().await? {
//!     println!("{} ({})", container.name, container.server_type);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{
    Container, CreateServerRequest, CreateServerResponse, FileTreeListing, LogResponse, MailData,
    MailSummary, ServerTemplate, ServerType,
};

/// Client for the `/api/v1` backend.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: Arc<ClientConfig>,
}

impl ApiClient {
    /// Build a client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// HTTP URL for an endpoint given as path segments below `/api/v1`.
    ///
    /// Segments are percent-encoded, so opaque ids are safe to pass through.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        extend_path(self.config.api_url("")?, segments)
    }

    /// WebSocket URL for an endpoint given as path segments below `/api/v1`.
    pub fn ws_endpoint(&self, segments: &[&str]) -> Result<Url> {
        extend_path(self.config.ws_url("")?, segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, path = url.path(), "Sending request");
        self.http
            .request(method, url)
            .timeout(self.config.request_timeout)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.request(Method::GET, url).send().await?;
        read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T> {
        let response = self.request(Method::POST, url).json(body).send().await?;
        read_json(response).await
    }

    // ========================================================================
    // Containers
    // ========================================================================

    /// List active containers.
    pub async fn list_containers(&self) -> Result<Vec<Container>> {
        let containers: Option<Vec<Container>> =
            self.get_json(self.endpoint(&["containers"])?).await?;
        Ok(containers.unwrap_or_default())
    }

    /// Fetch one container.
    pub async fn get_container(&self, id: &str) -> Result<Container> {
        self.get_json(self.endpoint(&["containers", id])?).await
    }

    /// Stop and remove a container.
    pub async fn delete_container(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["containers", id])?;
        let response = self.request(Method::DELETE, url).send().await?;
        ensure_success(response).await.map(drop)
    }

    // ========================================================================
    // Server creation
    // ========================================================================

    /// Default image, ports and environment for a server type.
    pub async fn server_template(&self, server_type: ServerType) -> Result<ServerTemplate> {
        self.get_json(self.endpoint(&["servers", server_type.as_str()])?).await
    }

    /// Ask the backend to create a server; follow the returned id with
    /// [`ApiClient::watch_progress`].
    pub async fn create_server(
        &self,
        server_type: ServerType,
        request: &CreateServerRequest,
    ) -> Result<CreateServerResponse> {
        self.post_json(self.endpoint(&["servers", server_type.as_str()])?, request)
            .await
    }

    // ========================================================================
    // Protocol endpoints
    // ========================================================================

    /// List one directory of a server's file tree. `None` or `""` is the root.
    pub async fn file_tree(
        &self,
        server_type: ServerType,
        id: &str,
        path: Option<&str>,
    ) -> Result<FileTreeListing> {
        let mut url = self.endpoint(&["protocols", server_type.path_segment(), id, "filetree"])?;
        url.query_pairs_mut().append_pair("path", path.unwrap_or(""));
        self.get_json(url).await
    }

    /// Tail the container logs of a server.
    pub async fn logs(&self, server_type: ServerType, id: &str, tail: u32) -> Result<LogResponse> {
        let mut url = self.endpoint(&["protocols", server_type.path_segment(), id, "logs"])?;
        url.query_pairs_mut().append_pair("tail", &tail.to_string());
        self.get_json(url).await
    }

    /// Mails captured by a mail server.
    pub async fn mail_messages(&self, id: &str) -> Result<Vec<MailData>> {
        let url = self.endpoint(&["protocols", ServerType::Mail.path_segment(), id, "messages"])?;
        let summary: MailSummary = self.get_json(url).await?;
        Ok(summary.emails)
    }
}

fn extend_path(mut url: Url, segments: &[&str]) -> Result<Url> {
    if url.cannot_be_a_base() {
        return Err(ClientError::Config(format!("{url} cannot be a base URL")));
    }
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Turn a non-2xx response into [`ClientError::Status`] carrying the raw body.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Backend returned an error status");
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Check the status, then decode the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(ClientConfig::new("http://localhost:8000").unwrap()).unwrap()
    }

    #[test]
    fn endpoint_joins_segments() {
        let url = client().endpoint(&["protocols", "web", "abc", "filetree"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/protocols/web/abc/filetree");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let url = client().endpoint(&["containers", "a b/c"]).unwrap();
        assert_eq!(url.path(), "/api/v1/containers/a%20b%2Fc");
    }

    #[test]
    fn ws_endpoint_uses_ws_scheme() {
        let url = client().ws_endpoint(&["protocols", "mqtt", "abc", "messages"]).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/v1/protocols/mqtt/abc/messages");
    }

    #[test]
    fn extend_path_rejects_opaque_urls() {
        let url = Url::parse("mailto:dev@example.com").unwrap();
        let err = extend_path(url, &["containers"]).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn extend_path_keeps_base_path() {
        let url = Url::parse("http://localhost:8000/api/v1/").unwrap();
        let url = extend_path(url, &["servers", "MQTT"]).unwrap();
        assert_eq!(url.path(), "/api/v1/servers/MQTT");
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        let config = ClientConfig::new("http://127.0.0.1:1")
            .unwrap()
            .with_connect_timeout(std::time::Duration::from_millis(200));
        let client = ApiClient::new(config).unwrap();
        let err = client.list_containers().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
