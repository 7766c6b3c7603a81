//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{ClientError, Result};

/// Environment variable holding the backend base URL.
pub const BACKEND_URL_ENV: &str = "STS_BACKEND_URL";

/// Default backend origin used in development.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Path prefix of every backend endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Configuration for [`crate::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin, e.g. `http://localhost:8000`.
    pub base_url: Url,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Timeout for plain REST requests. Uploads and streams are exempt.
    pub request_timeout: Duration,
    /// Chunk size used when streaming upload bodies.
    pub upload_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BACKEND_URL)
                .unwrap_or_else(|_| unreachable!("default backend URL is valid")),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            upload_chunk_size: 64 * 1024,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given backend origin.
    ///
    /// Only `http` and `https` origins are accepted.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => Ok(Self {
                base_url,
                ..Self::default()
            }),
            other => Err(ClientError::Config(format!(
                "unsupported scheme '{other}', expected http or https"
            ))),
        }
    }

    /// Read the backend origin from `STS_BACKEND_URL`, falling back to the default.
    pub fn from_env() -> Result<Self> {
        match std::env::var(BACKEND_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the upload chunk size. Zero is clamped to one byte.
    #[must_use]
    pub fn with_upload_chunk_size(mut self, size: usize) -> Self {
        self.upload_chunk_size = size.max(1);
        self
    }

    /// Full HTTP URL of an API path such as `/containers`.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        let origin = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{origin}{API_PREFIX}{path}"))?)
    }

    /// WebSocket URL of an API path: the HTTP URL with `http→ws`, `https→wss`.
    pub fn ws_url(&self, path: &str) -> Result<Url> {
        let http = self.api_url(path)?;
        let rest = http.as_str();
        let ws = if let Some(rest) = rest.strip_prefix("https") {
            format!("wss{rest}")
        } else if let Some(rest) = rest.strip_prefix("http") {
            format!("ws{rest}")
        } else {
            return Err(ClientError::Config(format!("cannot derive websocket URL from {rest}")));
        };
        Ok(Url::parse(&ws)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.upload_chunk_size, 64 * 1024);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("http://127.0.0.1:9000")
            .unwrap()
            .with_connect_timeout(Duration::from_secs(1))
            .with_request_timeout(Duration::from_secs(2))
            .with_upload_chunk_size(0);

        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.upload_chunk_size, 1);
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = ClientConfig::new("ftp://localhost").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_api_url() {
        let config = ClientConfig::new("http://localhost:8000/").unwrap();
        let url = config.api_url("/containers/abc").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/containers/abc");
    }

    #[test]
    fn test_ws_url_rewrites_scheme() {
        let config = ClientConfig::new("http://localhost:8000").unwrap();
        let url = config.ws_url("/protocols/mqtt/x/messages").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/v1/protocols/mqtt/x/messages");

        let config = ClientConfig::new("https://panel.example.com").unwrap();
        let url = config.ws_url("/protocols/otel/y/telemetry").unwrap();
        assert_eq!(url.scheme(), "wss");
    }
}
