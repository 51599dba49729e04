//! Configuration passed explicitly into every client and session.

use std::collections::HashMap;
use std::time::Duration;

/// Default server the chat backend listens on.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Default streaming chat route.
pub const DEFAULT_ENDPOINT: &str = "/chat/stream";

/// A secret string type for sensitive data like bearer and CSRF tokens.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Which streaming primitive delivers the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Push-style: read the body chunk by chunk as it arrives.
    #[default]
    ReadableStream,
    /// Poll-style: observe the growing response text on each progress notification.
    ProgressivePoll,
}

/// Connection and credential settings for the streaming chat endpoint.
///
/// # Example
/// ```rust
/// use chatstream::options::{StreamConfig, TransportKind};
/// use std::time::Duration;
///
/// let config = StreamConfig::new("https://journal.example.com")
///     .with_bearer_token("jwt-token")
///     .with_connect_timeout(Duration::from_secs(5))
///     .with_transport(TransportKind::ProgressivePoll);
///
/// assert_eq!(config.url(), "https://journal.example.com/chat/stream");
/// ```
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Scheme and host of the chat backend
    pub base_url: String,

    /// Path of the streaming route, appended to `base_url`
    pub endpoint: String,

    /// Sent as `Authorization: Bearer <token>` when present
    pub bearer_token: Option<SecretString>,

    /// Sent as `X-CSRF-Token` when present
    pub csrf_token: Option<SecretString>,

    /// Total request timeout, including the time spent streaming the body
    pub timeout: Option<Duration>,

    /// Timeout for establishing the connection only
    pub connect_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,

    /// Streaming primitive used to read the response body
    pub transport: TransportKind,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl StreamConfig {
    /// Create a configuration pointing at `base_url` with the default route.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            bearer_token: None,
            csrf_token: None,
            timeout: None,
            connect_timeout: None,
            proxy: None,
            extra_headers: None,
            transport: TransportKind::default(),
        }
    }

    /// Full URL of the streaming route.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    /// Set the streaming route path.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the bearer credential.
    pub fn with_bearer_token(mut self, token: impl Into<SecretString>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the CSRF token.
    pub fn with_csrf_token(mut self, token: impl Into<SecretString>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// Set the total request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Select the streaming primitive.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = StreamConfig::new("http://localhost:5000/");
        assert_eq!(config.url(), "http://localhost:5000/chat/stream");

        let config = StreamConfig::new("http://localhost:5000").with_endpoint("api/chat/stream");
        assert_eq!(config.url(), "http://localhost:5000/api/chat/stream");
    }

    #[test]
    fn test_secret_is_redacted() {
        let config = StreamConfig::default().with_bearer_token("super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.transport, TransportKind::ReadableStream);
        assert!(config.bearer_token.is_none());
    }
}
