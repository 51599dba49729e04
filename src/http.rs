//! HTTP plumbing shared by both transports.
//!
//! Client construction, header attachment, and interpretation of rejected
//! responses live here so the adapters only differ in how they read the body.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::model::StreamRequest;
use crate::options::StreamConfig;
use crate::sse::{error_message, parse_sse_line};

/// Header the backend reads the CSRF token from.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Longest raw body excerpt carried in a transport error, in characters.
pub const ERROR_EXCERPT_CHARS: usize = 200;

/// Build a configured HTTP client from the stream configuration.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(config: &StreamConfig) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ClientError::Config(e.to_string()))
}

/// Add extra headers to a request if specified in the configuration.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Attach the bearer and CSRF headers the request carries.
pub fn add_auth_headers(mut request: RequestBuilder, stream_request: &StreamRequest) -> RequestBuilder {
    if let Some(token) = &stream_request.bearer_token {
        request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
    }
    if let Some(token) = &stream_request.csrf_token {
        request = request.header(CSRF_HEADER, token.expose_secret());
    }
    request
}

/// POST the chat message and return the response once its status is known to be 2xx.
pub async fn send_stream_request(
    client: &Client,
    stream_request: &StreamRequest,
    extra_headers: &Option<HashMap<String, String>>,
) -> Result<Response, ClientError> {
    let mut req = client
        .post(&stream_request.endpoint)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "text/event-stream, text/plain");

    req = add_auth_headers(req, stream_request);
    req = add_extra_headers(req, extra_headers);

    debug!(endpoint = %stream_request.endpoint, "opening chat stream");
    let response = req.json(&stream_request.body()).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let err = handle_error_response(status, &body);
        warn!(status = status.as_u16(), error = %err, "chat stream rejected");
        return Err(err);
    }

    Ok(response)
}

/// Turn a non-2xx response into a transport error with the best available message.
pub fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
    ClientError::Transport {
        status: Some(status.as_u16()),
        message: error_body_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        }),
    }
}

fn error_body_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    // plain JSON, or the same payload wrapped in a single frame
    let json = parse_sse_line(body).unwrap_or(body);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(json) {
        if let Some(message) = value.get("error").and_then(error_message) {
            return Some(message);
        }
    }

    Some(truncate_chars(body, ERROR_EXCERPT_CHARS))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_build_http_client() {
        let config = StreamConfig::default().with_timeout(Duration::from_secs(30));
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let config = StreamConfig::default().with_proxy("http://proxy.example.com:8080");
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_error_body_json() {
        let err = handle_error_response(
            StatusCode::UNAUTHORIZED,
            r#"{"error": "Unauthorized", "message": "Missing Authorization header"}"#,
        );
        assert_eq!(err.status(), Some(401));
        assert!(matches!(err, ClientError::Transport { ref message, .. } if message == "Unauthorized"));
    }

    #[test]
    fn test_error_body_nested_message() {
        let err = handle_error_response(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "rate limited", "type": "limit"}}"#,
        );
        assert!(matches!(err, ClientError::Transport { ref message, .. } if message == "rate limited"));
    }

    #[test]
    fn test_error_body_in_frame_form() {
        let err = handle_error_response(
            StatusCode::BAD_REQUEST,
            "data: {\"error\": \"Missing required field: message\"}\n\n",
        );
        assert!(matches!(
            err,
            ClientError::Transport { status: Some(400), ref message }
                if message == "Missing required field: message"
        ));
    }

    #[test]
    fn test_error_body_raw_excerpt_is_truncated() {
        let body = "<html>".to_string() + &"x".repeat(500);
        let err = handle_error_response(StatusCode::BAD_GATEWAY, &body);
        match err {
            ClientError::Transport { status, message } => {
                assert_eq!(status, Some(502));
                assert!(message.starts_with("<html>"));
                assert_eq!(message.chars().count(), ERROR_EXCERPT_CHARS + 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_body_empty_uses_reason() {
        let err = handle_error_response(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, ClientError::Transport { ref message, .. } if message == "Service Unavailable"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("hé", 2), "hé");
    }
}
