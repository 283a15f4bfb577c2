//! Local HTTP forwarder
//!
//! Replays request frames against the local service and turns the result,
//! or the failure, into a response frame.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use apix_protocol::{Headers, RequestFrame, ResponseFrame};

/// Request headers describing the broker-side transfer, recomputed by the
/// HTTP client
pub const STRIPPED_REQUEST_HEADERS: &[&str] =
    &["host", "connection", "transfer-encoding", "content-length"];

/// Response headers that do not survive re-framing by the broker
pub const STRIPPED_RESPONSE_HEADERS: &[&str] = &["transfer-encoding", "connection"];

/// Failures calling the local service
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The frame's method is not a valid HTTP method
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// A header name or value cannot be sent
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The local call failed
    #[error("{0}")]
    Upstream(#[from] reqwest::Error),
}

/// Calls the local service on behalf of the broker
pub struct Forwarder {
    client: reqwest::Client,
    local_url: String,
}

impl Forwarder {
    /// Create a forwarder for `local_url` with a per-call timeout.
    ///
    /// Redirects are followed.
    pub fn new(local_url: impl Into<String>, timeout: Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, local_url))
    }

    /// Create a forwarder using an existing client
    pub fn with_client(client: reqwest::Client, local_url: impl Into<String>) -> Self {
        Self {
            client,
            local_url: local_url.into(),
        }
    }

    /// Base URL of the local service
    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    /// Local URL for a request path and query
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}",
            self.local_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Forward a request, producing a 502 response frame on any failure
    pub async fn forward(&self, request: RequestFrame) -> ResponseFrame {
        let id = request.id.clone();
        let method = request.method.clone();
        let path = request.path.clone();

        match self.try_forward(request).await {
            Ok(response) => {
                tracing::debug!("{} {} -> {}", method, path, response.status);
                response
            }
            Err(e) => {
                tracing::warn!("{} {} failed: {}", method, path, e);
                ResponseFrame::upstream_error(id, e)
            }
        }
    }

    async fn try_forward(&self, request: RequestFrame) -> Result<ResponseFrame, ForwardError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ForwardError::InvalidMethod(request.method.clone()))?;
        let url = self.target_url(&request.path, request.query.as_deref());

        let mut headers = HeaderMap::new();
        for (name, value) in request.headers.without(STRIPPED_REQUEST_HEADERS).iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ForwardError::InvalidHeader(name.to_string()))?;
            let header_value = Headers::encode_value(value)
                .and_then(|raw| HeaderValue::from_bytes(&raw).ok())
                .ok_or_else(|| ForwardError::InvalidHeader(name.to_string()))?;
            headers.append(header_name, header_value);
        }

        let response = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let response_headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Headers::decode_value(value.as_bytes()),
                )
            })
            .collect::<Headers>()
            .without(STRIPPED_RESPONSE_HEADERS);
        let body = response.bytes().await?;

        Ok(ResponseFrame::new(request.id, status, response_headers, body))
    }
}
