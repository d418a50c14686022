//! Upstream HTTP transport
//!
//! The supervisor talks to providers through the [`UpstreamTransport`]
//! trait. One [`UpstreamCall`] is built per attempt; the transport returns
//! the status and a lazily consumed body stream as soon as the response
//! headers arrive. Production uses the reqwest-backed [`client::HttpClient`];
//! tests inject transports that fail in controlled ways.

pub mod client;
pub mod error;

use crate::providers::error::{ProviderError, TimeoutPhase};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

pub use client::HttpClient;

/// Response body as it arrives from the network
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Transport-level failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response headers were received
    #[error("connect failed: {message}")]
    Connect { message: String },

    /// The connect budget ran out before response headers arrived
    #[error("connect timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The body stream broke after headers were received
    #[error("body read failed: {message}")]
    Read { message: String },

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect { message } => ProviderError::ConnectFailure { message },
            TransportError::Timeout { after } => {
                ProviderError::timeout(TimeoutPhase::Connect, after)
            }
            TransportError::Read { message } => ProviderError::ReadFailure { message },
            err @ TransportError::TooLarge { .. } => ProviderError::read(err.to_string()),
        }
    }
}

/// Resolved upstream URL and headers, credential included.
///
/// `Debug` and [`UpstreamTarget::redacted_url`] never show the credential.
#[derive(Clone)]
pub struct UpstreamTarget {
    url: Url,
    headers: Vec<(String, String)>,
    secret_param: Option<String>,
    secret_header: Option<String>,
}

impl UpstreamTarget {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            secret_param: None,
            secret_header: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a credential header; its value is hidden from `Debug`
    pub fn with_secret_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.secret_header = Some(name.to_ascii_lowercase());
        self.headers.push((name, value.into()));
        self
    }

    /// Attach a credential query parameter; its value is hidden from logs
    pub fn with_secret_query(mut self, name: impl Into<String>, value: &str) -> Self {
        let name = name.into();
        self.url.query_pairs_mut().append_pair(&name, value);
        self.secret_param = Some(name);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The URL with any credential query value replaced
    pub fn redacted_url(&self) -> String {
        let Some(secret) = &self.secret_param else {
            return self.url.to_string();
        };

        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| {
                let value = if &k == secret { "[REDACTED]".to_string() } else { v.into_owned() };
                (k.into_owned(), value)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

impl fmt::Debug for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let hidden = k.eq_ignore_ascii_case("authorization")
                    || self.secret_header.as_deref() == Some(k.to_ascii_lowercase().as_str());
                if hidden {
                    format!("{k}: [REDACTED]")
                } else {
                    format!("{k}: {v}")
                }
            })
            .collect();

        f.debug_struct("UpstreamTarget")
            .field("url", &self.redacted_url())
            .field("headers", &headers)
            .finish()
    }
}

/// One attempt against an upstream provider
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub request_id: Uuid,
    pub provider: String,
    pub target: UpstreamTarget,
    pub body: Bytes,
    pub stream: bool,
    /// Budget for connecting and receiving response headers
    pub connect_timeout: Duration,
}

/// Status plus a body that has not been read yet
pub struct UpstreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends upstream calls
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Resolve once response headers are in; the body is read by the caller
    async fn send(&self, call: &UpstreamCall) -> Result<UpstreamResponse, TransportError>;
}

/// Drain a body stream into memory, refusing anything past `limit` bytes
pub async fn collect_body(mut body: ByteStream, limit: usize) -> Result<Bytes, TransportError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if buffer.len() + chunk.len() > limit {
            return Err(TransportError::TooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}
