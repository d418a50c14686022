//! reqwest-backed upstream transport

use crate::config::ConnectionConfig;
use crate::http::{TransportError, UpstreamCall, UpstreamResponse, UpstreamTransport};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("switchboard/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling.
///
/// No client-wide timeout is configured: a streaming body may legitimately
/// stay open for minutes, so per-phase deadlines are enforced by the caller.
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    max_response_bytes: usize,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::from_config(&ConnectionConfig::default())
    }

    pub fn from_config(config: &ConnectionConfig) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.keepalive_seconds))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            max_response_bytes: config.max_response_bytes,
        })
    }

    fn map_send_error(call: &UpstreamCall, err: reqwest::Error) -> TransportError {
        let err = err.without_url();
        if err.is_timeout() {
            warn!(request_id = %call.request_id, provider = %call.provider, "upstream connect timed out");
            TransportError::Timeout {
                after: call.connect_timeout,
            }
        } else {
            warn!(
                request_id = %call.request_id,
                provider = %call.provider,
                error = %err,
                "upstream connection failed"
            );
            TransportError::Connect {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl UpstreamTransport for HttpClient {
    async fn send(&self, call: &UpstreamCall) -> Result<UpstreamResponse, TransportError> {
        info!(
            request_id = %call.request_id,
            provider = %call.provider,
            url = %call.target.redacted_url(),
            stream = call.stream,
            "sending upstream request"
        );

        let mut builder = self
            .client
            .post(call.target.url().clone())
            .header("X-Request-ID", call.request_id.to_string())
            .body(call.body.clone());
        for (name, value) in call.target.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match tokio::time::timeout(call.connect_timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(Self::map_send_error(call, err)),
            Err(_) => {
                warn!(request_id = %call.request_id, provider = %call.provider, "upstream connect timed out");
                return Err(TransportError::Timeout {
                    after: call.connect_timeout,
                });
            }
        };

        let status = response.status().as_u16();
        debug!(request_id = %call.request_id, status, "upstream response headers received");

        if !call.stream {
            if let Some(length) = response.content_length() {
                if length as usize > self.max_response_bytes {
                    return Err(TransportError::TooLarge {
                        limit: self.max_response_bytes,
                    });
                }
            }
        }

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| TransportError::Read {
                    message: e.without_url().to_string(),
                })
            })
            .boxed();

        Ok(UpstreamResponse::new(status, body))
    }
}
