//! Request supervision: routing, retries, classification, notification
//!
//! The supervisor owns one request from routing to its final notification.
//! Connect and timeout failures are retried with exponential backoff as long
//! as nothing reached the client yet; everything else is terminal and
//! becomes a [`ProxyFailure`]. Each request ends in exactly one
//! `request_completed` or `request_failed` event.

pub mod failure;
pub mod stream;

pub use failure::{recommendations_for, ProxyFailure};
pub use stream::SupervisedStream;

use crate::config::{ConfigError, ConfigValidator, GatewayConfig};
use crate::events::{NotificationSink, NullSink, ProxyEvent};
use crate::http::error::{extract_error_details, UpstreamErrorDetails};
use crate::http::{collect_body, UpstreamCall, UpstreamResponse, UpstreamTransport};
use crate::metrics::{MetricsSink, NullMetrics};
use crate::protocol::{ChatRequest, ChatResponse};
use crate::providers::transform::{from_upstream, to_upstream};
use crate::providers::{
    CredentialStore, EnvCredentialStore, ErrorClassifier, ProviderError, ProviderRegistry,
    ProviderRouter, RetryPolicy, Route, TimeoutPhase,
};
use crate::repair::JsonRepairEngine;
use crate::streaming::{PipelineConfig, StreamingPipeline};
use crate::tokens::{CharRatioEstimator, TokenEstimator};
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Everything needed to (re)issue one request upstream
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub request_id: Uuid,
    pub model: String,
    pub route: Route,
    pub call: UpstreamCall,
    pub estimated_tokens: u64,
}

#[derive(Clone)]
pub struct Supervisor {
    router: ProviderRouter,
    transport: Arc<dyn UpstreamTransport>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSink>,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryPolicy,
    classifier: Arc<ErrorClassifier>,
    estimator: Arc<dyn TokenEstimator>,
    repair: Arc<JsonRepairEngine>,
    max_response_bytes: usize,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("router", &self.router)
            .field("retry", &self.retry)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Defaults: env credentials, no sinks, default retry policy and the
    /// built-in classification rules
    pub fn new(registry: Arc<ProviderRegistry>, transport: Arc<dyn UpstreamTransport>) -> Self {
        Self {
            router: ProviderRouter::new(registry),
            transport,
            credentials: Arc::new(EnvCredentialStore),
            notifier: Arc::new(NullSink),
            metrics: Arc::new(NullMetrics),
            retry: RetryPolicy::default(),
            classifier: Arc::new(ErrorClassifier::with_defaults()),
            estimator: Arc::new(CharRatioEstimator::default()),
            repair: Arc::new(JsonRepairEngine::default()),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Build from a loaded configuration, compiling provider error rules
    pub fn from_config(
        config: &GatewayConfig,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Result<Self, ConfigError> {
        ConfigValidator::new().validate(config)?;
        let classifier = ErrorClassifier::from_providers(&config.providers)?;

        Ok(
            Self::new(Arc::new(ProviderRegistry::from_config(config)), transport)
                .with_retry_policy(config.retry.clone())
                .with_classifier(classifier)
                .with_repair_engine(Arc::new(JsonRepairEngine::from_config(
                    &config.repair,
                    Arc::new(NullMetrics),
                )))
                .with_max_response_bytes(config.connection.max_response_bytes),
        )
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Retry counts and repair outcomes both go to `metrics`. The repair
    /// engine keeps its breaker.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.repair = Arc::new(self.repair.with_metrics_sink(Arc::clone(&metrics)));
        self.metrics = metrics;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_repair_engine(mut self, repair: Arc<JsonRepairEngine>) -> Self {
        self.repair = repair;
        self
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run a non-streaming request to completion
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProxyFailure> {
        let request_id = Uuid::new_v4();
        let prepared = match self.prepare(request, request_id, false) {
            Ok(prepared) => prepared,
            Err(failure) => {
                self.notify_failed(request_id, &failure);
                return Err(failure);
            }
        };

        let (response, attempts) = match self.open(&prepared, 1).await {
            Ok(opened) => opened,
            Err((err, attempts)) => {
                return Err(self.fail(&prepared, err, attempts, None));
            }
        };

        let route = &prepared.route;
        let body = match tokio::time::timeout(
            route.provider.timeouts.request(),
            collect_body(response.body, self.max_response_bytes),
        )
        .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => return Err(self.fail(&prepared, err.into(), attempts, None)),
            Err(_) => {
                let err = ProviderError::timeout(
                    TimeoutPhase::Request,
                    route.provider.timeouts.request(),
                );
                return Err(self.fail(&prepared, err, attempts, None));
            }
        };

        let mut response = match from_upstream(&body, route.kind()) {
            Ok(response) => response,
            Err(err) => return Err(self.fail(&prepared, err.into(), attempts, None)),
        };

        for choice in &mut response.choices {
            if let Some(calls) = choice.message.tool_calls.as_mut() {
                self.repair.repair_tool_calls(calls);
            }
        }

        info!(
            request_id = %request_id,
            provider = %route.provider_name(),
            attempts,
            total_tokens = response.usage.map(|u| u.total_tokens),
            "request completed"
        );
        self.metrics.record_retries(route.provider_name(), attempts - 1);
        self.notifier.notify(&ProxyEvent::RequestCompleted {
            request_id,
            provider: route.provider_name().to_string(),
            usage: response.usage,
            attempts,
        });

        Ok(response)
    }

    /// Open a streaming request.
    ///
    /// Failures before the upstream answered with a 2xx are returned here;
    /// later ones come out of the returned stream. Cancelling `cancel`
    /// abandons the request at the next suspension point.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<SupervisedStream, ProxyFailure> {
        let request_id = Uuid::new_v4();
        let prepared = match self.prepare(request, request_id, true) {
            Ok(prepared) => prepared,
            Err(failure) => {
                self.notify_failed(request_id, &failure);
                return Err(failure);
            }
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err((ProviderError::ClientCancelled, 1)),
            opened = self.open(&prepared, 1) => opened,
        };

        match opened {
            Ok((response, attempts)) => {
                let pipeline = self.pipeline(&prepared, response, cancel.clone());
                Ok(SupervisedStream::new(
                    self.clone(),
                    prepared,
                    pipeline,
                    cancel,
                    attempts,
                ))
            }
            Err((err, attempts)) => Err(self.fail(&prepared, err, attempts, None)),
        }
    }

    /// Route, check the context budget, resolve the credential and encode
    /// the body
    fn prepare(
        &self,
        request: &ChatRequest,
        request_id: Uuid,
        stream: bool,
    ) -> Result<PreparedRequest, ProxyFailure> {
        let route = self
            .router
            .resolve(&request.model)
            .map_err(|e| ProxyFailure::new(e, &request.model))?;

        self.notifier.notify(&ProxyEvent::RequestStarted {
            request_id,
            model: request.model.clone(),
            provider: route.provider_name().to_string(),
            stream,
        });

        let estimated_tokens = self.estimator.estimate(request);
        let max_context = route.max_context_tokens();
        let failure = |err: ProviderError| {
            ProxyFailure::new(err, &request.model)
                .with_provider(route.provider_name())
                .with_context_window(estimated_tokens, max_context)
        };

        if estimated_tokens > max_context {
            return Err(failure(ProviderError::ContextLimitExceeded {
                estimated_tokens: Some(estimated_tokens),
                max_context,
                message: format!(
                    "request needs an estimated {estimated_tokens} tokens but '{}' accepts at most {max_context}",
                    request.model
                ),
            }));
        }

        let credential = self
            .credentials
            .resolve(&route.provider.credential)
            .ok_or_else(|| {
                failure(ProviderError::CredentialUnavailable {
                    provider: route.provider_name().to_string(),
                    reference: route.provider.credential.clone(),
                })
            })?;

        let target = self
            .router
            .target(&route, stream, &credential)
            .map_err(failure)?;

        let mut outgoing = request.clone();
        outgoing.stream = stream.then_some(true);
        let transformed = to_upstream(&outgoing, &route);
        let body = serde_json::to_vec(&transformed.body)
            .map_err(|e| failure(ProviderError::malformed(e.to_string())))?;

        let call = UpstreamCall {
            request_id,
            provider: route.provider_name().to_string(),
            target,
            body: Bytes::from(body),
            stream,
            connect_timeout: route.provider.timeouts.connect(),
        };

        Ok(PreparedRequest {
            request_id,
            model: request.model.clone(),
            route,
            call,
            estimated_tokens,
        })
    }

    /// Send with retries, starting at attempt number `first_attempt`.
    ///
    /// Returns the response or the last error, with the number of the last
    /// attempt made.
    pub(crate) async fn open(
        &self,
        prepared: &PreparedRequest,
        first_attempt: u32,
    ) -> Result<(UpstreamResponse, u32), (ProviderError, u32)> {
        let mut attempt = first_attempt;
        loop {
            match self.send_once(prepared, attempt).await {
                Ok(response) => return Ok((response, attempt)),
                Err(err) if self.retry.should_retry(&err, attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        request_id = %prepared.request_id,
                        provider = %prepared.route.provider_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "upstream attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err((err, attempt)),
            }
        }
    }

    async fn send_once(
        &self,
        prepared: &PreparedRequest,
        attempt: u32,
    ) -> Result<UpstreamResponse, ProviderError> {
        debug!(
            request_id = %prepared.request_id,
            provider = %prepared.route.provider_name(),
            attempt,
            "sending upstream attempt"
        );

        let response = self.transport.send(&prepared.call).await?;
        if response.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let read_timeout = prepared.route.provider.timeouts.read();
        let body = match tokio::time::timeout(
            read_timeout,
            collect_body(response.body, self.max_response_bytes),
        )
        .await
        {
            Ok(body) => body.unwrap_or_default(),
            Err(_) => {
                debug!(
                    request_id = %prepared.request_id,
                    provider = %prepared.route.provider_name(),
                    status,
                    timeout_ms = read_timeout.as_millis() as u64,
                    "error body stalled, classifying by status"
                );
                Bytes::new()
            }
        };
        let details = extract_error_details(status, &body);

        Err(self.classifier.classify_error(
            prepared.route.provider_name(),
            status,
            &details,
            Some(prepared.estimated_tokens),
            prepared.route.max_context_tokens(),
        ))
    }

    /// Run an error reported inside a stream through the classification
    /// rules; other errors pass through
    pub(crate) fn classify_in_band(
        &self,
        prepared: &PreparedRequest,
        err: ProviderError,
    ) -> ProviderError {
        match err {
            ProviderError::ProviderHttpError { status, message } => self.classifier.classify_error(
                prepared.route.provider_name(),
                status,
                &UpstreamErrorDetails {
                    message,
                    code: None,
                },
                Some(prepared.estimated_tokens),
                prepared.route.max_context_tokens(),
            ),
            other => other,
        }
    }

    pub(crate) fn pipeline(
        &self,
        prepared: &PreparedRequest,
        response: UpstreamResponse,
        cancel: CancellationToken,
    ) -> StreamingPipeline {
        StreamingPipeline::new(
            response.body,
            PipelineConfig::from_route(&prepared.route),
            cancel,
        )
        .with_repair(Arc::clone(&self.repair))
    }

    /// Build the failure, record retries and send the one failure event
    pub(crate) fn fail(
        &self,
        prepared: &PreparedRequest,
        err: ProviderError,
        attempts: u32,
        partial_usage: Option<crate::protocol::TokenUsage>,
    ) -> ProxyFailure {
        let mut failure = ProxyFailure::new(err, &prepared.model)
            .with_provider(prepared.route.provider_name())
            .with_attempts(attempts)
            .with_context_window(prepared.estimated_tokens, prepared.route.max_context_tokens());
        if let Some(usage) = partial_usage {
            failure = failure.with_partial_usage(usage);
        }

        self.metrics
            .record_retries(prepared.route.provider_name(), attempts.saturating_sub(1));
        self.notify_failed(prepared.request_id, &failure);
        failure
    }

    pub(crate) fn notify_failed(&self, request_id: Uuid, failure: &ProxyFailure) {
        if failure.error == ProviderError::ClientCancelled {
            info!(request_id = %request_id, provider = ?failure.provider, "request cancelled by client");
        } else {
            warn!(
                request_id = %request_id,
                provider = ?failure.provider,
                classification = %failure.classification,
                attempts = failure.attempts,
                error = %failure.message,
                "request failed"
            );
        }

        self.notifier.notify(&ProxyEvent::RequestFailed {
            request_id,
            provider: failure.provider.clone(),
            classification: failure.classification,
            message: failure.message.clone(),
            partial_usage: failure.partial_usage,
            recommendations: failure.recommendations.clone(),
        });
    }

    pub(crate) fn notify_completed(
        &self,
        prepared: &PreparedRequest,
        usage: Option<crate::protocol::TokenUsage>,
        attempts: u32,
    ) {
        info!(
            request_id = %prepared.request_id,
            provider = %prepared.route.provider_name(),
            attempts,
            total_tokens = usage.map(|u| u.total_tokens),
            "stream completed"
        );
        self.metrics
            .record_retries(prepared.route.provider_name(), attempts.saturating_sub(1));
        self.notifier.notify(&ProxyEvent::RequestCompleted {
            request_id: prepared.request_id,
            provider: prepared.route.provider_name().to_string(),
            usage,
            attempts,
        });
    }
}
