//! Supervision of one streaming request

use crate::providers::ProviderError;
use crate::streaming::{ClientEvent, StreamingPipeline};
use crate::supervisor::{PreparedRequest, ProxyFailure, Supervisor};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A streaming request in flight.
///
/// A retryable failure is retried only while no chunk has reached the
/// client. The request's single terminal notification is sent when the
/// stream completes, fails, is cancelled, or is dropped unfinished.
pub struct SupervisedStream {
    supervisor: Supervisor,
    prepared: PreparedRequest,
    pipeline: StreamingPipeline,
    cancel: CancellationToken,
    attempts: u32,
    settled: bool,
}

impl SupervisedStream {
    pub(crate) fn new(
        supervisor: Supervisor,
        prepared: PreparedRequest,
        pipeline: StreamingPipeline,
        cancel: CancellationToken,
        attempts: u32,
    ) -> Self {
        Self {
            supervisor,
            prepared,
            pipeline,
            cancel,
            attempts,
            settled: false,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.prepared.request_id
    }

    pub fn provider(&self) -> &str {
        self.prepared.route.provider_name()
    }

    /// Attempts made so far, the first included
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn pipeline(&self) -> &StreamingPipeline {
        &self.pipeline
    }

    /// Next event for the client. Cancellation ends the stream with `None`;
    /// it is reported to the notification sink, never to the client.
    pub async fn next_event(&mut self) -> Option<Result<ClientEvent, ProxyFailure>> {
        if self.settled {
            return None;
        }

        loop {
            match self.pipeline.next_event().await {
                Some(Ok(ClientEvent::Done)) => {
                    self.settled = true;
                    self.supervisor.notify_completed(
                        &self.prepared,
                        self.pipeline.usage(),
                        self.attempts,
                    );
                    return Some(Ok(ClientEvent::Done));
                }
                Some(Ok(event)) => return Some(Ok(event)),
                Some(Err(ProviderError::ClientCancelled)) => {
                    self.settle_failed(ProviderError::ClientCancelled);
                    return None;
                }
                Some(Err(err)) => {
                    let err = self.supervisor.classify_in_band(&self.prepared, err);
                    if self.pipeline.state().forwarded() == 0
                        && self.supervisor.retry.should_retry(&err, self.attempts)
                    {
                        match self.reopen(&err).await {
                            Ok(()) => continue,
                            Err(err) => {
                                let cancelled = err == ProviderError::ClientCancelled;
                                let failure = self.settle_failed(err);
                                return (!cancelled).then_some(Err(failure));
                            }
                        }
                    }
                    return Some(Err(self.settle_failed(err)));
                }
                None => {
                    if !self.settled {
                        self.settle_failed(ProviderError::read("stream closed unexpectedly"));
                    }
                    return None;
                }
            }
        }
    }

    /// Back off and open a fresh upstream stream
    async fn reopen(&mut self, err: &ProviderError) -> Result<(), ProviderError> {
        let delay = self.supervisor.retry.delay_for(self.attempts);
        tracing::warn!(
            request_id = %self.prepared.request_id,
            provider = %self.prepared.route.provider_name(),
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "stream failed before any output, retrying"
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ProviderError::ClientCancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err((ProviderError::ClientCancelled, self.attempts + 1)),
            opened = self.supervisor.open(&self.prepared, self.attempts + 1) => opened,
        };

        match opened {
            Ok((response, attempts)) => {
                self.attempts = attempts;
                self.pipeline =
                    self.supervisor
                        .pipeline(&self.prepared, response, self.cancel.clone());
                Ok(())
            }
            Err((err, attempts)) => {
                self.attempts = attempts;
                Err(err)
            }
        }
    }

    fn settle_failed(&mut self, err: ProviderError) -> ProxyFailure {
        self.settled = true;
        let partial = self.pipeline.partial_usage();
        self.supervisor
            .fail(&self.prepared, err, self.attempts, Some(partial))
    }

    /// Adapt into a `Stream` of client events
    pub fn into_stream(self) -> BoxStream<'static, Result<ClientEvent, ProxyFailure>> {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next_event().await?;
            Some((item, stream))
        })
        .boxed()
    }
}

impl Drop for SupervisedStream {
    fn drop(&mut self) {
        if !self.settled {
            self.settle_failed(ProviderError::ClientCancelled);
        }
    }
}

impl std::fmt::Debug for SupervisedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedStream")
            .field("request_id", &self.prepared.request_id)
            .field("provider", &self.prepared.route.provider_name())
            .field("attempts", &self.attempts)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}
