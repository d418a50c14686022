//! Upstream stream to client events
//!
//! The pipeline pulls one chunk at a time from the upstream body, frames it
//! into events, decodes each through the provider's wire format and hands
//! client chunks back one by one. Nothing is read ahead: the next chunk is
//! requested only after every event of the previous one was handed out.
//!
//! ```text
//! AwaitingFirstByte -> StreamingEvents -> Draining -> Closed
//!         \________________\________________________-> Failed
//! ```

use crate::config::ProviderKind;
use crate::http::ByteStream;
use crate::protocol::{ChatStreamChunk, TokenUsage, UsageAccumulation};
use crate::providers::transform::wire_format;
use crate::providers::{ProviderError, Route, StreamEvent, TimeoutPhase, WireFormat};
use crate::repair::JsonRepairEngine;
use crate::streaming::framing::EventFramer;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    AwaitingFirstByte,
    StreamingEvents,
    Draining,
    Closed,
    Failed,
}

impl StreamPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, StreamPhase::Closed | StreamPhase::Failed)
    }
}

/// What the client receives
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Chunk(ChatStreamChunk),
    Done,
}

/// Per-stream settings taken from the routed provider
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub kind: ProviderKind,
    pub usage_mode: UsageAccumulation,
    pub first_byte_timeout: Duration,
    pub read_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_route(route: &Route) -> Self {
        Self {
            kind: route.kind(),
            usage_mode: route.usage_mode(),
            first_byte_timeout: route.provider.timeouts.first_byte(),
            read_timeout: route.provider.timeouts.read(),
        }
    }
}

/// Accumulator owned by exactly one pipeline
#[derive(Debug)]
pub struct StreamState {
    framer: EventFramer,
    pending: VecDeque<String>,
    usage: TokenUsage,
    saw_usage: bool,
    last_sequence: u64,
    forwarded: u64,
    upstream_ended: bool,
    phase: StreamPhase,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            framer: EventFramer::new(),
            pending: VecDeque::new(),
            usage: TokenUsage::default(),
            saw_usage: false,
            last_sequence: 0,
            forwarded: 0,
            upstream_ended: false,
            phase: StreamPhase::AwaitingFirstByte,
        }
    }
}

impl StreamState {
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Sequence number of the last decoded event, starting at 1
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Chunks handed to the client so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn saw_usage(&self) -> bool {
        self.saw_usage
    }
}

pub struct StreamingPipeline {
    body: ByteStream,
    config: PipelineConfig,
    format: &'static dyn WireFormat,
    cancel: CancellationToken,
    repair: Option<Arc<JsonRepairEngine>>,
    state: StreamState,
}

impl StreamingPipeline {
    pub fn new(body: ByteStream, config: PipelineConfig, cancel: CancellationToken) -> Self {
        Self {
            body,
            format: wire_format(config.kind),
            config,
            cancel,
            repair: None,
            state: StreamState::default(),
        }
    }

    /// Run whole tool calls through the repair engine before they are
    /// forwarded. Only applies to formats that emit complete calls per event.
    pub fn with_repair(mut self, engine: Arc<JsonRepairEngine>) -> Self {
        self.repair = Some(engine);
        self
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase
    }

    /// Usage reported by the provider, if any arrived
    pub fn usage(&self) -> Option<TokenUsage> {
        self.state.saw_usage.then_some(self.state.usage)
    }

    /// Whatever usage was accumulated, flagged partial
    pub fn partial_usage(&self) -> TokenUsage {
        self.state.usage.into_partial()
    }

    /// Next client event; `None` once the stream is closed or failed
    pub async fn next_event(&mut self) -> Option<Result<ClientEvent, ProviderError>> {
        loop {
            match self.state.phase {
                StreamPhase::Closed | StreamPhase::Failed => return None,
                StreamPhase::Draining => {
                    self.state.pending.clear();
                    self.close();
                    return Some(Ok(ClientEvent::Done));
                }
                StreamPhase::AwaitingFirstByte | StreamPhase::StreamingEvents => {}
            }

            if self.cancel.is_cancelled() {
                return Some(Err(self.cancelled()));
            }

            if let Some(data) = self.state.pending.pop_front() {
                match self.handle_event(&data) {
                    Ok(Some(chunk)) => {
                        self.state.forwarded += 1;
                        return Some(Ok(ClientEvent::Chunk(chunk)));
                    }
                    Ok(None) => continue,
                    Err(err) => return Some(Err(self.fail(err))),
                }
            }

            if self.state.upstream_ended {
                return Some(Err(self.fail(ProviderError::read(
                    "upstream stream ended without a terminator",
                ))));
            }

            if let Err(err) = self.read_chunk().await {
                return Some(Err(err));
            }
        }
    }

    /// Pull one chunk from the upstream body into the framer
    async fn read_chunk(&mut self) -> Result<(), ProviderError> {
        let (wait, phase) = match self.state.phase {
            StreamPhase::AwaitingFirstByte => {
                (self.config.first_byte_timeout, TimeoutPhase::FirstByte)
            }
            _ => (self.config.read_timeout, TimeoutPhase::Read),
        };

        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            next = tokio::time::timeout(wait, self.body.next()) => Some(next),
        };
        let Some(next) = next else {
            return Err(self.cancelled());
        };

        match next {
            Err(_) => Err(self.fail(ProviderError::timeout(phase, wait))),
            Ok(None) => {
                self.state.upstream_ended = true;
                match self.state.framer.finish() {
                    Ok(Some(tail)) => self.state.pending.push_back(tail),
                    Ok(None) => {}
                    Err(err) => return Err(self.fail(ProviderError::malformed(err.to_string()))),
                }
                Ok(())
            }
            Ok(Some(Err(err))) => Err(self.fail(err.into())),
            Ok(Some(Ok(bytes))) => {
                if self.state.phase == StreamPhase::AwaitingFirstByte {
                    self.state.phase = StreamPhase::StreamingEvents;
                }
                match self.state.framer.push(&bytes) {
                    Ok(events) => {
                        self.state.pending.extend(events);
                        Ok(())
                    }
                    Err(err) => Err(self.fail(ProviderError::malformed(err.to_string()))),
                }
            }
        }
    }

    fn handle_event(&mut self, data: &str) -> Result<Option<ChatStreamChunk>, ProviderError> {
        let event = match self.format.decode_event(data)? {
            StreamEvent::Done => {
                self.state.phase = StreamPhase::Draining;
                return Ok(None);
            }
            StreamEvent::ProviderError { message, status } => {
                return Err(ProviderError::ProviderHttpError {
                    status: status.unwrap_or(502),
                    message,
                });
            }
            StreamEvent::Data(event) => event,
        };

        self.state.last_sequence += 1;

        if let Some(fragment) = &event.usage {
            self.state.usage.apply(fragment, self.config.usage_mode);
            self.state.saw_usage = true;
        }

        let chunk = event.chunk.map(|mut chunk| {
            if event.usage.is_some() {
                chunk.usage = Some(self.state.usage);
            }
            if let Some(engine) = self
                .repair
                .as_ref()
                .filter(|_| self.format.emits_whole_tool_calls())
            {
                for choice in &mut chunk.choices {
                    if let Some(calls) = choice.delta.tool_calls.as_mut() {
                        engine.repair_tool_call_deltas(calls);
                    }
                }
            }
            chunk
        });

        if event.terminal {
            self.state.phase = StreamPhase::Draining;
        }

        Ok(chunk)
    }

    fn fail(&mut self, err: ProviderError) -> ProviderError {
        warn!(
            sequence = self.state.last_sequence,
            forwarded = self.state.forwarded,
            error = %err,
            "stream failed"
        );
        self.state.phase = StreamPhase::Failed;
        self.release_body();
        err
    }

    fn cancelled(&mut self) -> ProviderError {
        debug!(sequence = self.state.last_sequence, "stream cancelled by client");
        self.close();
        ProviderError::ClientCancelled
    }

    fn close(&mut self) {
        self.state.phase = StreamPhase::Closed;
        self.release_body();
    }

    fn release_body(&mut self) {
        self.body = futures::stream::empty().boxed();
    }
}

impl std::fmt::Debug for StreamingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingPipeline")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
