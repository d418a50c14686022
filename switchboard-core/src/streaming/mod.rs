//! Streaming responses: upstream SSE in, client SSE out

pub mod framing;
pub mod pipeline;
pub mod sse;

pub use framing::{EventFramer, FramingError};
pub use pipeline::{ClientEvent, PipelineConfig, StreamPhase, StreamState, StreamingPipeline};
