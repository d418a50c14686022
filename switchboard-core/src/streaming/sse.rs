//! Client-facing SSE encoding

use crate::protocol::ChatStreamChunk;
use crate::streaming::pipeline::ClientEvent;
use crate::supervisor::ProxyFailure;
use bytes::Bytes;

pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

pub fn encode_chunk(chunk: &ChatStreamChunk) -> Result<Bytes, serde_json::Error> {
    let data = serde_json::to_string(chunk)?;
    Ok(frame(None, &data))
}

pub fn encode_done() -> Bytes {
    Bytes::from_static(DONE_FRAME)
}

pub fn encode_event(event: &ClientEvent) -> Result<Bytes, serde_json::Error> {
    match event {
        ClientEvent::Chunk(chunk) => encode_chunk(chunk),
        ClientEvent::Done => Ok(encode_done()),
    }
}

/// Mid-stream failure as an `event: error` frame carrying the failure body
pub fn encode_error(failure: &ProxyFailure) -> Bytes {
    frame(Some("error"), &failure.to_json_body().to_string())
}

fn frame(event: Option<&str>, data: &str) -> Bytes {
    let mut out = String::with_capacity(data.len() + 16);
    if let Some(event) = event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}
