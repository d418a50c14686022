//! Server-sent event framing
//!
//! Upstream bodies arrive in arbitrary chunks that split events, lines and
//! even UTF-8 sequences. The framer buffers raw bytes and only decodes an
//! event once its terminating blank line has arrived.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("stream event is not valid UTF-8: {message}")]
    InvalidUtf8 { message: String },
}

/// Reassembles SSE events from a byte stream
#[derive(Debug, Default)]
pub struct EventFramer {
    buffer: Vec<u8>,
}

impl EventFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return the data of every event completed by them.
    ///
    /// Events without any `data:` line (comments, keep-alives) are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, FramingError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((end, separator)) = find_boundary(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + separator).take(end).collect();
            if let Some(data) = parse_event(&raw)? {
                events.push(data);
            }
        }
        Ok(events)
    }

    /// Bytes received but not yet part of a complete event
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Flush the unterminated tail at end of stream
    pub fn finish(&mut self) -> Result<Option<String>, FramingError> {
        let raw = std::mem::take(&mut self.buffer);
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        parse_event(&raw)
    }
}

/// Position of the first blank line, as (event end, separator length)
fn find_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    buffer.iter().enumerate().find_map(|(i, &b)| {
        if b != b'\n' {
            return None;
        }
        let rest = &buffer[i + 1..];
        if rest.starts_with(b"\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n") {
            Some((i, 3))
        } else {
            None
        }
    })
}

fn parse_event(raw: &[u8]) -> Result<Option<String>, FramingError> {
    let text = std::str::from_utf8(raw).map_err(|e| FramingError::InvalidUtf8 {
        message: e.to_string(),
    })?;

    let mut data: Option<String> = None;
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }
    Ok(data)
}
