//! Server-sent-event framing over a raw byte stream.
//!
//! The event store pushes discrete named messages (`event:` / `data:` /
//! `id:` fields, blank-line separated). Frames may arrive split across
//! arbitrary chunk boundaries, so an incremental parser keeps the tail of
//! the last incomplete frame between chunks.

use async_stream::stream;
use futures_core::Stream;
use tokio_stream::StreamExt;

use crate::error::StreamError;

/// One decoded push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Value of the `event:` field; `None` for unnamed messages.
    pub event: Option<String>,
    /// Concatenated `data:` lines, joined with `\n`.
    pub data: String,
    /// Value of the `id:` field, if the server sent one.
    pub id: Option<String>,
}

impl SseMessage {
    /// Deserialize the payload. Failures come back as
    /// [`StreamError::MalformedPayload`]; consumers drop those without
    /// touching connectivity state.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, StreamError> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

/// Incremental frame decoder. Feed it raw chunks; it yields every message
/// completed so far and buffers the rest.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<SseMessage> {
        self.buffer.push_str(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = find_frame_end(&self.buffer) {
            let frame = self.buffer[..pos.start].to_string();
            self.buffer.drain(..pos.end);
            if let Some(msg) = parse_frame(&frame) {
                messages.push(msg);
            }
        }
        messages
    }
}

struct FrameEnd {
    start: usize,
    end: usize,
}

// Frames end at a blank line; tolerate both \n\n and \r\n\r\n separators.
fn find_frame_end(buffer: &str) -> Option<FrameEnd> {
    let lf = buffer.find("\n\n");
    let crlf = buffer.find("\r\n\r\n");
    match (lf, crlf) {
        (Some(l), Some(c)) if c < l => Some(FrameEnd { start: c, end: c + 4 }),
        (Some(l), _) => Some(FrameEnd { start: l, end: l + 2 }),
        (None, Some(c)) => Some(FrameEnd { start: c, end: c + 4 }),
        (None, None) => None,
    }
}

fn parse_frame(frame: &str) -> Option<SseMessage> {
    let mut event = None;
    let mut id = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            // Keep-alive comment.
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "id" => id = Some(value.to_string()),
            "data" => data_lines.push(value),
            // "retry" and unknown fields are ignored.
            _ => {}
        }
    }

    if event.is_none() && id.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseMessage {
        event,
        data: data_lines.join("\n"),
        id,
    })
}

/// Decode a reqwest body stream into push messages. Both a transport error
/// and the server closing the stream terminate it with an error
/// ([`StreamError::Transport`] / [`StreamError::Closed`]); the caller
/// decides whether that means reconnect.
pub fn decode(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<SseMessage, StreamError>> + Send {
    stream! {
        tokio::pin!(byte_stream);
        let mut parser = SseParser::new();

        while let Some(chunk_result) = byte_stream.next().await {
            match chunk_result {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    for msg in parser.push(&text) {
                        yield Ok(msg);
                    }
                }
                Err(e) => {
                    yield Err(StreamError::Transport(e));
                    return;
                }
            }
        }
        yield Err(StreamError::Closed);
    }
}
