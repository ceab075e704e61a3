//! Server-sent-events framing shared by the streaming providers.

use reqwest::Response;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::ChunkSink;
use crate::error::{Error, Result};

/// One decoded SSE item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data:` line.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental line decoder.
///
/// Bytes are buffered until a full line is available, so frames and UTF-8
/// sequences split across network reads decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&line))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\n', '\r']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == "[DONE]" {
        return Some(SseEvent::Done);
    }
    if data.trim().is_empty() {
        return None;
    }
    Some(SseEvent::Data(data.to_string()))
}

/// Turn a non-2xx response into a transport error carrying the body.
pub(crate) async fn ensure_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::transport(format!("{provider} returned {status}: {}", body.trim())))
}

/// Read an SSE body, pushing the text `extract` finds in each payload.
///
/// Stops at `[DONE]`, at end of body, or with [`Error::Cancelled`] when
/// `cancel` fires between reads. Returns the concatenated text.
pub(crate) async fn drain<F>(
    response: Response,
    sink: &ChunkSink,
    cancel: &CancellationToken,
    extract: F,
) -> Result<String>
where
    F: Fn(&str) -> Result<Option<String>>,
{
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut full = String::new();

    loop {
        let bytes = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            next = stream.next() => match next {
                Some(bytes) => bytes?,
                None => break,
            },
        };

        for event in decoder.push(&bytes) {
            match event {
                SseEvent::Done => return Ok(full),
                SseEvent::Data(payload) => {
                    if let Some(text) = extract(&payload)? {
                        if !text.is_empty() {
                            full.push_str(&text);
                            sink.push(text);
                        }
                    }
                }
            }
        }
    }

    if let Some(SseEvent::Data(payload)) = decoder.finish() {
        if let Some(text) = extract(&payload)?.filter(|t| !t.is_empty()) {
            full.push_str(&text);
            sink.push(text);
        }
    }
    Ok(full)
}
