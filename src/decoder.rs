//! Incremental decoding of the agent's newline-delimited JSON output.
//!
//! Reads arrive in arbitrary chunks, so a single JSON line may be split
//! across several of them. The decoder keeps the unterminated tail in a
//! residual byte buffer and only parses lines once their newline arrives.
//! Buffering bytes (not text) means a multi-byte character split across
//! reads is reassembled before UTF-8 decoding.

use crate::events::AgentEvent;
use crate::textutil::single_line_preview;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of each read from the underlying byte stream.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Push-style line decoder. One instance per run.
///
/// Between calls `residual` never holds a newline, so each push only scans
/// the bytes it appends.
#[derive(Debug, Default)]
pub struct EventDecoder {
    residual: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it, in order.
    ///
    /// Lines that are not JSON objects are dropped silently.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AgentEvent> {
        let held = self.residual.len();
        self.residual.extend_from_slice(chunk);
        let Some(last_newline) = chunk.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let tail = self.residual.split_off(held + last_newline + 1);
        let complete = std::mem::replace(&mut self.residual, tail);
        complete
            .split(|b| *b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Parse whatever is left in the buffer as one final event.
    pub fn finish(&mut self) -> Option<AgentEvent> {
        let rest = std::mem::take(&mut self.residual);
        decode_line(&rest)
    }

    /// Bytes held back waiting for a newline.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }
}

fn decode_line(line: &[u8]) -> Option<AgentEvent> {
    let text = String::from_utf8_lossy(line);
    if text.trim().is_empty() {
        return None;
    }
    let event = AgentEvent::parse_line(&text);
    if event.is_none() {
        tracing::debug!(line = %single_line_preview(&text, 120), "skipping non-event output line");
    }
    event
}

/// Lazy, ordered, finite sequence of events pulled from an async reader.
///
/// Ends when the reader reaches EOF (or fails), after flushing any trailing
/// unterminated line.
pub struct EventStream<R> {
    reader: R,
    decoder: EventDecoder,
    ready: VecDeque<AgentEvent>,
    read_buf: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: EventDecoder::new(),
            ready: VecDeque::new(),
            read_buf: vec![0u8; READ_CHUNK_BYTES],
            finished: false,
        }
    }

    /// Next decoded event, or `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => {
                    self.finished = true;
                    self.ready.extend(self.decoder.finish());
                }
                Ok(n) => {
                    let events = self.decoder.push(&self.read_buf[..n]);
                    self.ready.extend(events);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "agent output stream failed; ending decode");
                    self.finished = true;
                    self.ready.extend(self.decoder.finish());
                }
            }
        }
    }
}
