//! Streaming aggregator: folds the NDJSON byte stream of one generation into display updates.
//!
//! The aggregator is a plain state machine driven with explicit timestamps; the async
//! driver in [`super::dispatcher`] feeds it chunks as they arrive and forwards the
//! flushes it produces to the display updater.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use crate::llm::GenerationChunk;

/// Final content when the stream ended without any text.
pub const EMPTY_RESPONSE_MESSAGE: &str = "Desculpe, não consegui obter uma resposta completa.";

/// Final content when the stream failed mid-way.
pub const STREAM_ERROR_MESSAGE: &str =
    "Ocorreu um erro ao obter a resposta do Ollama. Tente novamente mais tarde.";

const ELLIPSIS: &str = "...";

/// Interim flushes are forced once the text is within this many characters of the limit.
const NEAR_LIMIT_MARGIN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Minimum time between interim flushes.
    pub update_interval: Duration,
    /// Maximum characters in one displayed message.
    pub max_display_len: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(1000),
            max_display_len: 2000,
        }
    }
}

/// What the driver should do after a chunk was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStep {
    /// Keep reading; nothing to show yet.
    Pending,
    /// Keep reading; show this interim content.
    Flush(String),
    /// The service sent `done`; stop reading and finish.
    Done,
}

/// Accumulated response of one cycle.
#[derive(Debug)]
pub struct StreamAggregator {
    settings: AggregatorSettings,
    text: String,
    /// Length of `text` in characters.
    text_chars: usize,
    last_flush: Instant,
    done: bool,
    /// Bytes after the last newline, waiting for the rest of their line.
    partial: Vec<u8>,
}

impl StreamAggregator {
    pub fn new(settings: AggregatorSettings, started_at: Instant) -> Self {
        Self {
            settings,
            text: String::new(),
            text_chars: 0,
            last_flush: started_at,
            done: false,
            partial: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one transport chunk received at `now`.
    pub fn on_chunk(&mut self, chunk: &[u8], now: Instant) -> ChunkStep {
        if self.done {
            return ChunkStep::Done;
        }
        self.partial.extend_from_slice(chunk);
        while let Some(i) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=i).collect();
            if let Some(parsed) = decode_line(&line) {
                self.apply(parsed);
            }
            if self.done {
                self.partial.clear();
                return ChunkStep::Done;
            }
        }
        // A tail that is already a whole object is not held back for a newline that may never come.
        // Whatever arrives after it is decoded as a separate line.
        if !self.partial.is_empty() {
            if let Some(parsed) = decode_line(&self.partial) {
                self.partial.clear();
                self.apply(parsed);
                if self.done {
                    return ChunkStep::Done;
                }
            }
        }

        let interval_elapsed = now.duration_since(self.last_flush) > self.settings.update_interval;
        if !(interval_elapsed || self.near_limit()) {
            return ChunkStep::Pending;
        }
        self.last_flush = now;
        if self.text.is_empty() {
            ChunkStep::Pending
        } else {
            ChunkStep::Flush(self.interim_display())
        }
    }

    /// Final content once the stream ended, naturally or through `done`.
    pub fn finish(mut self) -> String {
        if !self.done && !self.partial.is_empty() {
            let tail = std::mem::take(&mut self.partial);
            if let Some(parsed) = decode_line(&tail) {
                self.apply(parsed);
            }
        }
        if self.text.is_empty() {
            EMPTY_RESPONSE_MESSAGE.to_string()
        } else {
            truncate_chars(&self.text, self.settings.max_display_len).to_string()
        }
    }

    /// Final content when the transport failed; accumulated text is discarded.
    pub fn fail(self) -> String {
        log::debug!(
            "discarding {} accumulated characters after stream failure",
            self.text_chars
        );
        STREAM_ERROR_MESSAGE.to_string()
    }

    fn apply(&mut self, chunk: GenerationChunk) {
        if let Some(fragment) = chunk.response {
            self.text_chars += fragment.chars().count();
            self.text.push_str(&fragment);
        }
        if chunk.done {
            self.done = true;
        }
    }

    fn near_limit(&self) -> bool {
        self.text_chars
            >= self
                .settings
                .max_display_len
                .saturating_sub(NEAR_LIMIT_MARGIN)
    }

    /// Interim content reserves room for the ellipsis when the text overflows.
    fn interim_display(&self) -> String {
        let max = self.settings.max_display_len;
        if self.text_chars > max {
            let mut out = truncate_chars(&self.text, max.saturating_sub(ELLIPSIS.len())).to_string();
            out.push_str(ELLIPSIS);
            out
        } else {
            self.text.clone()
        }
    }
}

/// Decode one stream line. Blank lines, malformed lines and non-object values yield `None`.
fn decode_line(line: &[u8]) -> Option<GenerationChunk> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    // derived struct deserializers also accept arrays; only objects are events
    match serde_json::from_str::<Value>(line).ok()? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

/// First `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
