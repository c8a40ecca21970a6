//! Line parser for streamed chat completions
//!
//! The body is a sequence of `data: {json}` lines ending with
//! `data: [DONE]`. Blank lines and payloads that fail to parse are skipped.

use super::types::StreamChunk;

/// One meaningful line of the stream
#[derive(Debug, Clone)]
pub enum SseItem {
    Chunk(StreamChunk),
    Done,
}

/// Splits raw body bytes into lines, buffering partial lines between feeds
#[derive(Debug, Default)]
pub struct SseLineParser {
    buffer: Vec<u8>,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the items of every complete line
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseItem> {
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();

        // Split on raw bytes so multi-byte characters can span feeds
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = parse_line(&String::from_utf8_lossy(&line)) {
                items.push(item);
            }
        }

        items
    }

    /// Flush a final line that had no trailing newline
    pub fn finish(&mut self) -> Option<SseItem> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<SseItem> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(SseItem::Done);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Some(SseItem::Chunk(chunk)),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparsable stream line");
            None
        }
    }
}
