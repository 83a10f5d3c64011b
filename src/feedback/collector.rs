//! Line-block collector.
//!
//! Turns an arbitrarily chunked byte stream into discrete feedback blocks.
//! A block ends at the first blank line after some content; further blank
//! lines are ignored so a double blank never yields an empty submission.
//! End of input acts as one final blank line.

use chrono::{DateTime, Utc};

/// One unit of operator input, delimited by a blank line or end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackBlock {
    /// Newline-joined lines with the trailing blank suffix trimmed.
    pub text: String,
    /// 1-based, increases by one per emitted block.
    pub block_index: u64,
    pub completed_at: DateTime<Utc>,
}

/// Incremental line-to-block state machine.
#[derive(Debug, Default)]
pub struct LineBlockCollector {
    carry: Vec<u8>,
    buffer: String,
    last_line_was_blank: bool,
    blocks_emitted: u64,
}

impl LineBlockCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of raw input, returning any blocks it completed.
    ///
    /// Chunk boundaries may fall anywhere, including inside a `\r\n` pair or
    /// a multi-byte UTF-8 sequence; only complete lines are decoded.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<FeedbackBlock> {
        self.carry.extend_from_slice(chunk);

        let mut blocks = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = decode_line(&self.carry[start..end]);
            if let Some(block) = self.process_line(&line) {
                blocks.push(block);
            }
            start = end + 1;
        }
        self.carry.drain(..start);
        blocks
    }

    /// Convenience wrapper over [`Self::push_chunk`] for text input.
    pub fn push_str(&mut self, chunk: &str) -> Vec<FeedbackBlock> {
        self.push_chunk(chunk.as_bytes())
    }

    /// Signal end of input.
    ///
    /// Any unterminated remainder is appended verbatim and the submit signal
    /// fires unconditionally, so a final block without a trailing blank line
    /// is not lost.
    pub fn finish(&mut self) -> Option<FeedbackBlock> {
        if !self.carry.is_empty() {
            let rest = String::from_utf8_lossy(&self.carry).into_owned();
            self.buffer.push_str(&rest);
            self.carry.clear();
        }
        let block = self.submit_signal();
        self.last_line_was_blank = true;
        block
    }

    /// Whether a partially entered block is waiting for its boundary.
    pub fn has_pending_input(&self) -> bool {
        !self.buffer.trim().is_empty() || !self.carry.iter().all(u8::is_ascii_whitespace)
    }

    pub fn blocks_emitted(&self) -> u64 {
        self.blocks_emitted
    }

    fn process_line(&mut self, line: &str) -> Option<FeedbackBlock> {
        if !line.trim().is_empty() {
            self.buffer.push_str(line);
            self.buffer.push('\n');
            self.last_line_was_blank = false;
            return None;
        }

        if self.last_line_was_blank {
            return None;
        }
        self.last_line_was_blank = true;
        self.submit_signal()
    }

    fn submit_signal(&mut self) -> Option<FeedbackBlock> {
        let raw = std::mem::take(&mut self.buffer);
        let text = raw.trim_end();
        if text.trim().is_empty() {
            return None;
        }
        self.blocks_emitted += 1;
        Some(FeedbackBlock {
            text: text.to_string(),
            block_index: self.blocks_emitted,
            completed_at: Utc::now(),
        })
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
