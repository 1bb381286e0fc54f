//! Newline-delimited JSON line splitting for streaming chat responses.
//!
//! Ported from the buffering SSE line-splitter in `advisory/streaming.rs`
//! (`parse_openai_stream`), adapted from `data: `-prefixed SSE lines to the
//! bare NDJSON records the external-interfaces contract (spec §6) describes:
//! each line carries either an incremental text field or a terminal
//! `{"done": true}` marker.

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct ChatStreamRecord {
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// Accumulates raw bytes and yields complete, parsed NDJSON records as whole
/// lines become available. Bytes with no trailing newline are held until the
/// next `push` or `finish`.
#[derive(Default)]
pub struct LineSplitter {
    buffer: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning any complete records found so far.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ChatStreamRecord> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        self.drain_lines()
    }

    /// Flush whatever remains in the buffer as a final line, if non-empty.
    pub fn finish(&mut self) -> Vec<ChatStreamRecord> {
        let mut out = self.drain_lines();
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if !rest.is_empty() {
            if let Some(record) = parse_line(rest) {
                out.push(record);
            }
        }
        out
    }

    fn drain_lines(&mut self) -> Vec<ChatStreamRecord> {
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer = self.buffer[pos + 1..].to_string();
            if line.is_empty() {
                continue;
            }
            if let Some(record) = parse_line(&line) {
                out.push(record);
            }
        }
        out
    }
}

/// A line lacking both a text delta and a done marker is a no-op per §6.
fn parse_line(line: &str) -> Option<ChatStreamRecord> {
    match serde_json::from_str::<ChatStreamRecord>(line) {
        Ok(record) if record.delta.is_some() || record.done => Some(record),
        Ok(_) => None,
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_across_chunk_boundaries() {
        let mut splitter = LineSplitter::new();
        let mut records = splitter.push(br#"{"delta":"hel"#);
        assert!(records.is_empty());
        records.extend(splitter.push(b"lo\"}\n{\"delta\":\" world\"}\n"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].delta.as_deref(), Some("hello"));
        assert_eq!(records[1].delta.as_deref(), Some(" world"));
    }

    #[test]
    fn done_marker_without_delta_is_recognized() {
        let mut splitter = LineSplitter::new();
        let records = splitter.push(b"{\"done\":true}\n");
        assert_eq!(records.len(), 1);
        assert!(records[0].done);
    }

    #[test]
    fn malformed_and_empty_lines_are_skipped() {
        let mut splitter = LineSplitter::new();
        let records = splitter.push(b"\nnot json\n{}\n{\"delta\":\"x\"}\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].delta.as_deref(), Some("x"));
    }

    #[test]
    fn finish_flushes_trailing_partial_line() {
        let mut splitter = LineSplitter::new();
        splitter.push(b"{\"delta\":\"a\"}\n{\"delta\":\"b\"}");
        let tail = splitter.finish();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].delta.as_deref(), Some("b"));
    }
}
