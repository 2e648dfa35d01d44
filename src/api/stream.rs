use std::fmt;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};

use super::models::ChatChunk;
use crate::error::ConnectionError;

/// Line-level decoder for one streaming chat exchange.
///
/// Each line of the response body is one self-contained JSON record with an
/// optional content fragment and a completion flag. Lines that fail to parse
/// are protocol noise and are skipped; once a record carries `done: true` the
/// decoder latches and ignores everything after it.
pub(crate) struct StreamDecoder {
    done: bool,
}

impl StreamDecoder {
    pub(crate) fn new() -> Self {
        Self { done: false }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Decode one line into a fragment. Returns `None` for malformed lines,
    /// empty fragments, and anything after the completion record.
    pub(crate) fn decode_line(&mut self, line: &str) -> Option<String> {
        if self.done {
            return None;
        }

        let chunk: ChatChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("skipping malformed stream line: {}", e);
                return None;
            }
        };

        if chunk.done {
            self.done = true;
        }

        let content = chunk.message.map(|m| m.content).unwrap_or_default();
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }
}

/// Cursor over the text fragments of exactly one streaming exchange.
///
/// Owns the response body for that exchange; dropping the cursor releases
/// the connection. The sequence is single-pass and not restartable — a new
/// exchange requires a new cursor from `OllamaClient::stream_completion`.
pub struct CompletionStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    byte_buf: Vec<u8>,
    buffer: String,
    decoder: StreamDecoder,
}

impl CompletionStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self {
            body: response.bytes_stream().boxed(),
            byte_buf: Vec::new(),
            buffer: String::new(),
            decoder: StreamDecoder::new(),
        }
    }

    /// Pull the next non-empty fragment. `Ok(None)` means the exchange is
    /// exhausted; a transport fault while reading surfaces as
    /// `ConnectionError` at the point of failure.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            while let Some(end) = self.buffer.find('\n') {
                if self.decoder.is_done() {
                    return Ok(None);
                }
                let line = self.buffer[..end].trim().to_string();
                self.buffer.drain(..=end);
                if line.is_empty() {
                    continue;
                }
                if let Some(fragment) = self.decoder.decode_line(&line) {
                    return Ok(Some(fragment));
                }
            }

            if self.decoder.is_done() {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(bytes)) => self.extend(&bytes),
                Some(Err(e)) => {
                    return Err(ConnectionError::Network(format!("stream read failed: {}", e)))
                }
                None => {
                    // Body ended; a trailing unterminated line is still a record.
                    let rest = self.buffer.trim().to_string();
                    self.buffer.clear();
                    if rest.is_empty() {
                        return Ok(None);
                    }
                    return Ok(self.decoder.decode_line(&rest));
                }
            }
        }
    }

    /// Append as much valid UTF-8 as the byte buffer holds, keeping any
    /// partial trailing sequence for the next chunk.
    fn extend(&mut self, bytes: &[u8]) {
        self.byte_buf.extend_from_slice(bytes);
        match std::str::from_utf8(&self.byte_buf) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.byte_buf.clear();
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to == 0 {
                    return;
                }
                if let Ok(text) = std::str::from_utf8(&self.byte_buf[..valid_up_to]) {
                    self.buffer.push_str(text);
                }
                self.byte_buf.drain(..valid_up_to);
            }
        }
    }
}

// The body stream itself is opaque.
impl fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionStream")
            .field("buffered", &self.buffer.len())
            .field("done", &self.decoder.is_done())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_line(content: &str) -> String {
        format!(
            r#"{{"message":{{"content":{}}},"done":false}}"#,
            serde_json::to_string(content).unwrap()
        )
    }

    fn done_line() -> String {
        r#"{"message":{"content":""},"done":true}"#.to_string()
    }

    fn decode_all(lines: &[String]) -> Vec<String> {
        let mut decoder = StreamDecoder::new();
        let mut fragments = Vec::new();
        for line in lines {
            if decoder.is_done() {
                break;
            }
            if let Some(fragment) = decoder.decode_line(line) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    #[test]
    fn decodes_fragments_in_order() {
        let lines = vec![ok_line("Hello"), ok_line(", "), ok_line("world"), done_line()];
        assert_eq!(decode_all(&lines), vec!["Hello", ", ", "world"]);
    }

    #[test]
    fn skips_malformed_lines() {
        let lines = vec![
            ok_line("Hi"),
            "garbage".to_string(),
            ok_line("!"),
            done_line(),
        ];
        assert_eq!(decode_all(&lines), vec!["Hi", "!"]);
    }

    #[test]
    fn drops_empty_fragments() {
        let lines = vec![ok_line(""), ok_line("World"), done_line()];
        assert_eq!(decode_all(&lines), vec!["World"]);
    }

    #[test]
    fn stops_at_first_done_record() {
        let lines = vec![ok_line("a"), done_line(), ok_line("b")];
        assert_eq!(decode_all(&lines), vec!["a"]);

        let mut decoder = StreamDecoder::new();
        decoder.decode_line(&done_line());
        assert!(decoder.is_done());
        assert_eq!(decoder.decode_line(&ok_line("late")), None);
    }

    #[test]
    fn done_record_with_content_still_emits() {
        let mut decoder = StreamDecoder::new();
        let line = r#"{"message":{"content":"end"},"done":true}"#;
        assert_eq!(decoder.decode_line(line), Some("end".to_string()));
        assert!(decoder.is_done());
    }

    #[test]
    fn record_without_message_is_not_a_fragment() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.decode_line(r#"{"done":false}"#), None);
        assert!(!decoder.is_done());
    }
}
