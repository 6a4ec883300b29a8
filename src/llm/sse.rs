// Server-sent events: split a byte stream into `data:` payloads.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

use super::LlmError;

/// Incremental line decoder for an SSE body.
///
/// Bytes are buffered until a full line arrives, so a UTF-8 sequence split
/// across network chunks is decoded whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes; returns the data payloads of every completed line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            self.take_line(&String::from_utf8_lossy(&line), &mut events);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        self.take_line(&String::from_utf8_lossy(&rest), &mut events);
        events
    }

    fn take_line(&mut self, line: &str, events: &mut Vec<String>) {
        if self.done {
            return;
        }
        let line = line.trim();
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
            } else if !data.is_empty() {
                events.push(data.to_string());
            }
        }
    }
}

struct EventState<S> {
    inner: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Adapt an HTTP body stream into a stream of SSE data payloads.
pub fn data_events<S, B, E>(body: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<LlmError> + Send,
{
    let state = EventState {
        inner: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished || st.decoder.is_done() {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => st.pending.extend(st.decoder.feed(bytes.as_ref())),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.feed(b":1}\n\ndata: two\n"), vec!["{\"a\":1}", "two"]);
    }

    #[test]
    fn test_done_sentinel_stops_decoding() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\ndata: [DONE]\ndata: late\n");
        assert_eq!(events, vec!["one"]);
        assert!(decoder.is_done());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_ignores_comments_and_event_names() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: message\ndata: hi\r\n");
        assert_eq!(events, vec!["hi"]);
    }

    #[test]
    fn test_trailing_line_flushed() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: caf\xC3").is_empty());
        assert_eq!(decoder.feed(b"\xA9 ouvert\n"), vec!["café ouvert"]);
    }

    #[tokio::test]
    async fn test_data_events_keeps_split_chars() {
        let chunks: Vec<Result<&'static [u8], LlmError>> = vec![
            Ok(&b"data: \xE2\x80"[..]),
            Ok(&b"\x9CHalt!\xE2\x80\x9D \xE2"[..]),
            Ok(&b"\x80\x94 the guard\n"[..]),
        ];
        let events: Vec<_> = data_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), "\u{201C}Halt!\u{201D} \u{2014} the guard");
    }

    #[tokio::test]
    async fn test_data_events_stream() {
        let chunks: Vec<Result<&'static [u8], LlmError>> = vec![
            Ok(&b"data: al"[..]),
            Ok(&b"pha\ndata: beta\n"[..]),
            Err(LlmError::Malformed("connection reset".into())),
            Ok(&b"data: never\n"[..]),
        ];
        let events: Vec<_> = data_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap(), "alpha");
        assert_eq!(events[1].as_ref().unwrap(), "beta");
        assert!(events[2].is_err());
    }
}
