//! Incremental decoding of the analyzer's `data: <json>` line stream.
//!
//! The analyzer answers with a chunked body of newline-separated lines. Lines
//! starting with `data: ` carry one JSON event each; everything else is
//! ignored. Chunk boundaries are arbitrary, so bytes are buffered until a full
//! line is available and only then decoded as UTF-8.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{StreamDecodeError, StreamError};

/// Prefix marking an event line.
pub const DATA_PREFIX: &str = "data: ";

/// One decoded unit of the response stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StreamEvent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: serde_json::Map::new(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Events in arrival order; item errors do not end the stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, StreamError>> + Send>>;

/// Splits raw bytes into lines and decodes `data: ` lines into events.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buf: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, StreamDecodeError>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(decoded) = decode_line(&self.buf[start..end]) {
                out.push(decoded);
            }
            start = end + 1;
        }
        self.buf.drain(..start);
        out
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<Result<StreamEvent, StreamDecodeError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<StreamEvent, StreamDecodeError>> {
    let line = String::from_utf8_lossy(raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let payload = line.strip_prefix(DATA_PREFIX)?;

    Some(
        serde_json::from_str::<StreamEvent>(payload).map_err(|source| StreamDecodeError {
            line: line.to_string(),
            source,
        }),
    )
}

/// Turn a response byte stream into an event stream.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_event_stream<S, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    struct State {
        bytes: BoxStream<'static, Result<Bytes, String>>,
        decoder: SseLineDecoder,
        pending: VecDeque<Result<StreamEvent, StreamError>>,
        finished: bool,
    }

    let state = State {
        bytes: bytes.map(|chunk| chunk.map_err(|e| e.to_string())).boxed(),
        decoder: SseLineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let decoded = st.decoder.push(&chunk);
                    st.pending
                        .extend(decoded.into_iter().map(|r| r.map_err(StreamError::from)));
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Err(StreamError::Transport(e)));
                }
                None => {
                    st.finished = true;
                    let decoded = st.decoder.finish();
                    st.pending
                        .extend(decoded.into_iter().map(|r| r.map_err(StreamError::from)));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn contents(events: Vec<Result<StreamEvent, StreamDecodeError>>) -> Vec<String> {
        events
            .into_iter()
            .map(|e| e.expect("event should decode").content)
            .collect()
    }

    #[test]
    fn decodes_complete_lines() {
        let mut decoder = SseLineDecoder::new();
        let out = decoder.push(b"data: {\"content\":\"A\"}\ndata: {\"content\":\"B\"}\n");
        assert_eq!(contents(out), vec!["A", "B"]);
    }

    #[test]
    fn buffers_lines_split_across_chunks() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"cont").is_empty());
        assert!(decoder.push(b"ent\":\"hel").is_empty());
        let out = decoder.push(b"lo\"}\n");
        assert_eq!(contents(out), vec!["hello"]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let line = "data: {\"content\":\"caf\u{e9} \u{2713}\"}\n".as_bytes();
        // Split inside the two-byte é.
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        let out = decoder.push(&line[split..]);
        assert_eq!(contents(out), vec!["caf\u{e9} \u{2713}"]);
    }

    #[test]
    fn ignores_non_data_lines_and_crlf() {
        let mut decoder = SseLineDecoder::new();
        let out = decoder.push(b": keepalive\r\nevent: message\r\n\r\ndata: {\"content\":\"x\"}\r\n");
        assert_eq!(contents(out), vec!["x"]);
    }

    #[test]
    fn malformed_line_is_reported_and_decoding_continues() {
        let mut decoder = SseLineDecoder::new();
        let out = decoder.push(b"data: {not json}\ndata: {\"content\":\"ok\"}\n");
        assert_eq!(out.len(), 2);
        let err = out[0].as_ref().unwrap_err();
        assert_eq!(err.line, "data: {not json}");
        assert_eq!(out[1].as_ref().unwrap().content, "ok");
    }

    #[test]
    fn keeps_opaque_fields() {
        let mut decoder = SseLineDecoder::new();
        let out = decoder.push(b"data: {\"content\":\"c\",\"type\":\"ai\",\"step\":3}\n");
        let event = out.into_iter().next().unwrap().unwrap();
        assert_eq!(event.extra.get("type"), Some(&serde_json::json!("ai")));
        assert_eq!(event.extra.get("step"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"content\":\"tail\"}").is_empty());
        assert_eq!(contents(decoder.finish()), vec!["tail"]);
        assert!(decoder.finish().is_empty());
    }

    #[tokio::test]
    async fn event_stream_preserves_arrival_order() {
        let chunks = vec![
            Ok::<_, Infallible>(Bytes::from_static(b"data: {\"content\":\"A\"}\nda")),
            Ok(Bytes::from_static(b"ta: {\"content\":\"B\"}\ndata: bad\n")),
            Ok(Bytes::from_static(b"data: {\"content\":\"C\"}")),
        ];
        let items: Vec<_> = decode_event_stream(stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 4);
        assert_eq!(items[0].as_ref().unwrap().content, "A");
        assert_eq!(items[1].as_ref().unwrap().content, "B");
        assert!(matches!(items[2], Err(StreamError::Decode(_))));
        assert_eq!(items[3].as_ref().unwrap().content, "C");
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"A\"}\n")),
            Err("connection reset"),
            Ok(Bytes::from_static(b"data: {\"content\":\"never\"}\n")),
        ];
        let items: Vec<_> = decode_event_stream(stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        match &items[1] {
            Err(StreamError::Transport(msg)) => assert_eq!(msg, "connection reset"),
            other => panic!("unexpected item: {other:?}"),
        }
    }
}
