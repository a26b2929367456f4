//! Shared SSE streaming infrastructure for provider adapters.
//!
//! Receive the response body as byte chunks, buffer them, split on `\n\n`,
//! extract `data:` payloads, and feed each payload to a provider-specific
//! parser that returns `Vec<Result<StreamEvent>>`.
//!
//! - [`drain_data_lines`] -- pull complete `data:` payloads from an SSE buffer
//! - [`sse_stream`] -- build a `BoxStream` from a chunk stream + parser closure

use futures_core::Stream;
use futures_util::StreamExt;
use ka_domain::error::Result;
use ka_domain::stream::{BoxStream, StreamEvent};

/// Extract complete `data:` payloads from an SSE byte buffer.
///
/// SSE events are delimited by `\n\n`. Each event block may contain
/// `event:`, `data:`, `id:`, or `retry:` lines. Only `data:` lines are kept.
///
/// The buffer is drained in-place: consumed bytes are removed and any
/// trailing partial event remains for the next call. Buffering bytes rather
/// than text keeps multi-byte characters split across chunks intact.
pub(crate) fn drain_data_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let block: Vec<u8> = buffer.drain(..pos).collect();
        buffer.drain(..2);

        let block = String::from_utf8_lossy(&block);
        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`BoxStream`] of events from a stream of body chunks and a
/// provider-specific parser closure.
///
/// The closure is `FnMut` because parsers keep state across payloads
/// (e.g. which tool call id belongs to which stream index).
///
/// The stream:
/// 1. Buffers incoming chunks and drains complete SSE events
/// 2. Flushes the remaining buffer when the body closes
/// 3. Emits a fallback `Done` event if the parser never produced one
/// 4. Ends after the first transport error
pub(crate) fn sse_stream<S, B, F>(
    chunks: S,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();
        let mut done_emitted = false;

        loop {
            match chunks.next().await {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(bytes.as_ref());

                    for data in drain_data_lines(&mut buffer) {
                        for event in parse_data(&data) {
                            if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                done_emitted = true;
                            }
                            yield event;
                        }
                    }
                }
                None => {
                    // Body closed -- flush any remaining partial event.
                    if !String::from_utf8_lossy(&buffer).trim().is_empty() {
                        buffer.extend_from_slice(b"\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            for event in parse_data(&data) {
                                if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                    done_emitted = true;
                                }
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ka_domain::error::Error;

    fn buf(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    fn token_parser(data: &str) -> Vec<Result<StreamEvent>> {
        vec![Ok(StreamEvent::Token {
            text: data.to_string(),
        })]
    }

    #[test]
    fn drain_single_complete_event() {
        let mut b = buf("event: message\ndata: {\"hello\":\"world\"}\n\n");
        let lines = drain_data_lines(&mut b);
        assert_eq!(lines, vec!["{\"hello\":\"world\"}"]);
        assert!(b.is_empty());
    }

    #[test]
    fn drain_multiple_events() {
        let mut b = buf("data: first\n\ndata: second\n\n");
        let lines = drain_data_lines(&mut b);
        assert_eq!(lines, vec!["first", "second"]);
        assert!(b.is_empty());
    }

    #[test]
    fn drain_partial_event_stays_in_buffer() {
        let mut b = buf("data: complete\n\ndata: partial");
        let lines = drain_data_lines(&mut b);
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(b, buf("data: partial"));
    }

    #[test]
    fn drain_ignores_non_data_lines() {
        let mut b = buf("event: ping\nid: 42\nretry: 5000\ndata: payload\n\n");
        let lines = drain_data_lines(&mut b);
        assert_eq!(lines, vec!["payload"]);
    }

    #[test]
    fn drain_keeps_multibyte_char_split_across_chunks() {
        let text = "data: Akureyri °C\n\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC2).unwrap() + 1;

        let mut b = text[..split].to_vec();
        assert!(drain_data_lines(&mut b).is_empty());

        b.extend_from_slice(&text[split..]);
        assert_eq!(drain_data_lines(&mut b), vec!["Akureyri °C"]);
    }

    #[tokio::test]
    async fn stream_flushes_trailing_event_and_adds_done() {
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, Error>(b"data: one\n\nda".to_vec()),
            Ok(b"ta: two".to_vec()),
        ]);
        let events: Vec<_> = sse_stream(chunks, token_parser).collect().await;

        let texts: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::Token { text }) => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Done { .. }))));
    }

    #[tokio::test]
    async fn stream_can_be_driven_from_a_spawned_task() {
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, Error>(b"data: one\n\n".to_vec()),
            Ok(b"data: two\n\n".to_vec()),
        ]);
        let stream = sse_stream(chunks, token_parser);

        let events = tokio::spawn(async move { stream.collect::<Vec<_>>().await })
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], Ok(StreamEvent::Token { text }) if text == "two"));
    }

    #[tokio::test]
    async fn stream_stops_after_transport_error() {
        let chunks = futures_util::stream::iter(vec![
            Ok::<_, Error>(b"data: one\n\n".to_vec()),
            Err(Error::Http("connection reset".into())),
            Ok(b"data: never\n\n".to_vec()),
        ]);
        let events: Vec<_> = sse_stream(chunks, token_parser).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(StreamEvent::Token { text }) if text == "one"));
        assert!(matches!(&events[1], Err(Error::Http(_))));
    }
}
