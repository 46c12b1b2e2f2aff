//! # Streaming Consumer
//!
//! Pulls byte chunks from a transport, decodes records and yields a tagged
//! [`StreamEvent`] per meaningful record. The caller drives it with
//! `next().await` and decides what to do with each event.
//!
//! ```text
//!            first byte            end of input / transport error / error record
//!   Idle ───────────────▶ Streaming ─────────────────────────────────────────▶ Done
//!                          │    ▲
//!                          └────┘ each record
//! ```

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};

use crate::stream::decoder::LineDecoder;
use crate::stream::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Streaming,
    Done,
}

/// Outcome of one step of a reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Ongoing(String),
    Completed,
    Failed(String),
}

pub struct StreamConsumer<S> {
    source: S,
    decoder: LineDecoder,
    pending: VecDeque<StreamEvent>,
    state: ConsumerState,
    fragments: usize,
    skipped: usize,
}

impl<S, E> StreamConsumer<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            state: ConsumerState::Idle,
            fragments: 0,
            skipped: 0,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Next event, or `None` once `Completed` or `Failed` has been returned.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.state == ConsumerState::Done {
                return None;
            }

            match self.source.next().await {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.state = ConsumerState::Streaming;
                    debug!("Reply chunk received: {} bytes", chunk.len());
                    let lines = self.decoder.push(&chunk);
                    self.handle_lines(lines);
                }
                Some(Err(e)) => {
                    warn!("Reply stream broke after {} fragments: {}", self.fragments, e);
                    self.state = ConsumerState::Done;
                    self.pending.push_back(StreamEvent::Failed(e.to_string()));
                }
                None => {
                    let lines = self.decoder.finish();
                    self.handle_lines(lines);
                    if self.state != ConsumerState::Done {
                        info!(
                            "Reply stream ended: {} fragments, {} skipped records",
                            self.fragments, self.skipped
                        );
                        self.state = ConsumerState::Done;
                        self.pending.push_back(StreamEvent::Completed);
                    }
                }
            }
        }
    }

    /// Adapts the consumer into a `Stream` of events.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent>
    where
        S: 'static,
        E: 'static,
    {
        futures::stream::unfold(self, |mut consumer| async move {
            consumer.next().await.map(|event| (event, consumer))
        })
    }

    fn handle_lines(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.state == ConsumerState::Done {
                // Anything after an error record is ignored.
                break;
            }
            if line.is_empty() {
                continue;
            }
            match Record::parse(&line) {
                Some(Record::TextDelta { text_delta }) => {
                    if !text_delta.is_empty() {
                        self.fragments += 1;
                        self.pending.push_back(StreamEvent::Ongoing(text_delta));
                    }
                }
                Some(Record::Error { error }) => {
                    warn!("Server reported stream error: {}", error);
                    self.state = ConsumerState::Done;
                    self.pending.push_back(StreamEvent::Failed(error));
                }
                Some(Record::Finish { .. }) | Some(Record::Unknown) => {}
                None => {
                    self.skipped += 1;
                    debug!("Skipping unparseable record: {}", line);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type Chunk = Result<Bytes, String>;

    fn chunks_of(body: &[u8], sizes: &[usize]) -> Vec<Chunk> {
        let mut out = Vec::new();
        let mut start = 0;
        for &size in sizes {
            let end = (start + size).min(body.len());
            out.push(Ok(Bytes::copy_from_slice(&body[start..end])));
            start = end;
        }
        if start < body.len() {
            out.push(Ok(Bytes::copy_from_slice(&body[start..])));
        }
        out
    }

    async fn collect(chunks: Vec<Chunk>) -> Vec<StreamEvent> {
        let mut consumer = StreamConsumer::new(stream::iter(chunks));
        let mut events = Vec::new();
        while let Some(event) = consumer.next().await {
            events.push(event);
        }
        events
    }

    fn body(fragments: &[&str]) -> String {
        let mut body: String = fragments.iter().map(|f| Record::text(*f).encode()).collect();
        body.push_str(&Record::finish().encode());
        body
    }

    fn concatenated(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Ongoing(f) => Some(f.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fragments_in_order_then_completed() {
        let body = body(&["Paris ", "is ", "lovely"]);
        let events = collect(chunks_of(body.as_bytes(), &[])).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Ongoing("Paris ".into()),
                StreamEvent::Ongoing("is ".into()),
                StreamEvent::Ongoing("lovely".into()),
                StreamEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_concatenation_independent_of_chunking() {
        let fragments = ["Kyōto ", "🏯 and ", "Ōsaka", " — ", "très bien"];
        let body = body(&fragments);
        let expected: String = fragments.concat();
        let bytes = body.as_bytes();

        for size in 1..=7 {
            let sizes = vec![size; bytes.len() / size + 1];
            let events = collect(chunks_of(bytes, &sizes)).await;
            assert_eq!(concatenated(&events), expected, "chunk size {size}");
            assert_eq!(events.last(), Some(&StreamEvent::Completed));
        }
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let mut body = String::new();
        body.push_str(&Record::text("a").encode());
        body.push_str("garbage line\n");
        body.push_str("0:{broken json\n");
        body.push_str("2:[{\"some\":\"data\"}]\n");
        body.push_str("\n");
        body.push_str(&Record::text("b").encode());

        let events = collect(chunks_of(body.as_bytes(), &[])).await;
        assert_eq!(concatenated(&events), "ab");
        assert_eq!(events.last(), Some(&StreamEvent::Completed));
    }

    #[tokio::test]
    async fn test_unterminated_last_record_is_used() {
        let body = Record::text("tail").encode();
        let body = body.trim_end_matches('\n');
        let events = collect(chunks_of(body.as_bytes(), &[4])).await;
        assert_eq!(
            events,
            vec![StreamEvent::Ongoing("tail".into()), StreamEvent::Completed]
        );
    }

    #[tokio::test]
    async fn test_transport_error_fails_after_fragments() {
        let mut chunks = chunks_of(body(&["Hel", "lo"]).as_bytes(), &[]);
        chunks.truncate(1);
        chunks.push(Err("connection reset".to_string()));
        chunks.push(Ok(Bytes::from_static(b"0:{\"type\":\"textDelta\",\"textDelta\":\"late\"}\n")));

        let events = collect(chunks).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Ongoing("Hel".into()),
                StreamEvent::Ongoing("lo".into()),
                StreamEvent::Failed("connection reset".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_record_fails_stream() {
        let mut body = Record::text("partial").encode();
        body.push_str(&Record::error("request timed out").encode());
        body.push_str(&Record::text("ignored").encode());

        let events = collect(chunks_of(body.as_bytes(), &[])).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Ongoing("partial".into()),
                StreamEvent::Failed("request timed out".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let body = body(&["x"]);
        let mut consumer = StreamConsumer::new(stream::iter(chunks_of(body.as_bytes(), &[])));
        assert_eq!(consumer.state(), ConsumerState::Idle);

        assert_eq!(consumer.next().await, Some(StreamEvent::Ongoing("x".into())));
        assert_eq!(consumer.state(), ConsumerState::Streaming);

        assert_eq!(consumer.next().await, Some(StreamEvent::Completed));
        assert_eq!(consumer.state(), ConsumerState::Done);
        assert_eq!(consumer.next().await, None);
    }

    #[test]
    fn test_waits_for_first_chunk() {
        let mut consumer = StreamConsumer::new(stream::pending::<Chunk>());
        let mut next = tokio_test::task::spawn(consumer.next());
        tokio_test::assert_pending!(next.poll());
        drop(next);
        assert_eq!(consumer.state(), ConsumerState::Idle);
    }

    #[tokio::test]
    async fn test_empty_body_completes() {
        let events = collect(Vec::new()).await;
        assert_eq!(events, vec![StreamEvent::Completed]);
    }

    #[tokio::test]
    async fn test_into_stream_yields_same_events() {
        let body = body(&["a", "b"]);
        let consumer = StreamConsumer::new(stream::iter(chunks_of(body.as_bytes(), &[3])));
        let events: Vec<_> = consumer.into_stream().collect().await;
        assert_eq!(concatenated(&events), "ab");
    }
}
