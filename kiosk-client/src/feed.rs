//! Event stream decoding
//!
//! The server pushes `text/event-stream` bodies where every event carries one
//! wire line in its `data:` field. [`SseDecoder`] turns raw chunks into those
//! lines; [`EventFeed`] parses them into typed events.

use std::marker::PhantomData;
use std::str::FromStr;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use shared::message::WireError;

use crate::error::{ClientError, ClientResult};

/// Incremental `data:` line extractor
///
/// Chunks may split lines (and UTF-8 sequences) anywhere. Comment lines
/// (keep-alives), other fields and blank separators are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the complete data values it finished
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(value) = line.strip_prefix("data:") {
                values.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        values
    }
}

/// Typed event stream over an SSE body
pub struct EventFeed<T> {
    chunks: BoxStream<'static, ClientResult<Vec<u8>>>,
    decoder: SseDecoder,
    ready: std::collections::VecDeque<String>,
    _event: PhantomData<fn() -> T>,
}

impl<T> EventFeed<T>
where
    T: FromStr<Err = WireError>,
{
    /// Wrap any byte-chunk stream
    pub fn new<S>(chunks: S) -> Self
    where
        S: Stream<Item = ClientResult<Vec<u8>>> + Send + 'static,
    {
        Self {
            chunks: chunks.boxed(),
            decoder: SseDecoder::new(),
            ready: Default::default(),
            _event: PhantomData,
        }
    }

    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        Self::new(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from)),
        )
    }

    /// Next event; `None` once the server ends the stream
    ///
    /// Malformed lines and unknown statuses surface as errors.
    pub async fn next(&mut self) -> Option<ClientResult<T>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(line.parse::<T>().map_err(wire_error));
            }
            match self.chunks.next().await? {
                Ok(chunk) => self.ready.extend(self.decoder.push(&chunk)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<T> std::fmt::Debug for EventFeed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("buffered", &self.ready.len())
            .finish_non_exhaustive()
    }
}

fn wire_error(err: WireError) -> ClientError {
    match err {
        WireError::UnknownStatus(e) => ClientError::UnknownStatus(e),
        other => ClientError::InvalidResponse(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderStatus, StatusChange, StockChange};

    fn feed<T: FromStr<Err = WireError>>(chunks: &[&str]) -> EventFeed<T> {
        let chunks: Vec<ClientResult<Vec<u8>>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        EventFeed::new(futures::stream::iter(chunks))
    }

    #[test]
    fn test_decoder_handles_split_lines_and_comments() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": keep-alive\n\nda").is_empty());
        assert_eq!(decoder.push(b"ta: 1:10:3\n\ndata:2:5:0\r\n"), vec!["1:10:3", "2:5:0"]);
        assert!(decoder.push(b"\n").is_empty());
    }

    #[tokio::test]
    async fn test_feed_yields_typed_events() {
        let mut feed: EventFeed<StockChange> = feed(&["data: 7:10:", "4\n\n", "data: 7:10:3\n\n"]);
        let first = feed.next().await.unwrap().unwrap();
        assert_eq!((first.product_id, first.stock, first.reserved), (7, 10, 4));
        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(second.available(), 7);
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_status_fails_loudly() {
        let mut feed: EventFeed<StatusChange> = feed(&["data: 9:Placed\n\ndata: 9:Cooking\n\n"]);
        assert_eq!(feed.next().await.unwrap().unwrap().status, OrderStatus::Placed);
        assert!(matches!(
            feed.next().await,
            Some(Err(ClientError::UnknownStatus(_)))
        ));
    }
}
