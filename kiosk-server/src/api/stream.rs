//! Event stream responses
//!
//! Each [`LiveEvent`] becomes one SSE `data:` line in its wire form. The
//! subscription handle lives inside the response stream, so the registry
//! entry is cleaned up when the client goes away and axum drops the body.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use shared::LiveEvent;

/// Wrap a stream of live events as an SSE response
pub fn live_events<S>(events: S, keep_alive: Duration) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = LiveEvent> + Send + 'static,
{
    let stream = events.map(|event| Ok(Event::default().data(event.to_line())));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive))
}

/// Yield events up to and including the first one `is_last` accepts
///
/// The inner stream is dropped right after that event, without waiting for
/// another item.
pub fn until_inclusive<S, F>(events: S, is_last: F) -> impl Stream<Item = LiveEvent>
where
    S: Stream<Item = LiveEvent>,
    F: FnMut(&LiveEvent) -> bool,
{
    futures::stream::unfold(Some((Box::pin(events), is_last)), |state| async move {
        let (mut events, mut is_last) = state?;
        let event = events.next().await?;
        let rest = if is_last(&event) {
            None
        } else {
            Some((events, is_last))
        };
        Some((event, rest))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderStatus, StatusChange};

    fn status(status: OrderStatus) -> LiveEvent {
        LiveEvent::Status(StatusChange { order_id: 1, status })
    }

    #[tokio::test]
    async fn test_until_inclusive_stops_after_terminal() {
        let events = futures::stream::iter(vec![
            status(OrderStatus::Placed),
            status(OrderStatus::Delivered),
            status(OrderStatus::Placed),
        ]);
        let collected: Vec<LiveEvent> = until_inclusive(events, |e| {
            matches!(e, LiveEvent::Status(c) if c.status.is_terminal())
        })
        .collect()
        .await;
        assert_eq!(
            collected,
            vec![status(OrderStatus::Placed), status(OrderStatus::Delivered)]
        );
    }

    #[tokio::test]
    async fn test_until_inclusive_does_not_wait_for_more() {
        let events = futures::stream::iter(vec![status(OrderStatus::Delivered)])
            .chain(futures::stream::pending());
        let collected: Vec<LiveEvent> = tokio::time::timeout(
            Duration::from_secs(1),
            until_inclusive(events, |_| true).collect(),
        )
        .await
        .unwrap();
        assert_eq!(collected, vec![status(OrderStatus::Delivered)]);
    }
}
