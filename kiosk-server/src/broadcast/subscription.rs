//! Subscription handle
//!
//! A lazy stream of [`LiveEvent`]s. Cleanup runs exactly once: on
//! [`Subscription::close`] or on drop, whichever comes first.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use shared::{LiveEvent, Topic};
use tokio::sync::mpsc;

use super::broadcaster::{ChangeBroadcaster, ConnectionId, SubscriptionId};

pub struct Subscription {
    id: SubscriptionId,
    connection: ConnectionId,
    topic: Topic,
    rx: mpsc::Receiver<LiveEvent>,
    broadcaster: ChangeBroadcaster,
    closed: bool,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriptionId,
        connection: ConnectionId,
        topic: Topic,
        rx: mpsc::Receiver<LiveEvent>,
        broadcaster: ChangeBroadcaster,
    ) -> Self {
        Self {
            id,
            connection,
            topic,
            rx,
            broadcaster,
            closed: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Next event, `None` once closed and drained
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.rx.try_recv().ok()
    }

    /// Unregister from the broadcaster; later calls do nothing
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.broadcaster.unsubscribe(self.connection, self.id);
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = LiveEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("topic", &self.topic)
            .field("closed", &self.closed)
            .finish()
    }
}
