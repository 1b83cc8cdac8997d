//! 变更广播器
//!
//! Registry of live subscriptions keyed by connection. Every connection owns a
//! small list of registrations guarded by its own mutex; publish snapshots the
//! connection handles first, so subscribe and unsubscribe on other
//! connections never wait behind a fan-out.
//!
//! Lock order is always registry shard, then connection list.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use shared::{LiveEvent, StockChange, Topic};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::subscription::Subscription;
use crate::inventory::StockNotifier;

pub type ConnectionId = u64;
pub type SubscriptionId = u64;

/// Default per-subscription buffer
pub const DEFAULT_BUFFER: usize = 256;

struct Registration {
    id: SubscriptionId,
    topic: Topic,
    tx: mpsc::Sender<LiveEvent>,
}

type Registrations = Arc<Mutex<Vec<Registration>>>;

struct Inner {
    registry: DashMap<ConnectionId, Registrations>,
    next_connection: AtomicU64,
    next_subscription: AtomicU64,
    buffer: usize,
}

/// Fan-out of live events to subscribed connections
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct ChangeBroadcaster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChangeBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBroadcaster")
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl ChangeBroadcaster {
    /// `buffer` is the number of undelivered events a subscriber may lag behind
    /// before it is dropped.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: DashMap::new(),
                next_connection: AtomicU64::new(1),
                next_subscription: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Allocate an id for a new live connection
    pub fn connect(&self) -> ConnectionId {
        self.inner.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribe `topic` on a fresh connection
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let connection = self.connect();
        self.subscribe_on(connection, topic)
    }

    /// Add a subscription to an existing connection
    pub fn subscribe_on(&self, connection: ConnectionId, topic: Topic) -> Subscription {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);

        // The entry guard is held while pushing so a concurrent prune cannot
        // remove the list between lookup and insert.
        let entry = self.inner.registry.entry(connection).or_default();
        entry.lock().push(Registration { id, topic, tx });
        drop(entry);

        tracing::info!(connection = connection, subscription = id, topic = %topic, "Subscriber registered");
        Subscription::new(id, connection, topic, rx, self.clone())
    }

    /// Deliver `event` to every subscription currently registered on its topic
    ///
    /// Returns the number of subscriptions the event was handed to. Dead or
    /// lagging subscriptions are dropped from the registry on the way.
    pub fn publish(&self, event: LiveEvent) -> usize {
        let topic = event.topic();
        let connections: Vec<(ConnectionId, Registrations)> = self
            .inner
            .registry
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        let mut emptied = Vec::new();
        for (connection, registrations) in connections {
            let mut list = registrations.lock();
            list.retain(|reg| {
                if reg.topic != topic {
                    return true;
                }
                match reg.tx.try_send(event) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            connection = connection,
                            subscription = reg.id,
                            "Subscriber lagging, dropping it"
                        );
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(
                            connection = connection,
                            subscription = reg.id,
                            "Pruned closed subscriber"
                        );
                        false
                    }
                }
            });
            if list.is_empty() {
                emptied.push(connection);
            }
        }

        for connection in emptied {
            self.prune(connection);
        }
        delivered
    }

    /// Remove one subscription; unknown ids are ignored
    pub fn unsubscribe(&self, connection: ConnectionId, subscription: SubscriptionId) {
        let registrations = self
            .inner
            .registry
            .get(&connection)
            .map(|entry| entry.value().clone());
        let Some(registrations) = registrations else {
            return;
        };

        let removed = {
            let mut list = registrations.lock();
            let before = list.len();
            list.retain(|reg| reg.id != subscription);
            before != list.len()
        };
        if removed {
            tracing::info!(connection = connection, subscription = subscription, "Subscriber removed");
        }
        self.prune(connection);
    }

    /// Drop every subscription; their streams end
    pub fn close_all(&self) {
        let count = self.inner.registry.len();
        self.inner.registry.clear();
        tracing::info!(connections = count, "Closed all live connections");
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn subscription_count(&self) -> usize {
        let connections: Vec<Registrations> = self
            .inner
            .registry
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        connections.iter().map(|list| list.lock().len()).sum()
    }

    fn prune(&self, connection: ConnectionId) {
        let pruned = self
            .inner
            .registry
            .remove_if(&connection, |_, list| list.lock().is_empty())
            .is_some();
        if pruned {
            tracing::debug!(connection = connection, "Connection entry pruned");
        }
    }
}

impl StockNotifier for ChangeBroadcaster {
    fn stock_changed(&self, change: StockChange) {
        self.publish(LiveEvent::Stock(change));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderStatus, StatusChange};

    fn stock(product_id: i64, stock: u32, reserved: u32) -> LiveEvent {
        LiveEvent::Stock(StockChange {
            product_id,
            stock,
            reserved,
        })
    }

    #[tokio::test]
    async fn test_three_events_then_unsubscribe() {
        let broadcaster = ChangeBroadcaster::default();
        let mut sub = broadcaster.subscribe(Topic::ProductQuantity);

        for i in 0..3 {
            assert_eq!(broadcaster.publish(stock(1, 10, i)), 1);
        }
        for i in 0..3 {
            assert_eq!(sub.recv().await, Some(stock(1, 10, i)));
        }

        sub.close();
        assert_eq!(broadcaster.publish(stock(1, 10, 9)), 0);
        assert_eq!(sub.recv().await, None);
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let broadcaster = ChangeBroadcaster::default();
        let mut order_sub = broadcaster.subscribe(Topic::OrderStatus(5));
        let mut other_order = broadcaster.subscribe(Topic::OrderStatus(6));

        let event = LiveEvent::Status(StatusChange {
            order_id: 5,
            status: OrderStatus::Placed,
        });
        assert_eq!(broadcaster.publish(stock(1, 1, 0)), 0);
        assert_eq!(broadcaster.publish(event), 1);
        assert_eq!(order_sub.recv().await, Some(event));
        assert!(other_order.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let broadcaster = ChangeBroadcaster::default();
        let connection = broadcaster.connect();
        let first = broadcaster.subscribe_on(connection, Topic::ProductQuantity);
        let second = broadcaster.subscribe_on(connection, Topic::OrderStatus(1));
        assert_eq!(broadcaster.connection_count(), 1);
        assert_eq!(broadcaster.subscription_count(), 2);

        broadcaster.unsubscribe(connection, first.id());
        broadcaster.unsubscribe(connection, first.id());
        broadcaster.unsubscribe(999, 1);
        assert_eq!(broadcaster.connection_count(), 1);
        assert_eq!(broadcaster.subscription_count(), 1);

        drop(second);
        assert_eq!(broadcaster.connection_count(), 0);
        drop(first);
        assert_eq!(broadcaster.subscription_count(), 0);
    }

    #[test]
    fn test_lagging_subscriber_is_dropped() {
        let broadcaster = ChangeBroadcaster::new(2);
        let slow = broadcaster.subscribe(Topic::ProductQuantity);
        let _fast_keeps_connection = broadcaster.subscribe(Topic::OrderStatus(1));

        assert_eq!(broadcaster.publish(stock(1, 5, 0)), 1);
        assert_eq!(broadcaster.publish(stock(1, 5, 1)), 1);
        assert_eq!(broadcaster.publish(stock(1, 5, 2)), 0);
        assert_eq!(broadcaster.subscription_count(), 1);
        drop(slow);
    }

    #[tokio::test]
    async fn test_close_all_ends_streams() {
        let broadcaster = ChangeBroadcaster::default();
        let mut sub = broadcaster.subscribe(Topic::ProductQuantity);
        broadcaster.close_all();
        assert_eq!(sub.recv().await, None);
        assert_eq!(broadcaster.connection_count(), 0);
    }
}
