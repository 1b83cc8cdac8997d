//! 订单状态服务
//!
//! Owns the order status machine on the server. Transitions and item writes
//! for one order are serialized through a per-order async lock; different
//! orders proceed in parallel. Lock entries are dropped as soon as nobody
//! holds or waits on them.

use std::sync::Arc;

use dashmap::DashMap;
use shared::util::{now_millis, snowflake_id};
use shared::{LiveEvent, Order, OrderId, OrderItem, OrderStatus, StatusChange, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::OrderError;
use crate::broadcast::ChangeBroadcaster;
use crate::db::OrderRepository;
use crate::inventory::StockLedger;

pub type OrderResult<T> = Result<T, OrderError>;

pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    ledger: Arc<StockLedger>,
    broadcaster: ChangeBroadcaster,
    order_locks: DashMap<OrderId, Arc<Mutex<()>>>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl OrderService {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        ledger: Arc<StockLedger>,
        broadcaster: ChangeBroadcaster,
    ) -> Self {
        Self {
            repo,
            ledger,
            broadcaster,
            order_locks: DashMap::new(),
            user_locks: DashMap::new(),
        }
    }

    /// The user's active order, created empty when there is none
    pub async fn current_order(&self, user_id: UserId) -> OrderResult<Order> {
        let _guard = Self::acquire(&self.user_locks, user_id).await;
        if let Some(order) = self.repo.find_active_by_user(user_id).await? {
            return Ok(order);
        }

        let order = Order::new_empty(snowflake_id(), user_id, now_millis());
        self.repo.save(&order).await?;
        tracing::info!(order_id = %order.id, user_id = %user_id, "Started new order");
        Ok(order)
    }

    pub async fn get(&self, order_id: OrderId) -> OrderResult<Order> {
        self.load(order_id).await
    }

    /// Polling endpoint
    pub async fn status(&self, order_id: OrderId) -> OrderResult<OrderStatus> {
        Ok(self.load(order_id).await?.status)
    }

    /// Overwrite the whole item list (last writer wins)
    ///
    /// Quantities are taken as sent. The server does not check them against
    /// the caller's ledger reservations; the kiosk client reserves before it
    /// pushes, and delivery fails if the reservations are not there.
    pub async fn replace_items(
        &self,
        user_id: UserId,
        order_id: OrderId,
        items: Vec<OrderItem>,
    ) -> OrderResult<Order> {
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidItem(format!(
                "quantity of product {} must be greater than zero",
                item.product_id
            )));
        }

        let _guard = Self::acquire(&self.order_locks, order_id).await;
        let mut order = self.load(order_id).await?;
        if order.user_id != user_id {
            return Err(OrderError::Forbidden { order_id, user_id });
        }
        if order.status.is_terminal() {
            return Err(OrderError::Locked(order_id));
        }

        order.items = items;
        self.repo.save(&order).await?;
        tracing::debug!(order_id = %order_id, items = order.items.len(), "Order items replaced");
        Ok(order)
    }

    /// Move the order exactly one step forward
    ///
    /// With `expected` set, the advance only happens from that status. Reaching
    /// `Delivered` confirms every line against the ledger, all or nothing.
    pub async fn advance_status(
        &self,
        order_id: OrderId,
        expected: Option<OrderStatus>,
    ) -> OrderResult<OrderStatus> {
        let _guard = Self::acquire(&self.order_locks, order_id).await;
        let mut order = self.load(order_id).await?;

        let current = order.status;
        if let Some(expected) = expected
            && expected != current
        {
            return Err(OrderError::StatusConflict {
                order_id,
                expected,
                current,
            });
        }
        let next = current.next().ok_or(OrderError::AlreadyTerminal(order_id))?;

        if next.is_terminal() {
            self.ledger
                .confirm_many(order.items.iter().map(|item| (item.product_id, item.quantity)))?;
        }

        order.status = next;
        if let Err(e) = self.repo.save(&order).await {
            if next.is_terminal() {
                tracing::error!(
                    order_id = %order_id,
                    error = %e,
                    "Stock confirmed but delivered status not persisted"
                );
            }
            return Err(e.into());
        }

        tracing::info!(order_id = %order_id, from = %current, to = %next, "Order status advanced");
        self.broadcaster.publish(LiveEvent::Status(StatusChange {
            order_id,
            status: next,
        }));

        Ok(next)
    }

    async fn load(&self, order_id: OrderId) -> OrderResult<Order> {
        self.repo
            .find_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    async fn acquire(locks: &DashMap<i64, Arc<Mutex<()>>>, key: i64) -> KeyedGuard<'_> {
        let lock = locks.entry(key).or_default().clone();
        KeyedGuard {
            guard: Some(lock.lock_owned().await),
            locks,
            key,
        }
    }
}

/// Lock guard that removes its map entry once no other task holds or awaits it
struct KeyedGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    key: i64,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::inventory::NoopNotifier;
    use shared::{ErrorCode, StockLevel, Topic};

    struct Fixture {
        service: OrderService,
        ledger: Arc<StockLedger>,
        store: Arc<MemoryStore>,
        broadcaster: ChangeBroadcaster,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(StockLedger::new(Arc::new(NoopNotifier)));
        ledger.warm_up([(1, StockLevel::unreserved(10)), (2, StockLevel::unreserved(5))]);
        let broadcaster = ChangeBroadcaster::default();
        let service = OrderService::new(store.clone(), ledger.clone(), broadcaster.clone());
        Fixture {
            service,
            ledger,
            store,
            broadcaster,
        }
    }

    fn item(product_id: i64, quantity: u32) -> OrderItem {
        OrderItem {
            product_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_current_order_is_stable_until_delivered() {
        let f = fixture();
        let first = f.service.current_order(7).await.unwrap();
        assert_eq!(first.status, OrderStatus::NotPlaced);
        assert_eq!(f.service.current_order(7).await.unwrap().id, first.id);

        for _ in 0..3 {
            f.service.advance_status(first.id, None).await.unwrap();
        }
        let next = f.service.current_order(7).await.unwrap();
        assert_ne!(next.id, first.id);
        assert!(next.items.is_empty());
    }

    #[tokio::test]
    async fn test_advance_walks_every_state_then_terminal() {
        let f = fixture();
        let order = f.service.current_order(1).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(f.service.advance_status(order.id, None).await.unwrap());
        }
        assert_eq!(
            seen,
            vec![OrderStatus::Placed, OrderStatus::Assembling, OrderStatus::Delivered]
        );

        let err = f.service.advance_status(order.id, None).await.unwrap_err();
        assert!(matches!(err, OrderError::AlreadyTerminal(_)));
        assert_eq!(f.service.status(order.id).await.unwrap(), OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_delivery_confirms_reserved_stock() {
        let f = fixture();
        let order = f.service.current_order(1).await.unwrap();
        f.ledger.reserve(1, 3).unwrap();
        f.ledger.reserve(2, 1).unwrap();
        f.service
            .replace_items(1, order.id, vec![item(1, 3), item(2, 1)])
            .await
            .unwrap();

        for _ in 0..3 {
            f.service.advance_status(order.id, None).await.unwrap();
        }
        assert_eq!(f.ledger.get(1).unwrap(), StockLevel::new(7, 0).unwrap());
        assert_eq!(f.ledger.get(2).unwrap(), StockLevel::new(4, 0).unwrap());
    }

    #[tokio::test]
    async fn test_delivery_without_reservation_fails_and_keeps_status() {
        let f = fixture();
        let order = f.service.current_order(1).await.unwrap();
        f.service.replace_items(1, order.id, vec![item(1, 4)]).await.unwrap();
        f.service.advance_status(order.id, None).await.unwrap();
        f.service.advance_status(order.id, None).await.unwrap();

        let err = f.service.advance_status(order.id, None).await.unwrap_err();
        assert!(matches!(err, OrderError::Stock(_)));
        assert_eq!(f.service.status(order.id).await.unwrap(), OrderStatus::Assembling);
        assert_eq!(f.ledger.get(1).unwrap().stock(), 10);
    }

    #[tokio::test]
    async fn test_expected_status_guard() {
        let f = fixture();
        let order = f.service.current_order(1).await.unwrap();
        let err = f
            .service
            .advance_status(order.id, Some(OrderStatus::Placed))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::StatusConflict { .. }));
        assert_eq!(
            f.service
                .advance_status(order.id, Some(OrderStatus::NotPlaced))
                .await
                .unwrap(),
            OrderStatus::Placed
        );
    }

    #[tokio::test]
    async fn test_items_locked_after_delivery_and_owner_checked() {
        let f = fixture();
        let order = f.service.current_order(1).await.unwrap();

        let err = f.service.replace_items(2, order.id, vec![]).await.unwrap_err();
        assert_eq!(shared::AppError::from(err).code, ErrorCode::PermissionDenied);

        let err = f
            .service
            .replace_items(1, order.id, vec![item(1, 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidItem(_)));

        for _ in 0..3 {
            f.service.advance_status(order.id, None).await.unwrap();
        }
        let err = f.service.replace_items(1, order.id, vec![]).await.unwrap_err();
        assert_eq!(shared::AppError::from(err).code, ErrorCode::OrderLocked);
    }

    #[tokio::test]
    async fn test_status_published_on_order_topic() {
        let f = fixture();
        let order = f.service.current_order(1).await.unwrap();
        let mut sub = f.broadcaster.subscribe(Topic::OrderStatus(order.id));

        f.service.advance_status(order.id, None).await.unwrap();
        assert_eq!(
            sub.recv().await,
            Some(LiveEvent::Status(StatusChange {
                order_id: order.id,
                status: OrderStatus::Placed,
            }))
        );
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let f = fixture();
        let order = f.service.current_order(1).await.unwrap();
        f.store.set_fail_writes(true);
        let err = f.service.advance_status(order.id, None).await.unwrap_err();
        assert_eq!(shared::AppError::from(err).code, ErrorCode::StorageError);
        assert_eq!(f.service.status(order.id).await.unwrap(), OrderStatus::NotPlaced);
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_use() {
        let f = Arc::new(fixture());
        let order = f.service.current_order(1).await.unwrap();

        let mut handles = Vec::new();
        for round in 0..8u32 {
            let f = f.clone();
            handles.push(tokio::spawn(async move {
                f.service
                    .replace_items(1, order.id, vec![item(1, round + 1)])
                    .await
                    .unwrap();
                f.service.current_order(1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        f.service.advance_status(order.id, None).await.unwrap();
        f.service.current_order(2).await.unwrap();

        assert!(f.service.order_locks.is_empty());
        assert!(f.service.user_locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let f = fixture();
        assert!(matches!(
            f.service.advance_status(404, None).await,
            Err(OrderError::NotFound(404))
        ));
    }
}
