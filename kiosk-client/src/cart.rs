//! 购物车对账引擎
//!
//! Keeps the local cart and the server's reservations in step. A user edit
//! reserves or releases exactly the quantity delta, then pushes the whole item
//! list to the server. Loading a cart from the server ([`CartEngine::rehydrate`])
//! takes the quantities as already reserved and never touches stock.
//! Whenever the cart adopts a server list over pending local edits, the
//! per-product difference is reserved or released first, so the cart and the
//! caller's reservations never diverge.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{Order, OrderId, OrderItem, OrderStatus, Product, ProductId, StockLevel};
use thiserror::Error;

use crate::cache::ProductCache;
use crate::error::{ClientError, ClientResult};
use crate::http::HttpClient;

/// Reservation calls against the stock ledger
#[async_trait]
pub trait StockGateway: Send + Sync {
    async fn reserve(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel>;
    async fn release(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel>;
}

/// Order reads and whole-list writes
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn current_order(&self) -> ClientResult<Order>;
    async fn get_order(&self, order_id: OrderId) -> ClientResult<Order>;
    async fn replace_items(&self, order_id: OrderId, items: Vec<OrderItem>) -> ClientResult<Order>;
}

#[async_trait]
impl StockGateway for HttpClient {
    async fn reserve(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel> {
        HttpClient::reserve(self, product_id, quantity).await
    }

    async fn release(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel> {
        HttpClient::release(self, product_id, quantity).await
    }
}

#[async_trait]
impl OrderGateway for HttpClient {
    async fn current_order(&self) -> ClientResult<Order> {
        HttpClient::current_order(self).await
    }

    async fn get_order(&self, order_id: OrderId) -> ClientResult<Order> {
        HttpClient::get_order(self, order_id).await
    }

    async fn replace_items(&self, order_id: OrderId, items: Vec<OrderItem>) -> ClientResult<Order> {
        HttpClient::replace_items(self, order_id, items).await
    }
}

#[derive(Debug, Error)]
pub enum CartError {
    #[error("Order {0} is delivered; start a new order")]
    Locked(OrderId),

    /// The product is not in the local catalog, so its stock cannot be touched
    #[error("Product {0} is not available in the catalog")]
    Unresolved(ProductId),

    #[error("Order {0} is still active")]
    OrderActive(OrderId),

    /// Reservation or release rejected; the local cart is unchanged
    #[error(transparent)]
    Stock(ClientError),

    /// Stock was adjusted but the item list did not reach the server;
    /// [`CartEngine::sync`] retries
    #[error("Cart not synchronized: {0}")]
    SyncFailed(ClientError),

    #[error(transparent)]
    Gateway(#[from] ClientError),
}

impl CartError {
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, CartError::Stock(ClientError::InsufficientStock { .. }))
    }
}

pub type CartResult<T> = Result<T, CartError>;

/// One displayed cart line
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// `None` when the product is missing from the catalog
    pub product: Option<Product>,
}

impl CartLine {
    pub fn is_resolved(&self) -> bool {
        self.product.is_some()
    }
}

pub struct CartEngine {
    stock: Arc<dyn StockGateway>,
    orders: Arc<dyn OrderGateway>,
    products: Arc<ProductCache>,
    order_id: OrderId,
    status: OrderStatus,
    lines: Vec<CartLine>,
    dirty: bool,
}

impl CartEngine {
    /// Adopt a server snapshot as the local cart
    ///
    /// The quantities are already reserved on the server; nothing is
    /// reserved or released here.
    pub fn rehydrate(
        order: Order,
        stock: Arc<dyn StockGateway>,
        orders: Arc<dyn OrderGateway>,
        products: Arc<ProductCache>,
    ) -> Self {
        let mut engine = Self {
            stock,
            orders,
            products,
            order_id: order.id,
            status: order.status,
            lines: Vec::new(),
            dirty: false,
        };
        engine.adopt(order);
        engine
    }

    /// Fetch the caller's active order and rehydrate from it
    pub async fn load(
        stock: Arc<dyn StockGateway>,
        orders: Arc<dyn OrderGateway>,
        products: Arc<ProductCache>,
    ) -> CartResult<Self> {
        let order = orders.current_order().await?;
        Ok(Self::rehydrate(order, stock, orders, products))
    }

    fn adopt(&mut self, order: Order) {
        self.order_id = order.id;
        self.status = order.status;
        self.lines = order
            .items
            .into_iter()
            .map(|item| {
                let product = self.products.get(item.product_id);
                if product.is_none() {
                    tracing::warn!(product_id = %item.product_id, "Cart line not in catalog");
                }
                CartLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    product,
                }
            })
            .collect();
        self.dirty = false;
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Items can no longer change
    pub fn is_locked(&self) -> bool {
        self.status.is_terminal()
    }

    /// The server has not seen the latest item list
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines
            .iter()
            .find(|line| line.product_id == product_id)
            .map_or(0, |line| line.quantity)
    }

    /// Total in cents over resolved lines
    pub fn total(&self) -> i64 {
        self.lines
            .iter()
            .filter_map(|line| line.product.as_ref().map(|p| p.price * i64::from(line.quantity)))
            .sum()
    }

    pub fn items(&self) -> Vec<OrderItem> {
        self.lines
            .iter()
            .map(|line| OrderItem {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect()
    }

    /// User edit: move a line to `quantity`
    ///
    /// Reserves or releases the difference first. A rejected reservation leaves
    /// the cart as it was. Zero removes the line.
    pub async fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> CartResult<()> {
        if self.is_locked() {
            return Err(CartError::Locked(self.order_id));
        }

        let position = self.lines.iter().position(|l| l.product_id == product_id);
        let product = match position {
            Some(i) => self.lines[i].product.clone(),
            None => self.products.get(product_id),
        };
        if product.is_none() {
            return Err(CartError::Unresolved(product_id));
        }

        let current = position.map_or(0, |i| self.lines[i].quantity);
        if quantity > current {
            self.stock
                .reserve(product_id, quantity - current)
                .await
                .map_err(CartError::Stock)?;
        } else if quantity < current {
            self.stock
                .release(product_id, current - quantity)
                .await
                .map_err(CartError::Stock)?;
        } else {
            return Ok(());
        }

        self.put_line(product_id, quantity);
        tracing::debug!(product_id = %product_id, from = current, to = quantity, "Cart line changed");

        self.dirty = true;
        self.sync().await.map_err(|e| match e {
            CartError::Gateway(e) => CartError::SyncFailed(e),
            other => other,
        })
    }

    pub async fn increment(&mut self, product_id: ProductId) -> CartResult<()> {
        let quantity = self.quantity_of(product_id) + 1;
        self.set_quantity(product_id, quantity).await
    }

    pub async fn decrement(&mut self, product_id: ProductId) -> CartResult<()> {
        let quantity = self.quantity_of(product_id).saturating_sub(1);
        self.set_quantity(product_id, quantity).await
    }

    pub async fn remove(&mut self, product_id: ProductId) -> CartResult<()> {
        self.set_quantity(product_id, 0).await
    }

    /// Push the whole item list (last writer wins on the server)
    pub async fn sync(&mut self) -> CartResult<()> {
        let order = self.orders.replace_items(self.order_id, self.items()).await?;
        self.status = order.status;
        self.dirty = false;
        Ok(())
    }

    /// Reload the order from the server, e.g. after a reconnect
    ///
    /// Pending edits are pushed first, their stock is already held. A push that
    /// fails with a retryable error keeps the cart local and dirty. A push the
    /// server refuses gives way to the server list, after the reservations
    /// have been moved to match it.
    pub async fn resync(&mut self) -> CartResult<()> {
        if self.dirty {
            match self.sync().await {
                Ok(()) => {}
                Err(CartError::Gateway(e)) if e.is_retryable() => {
                    return Err(CartError::SyncFailed(e));
                }
                Err(CartError::Gateway(e)) => {
                    tracing::warn!(
                        order_id = %self.order_id,
                        error = %e,
                        "Server refused cart edits, taking server items"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        let order = self.orders.get_order(self.order_id).await?;
        if self.dirty && !order.status.is_terminal() {
            self.match_reservations(&order.items).await?;
        }
        self.adopt(order);
        Ok(())
    }

    /// Reserve or release per product until the local lines equal `items`
    ///
    /// Each line is updated right after its stock call, so a failure part way
    /// leaves every line still backed by its reservation.
    async fn match_reservations(&mut self, items: &[OrderItem]) -> CartResult<()> {
        let mut product_ids: Vec<ProductId> = self
            .lines
            .iter()
            .map(|line| line.product_id)
            .chain(items.iter().map(|item| item.product_id))
            .collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        for product_id in product_ids {
            let local = self.quantity_of(product_id);
            let remote: u32 = items
                .iter()
                .filter(|item| item.product_id == product_id)
                .map(|item| item.quantity)
                .sum();
            if remote > local {
                self.stock
                    .reserve(product_id, remote - local)
                    .await
                    .map_err(CartError::Stock)?;
            } else if remote < local {
                self.stock
                    .release(product_id, local - remote)
                    .await
                    .map_err(CartError::Stock)?;
            } else {
                continue;
            }
            self.put_line(product_id, remote);
        }
        Ok(())
    }

    fn put_line(&mut self, product_id: ProductId, quantity: u32) {
        let position = self.lines.iter().position(|l| l.product_id == product_id);
        match (position, quantity) {
            (Some(i), 0) => {
                self.lines.remove(i);
            }
            (Some(i), q) => self.lines[i].quantity = q,
            (None, 0) => {}
            (None, q) => {
                let product = self.products.get(product_id);
                self.lines.push(CartLine {
                    product_id,
                    quantity: q,
                    product,
                });
            }
        }
    }

    /// Status observed by a monitor
    pub fn apply_status(&mut self, status: OrderStatus) {
        if status > self.status {
            self.status = status;
        }
    }

    /// After delivery, switch to a fresh empty order
    pub async fn start_new_order(&mut self) -> CartResult<()> {
        if !self.is_locked() {
            return Err(CartError::OrderActive(self.order_id));
        }
        let order = self.orders.current_order().await?;
        tracing::info!(previous = %self.order_id, order_id = %order.id, "Started new order");
        self.adopt(order);
        Ok(())
    }
}

impl std::fmt::Debug for CartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartEngine")
            .field("order_id", &self.order_id)
            .field("status", &self.status)
            .field("lines", &self.lines)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Reserve(ProductId, u32),
        Release(ProductId, u32),
    }

    #[derive(Default)]
    struct MockStock {
        calls: Mutex<Vec<Call>>,
        available: Mutex<u32>,
    }

    impl MockStock {
        fn with_available(available: u32) -> Arc<Self> {
            let mock = Self::default();
            *mock.available.lock() = available;
            Arc::new(mock)
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        /// Reserved through this gateway on top of `base`
        fn reserved(&self, base: u32) -> i64 {
            self.calls().iter().fold(i64::from(base), |sum, call| match call {
                Call::Reserve(_, q) => sum + i64::from(*q),
                Call::Release(_, q) => sum - i64::from(*q),
            })
        }
    }

    #[async_trait]
    impl StockGateway for MockStock {
        async fn reserve(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel> {
            self.calls.lock().push(Call::Reserve(product_id, quantity));
            let mut available = self.available.lock();
            if quantity > *available {
                return Err(ClientError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: *available,
                });
            }
            *available -= quantity;
            Ok(StockLevel::unreserved(*available))
        }

        async fn release(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel> {
            self.calls.lock().push(Call::Release(product_id, quantity));
            *self.available.lock() += quantity;
            Ok(StockLevel::unreserved(*self.available.lock()))
        }
    }

    struct MockOrders {
        order: Mutex<Order>,
        pushes: Mutex<Vec<Vec<OrderItem>>>,
        fail_push: AtomicBool,
        refuse_push: AtomicBool,
    }

    impl MockOrders {
        fn new(order: Order) -> Arc<Self> {
            Arc::new(Self {
                order: Mutex::new(order),
                pushes: Mutex::new(Vec::new()),
                fail_push: AtomicBool::new(false),
                refuse_push: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl OrderGateway for MockOrders {
        async fn current_order(&self) -> ClientResult<Order> {
            let mut order = self.order.lock();
            if order.status.is_terminal() {
                *order = Order::new_empty(order.id + 1, order.user_id, 0);
            }
            Ok(order.clone())
        }

        async fn get_order(&self, _order_id: OrderId) -> ClientResult<Order> {
            Ok(self.order.lock().clone())
        }

        async fn replace_items(&self, _order_id: OrderId, items: Vec<OrderItem>) -> ClientResult<Order> {
            if self.fail_push.load(Ordering::SeqCst) {
                return Err(ClientError::Unavailable("storage down".into()));
            }
            if self.refuse_push.load(Ordering::SeqCst) {
                return Err(ClientError::Validation("item list refused".into()));
            }
            self.pushes.lock().push(items.clone());
            let mut order = self.order.lock();
            order.items = items;
            Ok(order.clone())
        }
    }

    fn catalog() -> Arc<ProductCache> {
        Arc::new(ProductCache::with_products([Product {
            id: 1,
            name: "Latte".into(),
            price: 350,
            is_visible: true,
            stock: StockLevel::unreserved(20),
        }]))
    }

    fn order_with(items: Vec<OrderItem>) -> Order {
        let mut order = Order::new_empty(100, 7, 0);
        order.items = items;
        order
    }

    fn engine(order: Order, stock: Arc<MockStock>, orders: Arc<MockOrders>) -> CartEngine {
        CartEngine::rehydrate(order, stock, orders, catalog())
    }

    #[tokio::test]
    async fn test_rehydrate_then_increment_reserves_once() {
        let order = order_with(vec![OrderItem {
            product_id: 1,
            quantity: 3,
        }]);
        let stock = MockStock::with_available(10);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock.clone(), orders.clone());

        assert_eq!(cart.quantity_of(1), 3);
        assert!(stock.calls().is_empty());

        cart.set_quantity(1, 4).await.unwrap();
        assert_eq!(stock.calls(), vec![Call::Reserve(1, 1)]);
        assert_eq!(cart.quantity_of(1), 4);
        assert_eq!(
            orders.pushes.lock().last().unwrap(),
            &vec![OrderItem {
                product_id: 1,
                quantity: 4
            }]
        );
    }

    #[tokio::test]
    async fn test_decrease_releases_delta_and_zero_removes() {
        let order = order_with(vec![OrderItem {
            product_id: 1,
            quantity: 5,
        }]);
        let stock = MockStock::with_available(10);
        let mut cart = engine(order.clone(), stock.clone(), MockOrders::new(order));

        cart.set_quantity(1, 2).await.unwrap();
        cart.remove(1).await.unwrap();
        assert_eq!(stock.calls(), vec![Call::Release(1, 3), Call::Release(1, 2)]);
        assert!(cart.lines().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_cart_unchanged() {
        let order = order_with(vec![]);
        let stock = MockStock::with_available(2);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock, orders.clone());

        let err = cart.set_quantity(1, 3).await.unwrap_err();
        assert!(err.is_insufficient_stock());
        assert_eq!(cart.quantity_of(1), 0);
        assert!(orders.pushes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_same_quantity_is_noop() {
        let order = order_with(vec![OrderItem {
            product_id: 1,
            quantity: 2,
        }]);
        let stock = MockStock::with_available(10);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock.clone(), orders.clone());

        cart.set_quantity(1, 2).await.unwrap();
        assert!(stock.calls().is_empty());
        assert!(orders.pushes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_line_is_kept_but_not_editable() {
        let order = order_with(vec![OrderItem {
            product_id: 99,
            quantity: 1,
        }]);
        let stock = MockStock::with_available(10);
        let mut cart = engine(order.clone(), stock.clone(), MockOrders::new(order));

        assert_eq!(cart.lines().len(), 1);
        assert!(!cart.lines()[0].is_resolved());
        assert!(matches!(
            cart.set_quantity(99, 2).await,
            Err(CartError::Unresolved(99))
        ));
        assert!(stock.calls().is_empty());

        // other lines still sync the unresolved one along
        cart.increment(1).await.unwrap();
        assert_eq!(cart.items().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_push_is_retryable() {
        let order = order_with(vec![]);
        let stock = MockStock::with_available(10);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock, orders.clone());

        orders.fail_push.store(true, Ordering::SeqCst);
        let err = cart.increment(1).await.unwrap_err();
        assert!(matches!(err, CartError::SyncFailed(ref e) if e.is_retryable()));
        assert!(cart.is_dirty());
        assert_eq!(cart.quantity_of(1), 1);

        orders.fail_push.store(false, Ordering::SeqCst);
        cart.sync().await.unwrap();
        assert!(!cart.is_dirty());
        assert_eq!(orders.pushes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_delivered_locks_and_new_order_starts_empty() {
        let order = order_with(vec![OrderItem {
            product_id: 1,
            quantity: 1,
        }]);
        let stock = MockStock::with_available(10);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock.clone(), orders.clone());

        assert!(matches!(
            cart.start_new_order().await,
            Err(CartError::OrderActive(100))
        ));

        orders.order.lock().status = OrderStatus::Delivered;
        cart.apply_status(OrderStatus::Delivered);
        assert!(matches!(cart.increment(1).await, Err(CartError::Locked(100))));
        assert!(stock.calls().is_empty());

        cart.start_new_order().await.unwrap();
        assert_eq!(cart.order_id(), 101);
        assert!(cart.lines().is_empty());
        assert!(!cart.is_locked());
    }

    #[tokio::test]
    async fn test_resync_adopts_server_items_without_stock_calls() {
        let order = order_with(vec![]);
        let stock = MockStock::with_available(10);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock.clone(), orders.clone());

        orders.order.lock().items = vec![OrderItem {
            product_id: 1,
            quantity: 6,
        }];
        cart.resync().await.unwrap();
        assert_eq!(cart.quantity_of(1), 6);
        assert_eq!(cart.total(), 6 * 350);
        assert!(stock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resync_after_failed_push_keeps_reserved_quantities() {
        let order = order_with(vec![OrderItem {
            product_id: 1,
            quantity: 5,
        }]);
        let stock = MockStock::with_available(10);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock.clone(), orders.clone());

        orders.fail_push.store(true, Ordering::SeqCst);
        let err = cart.set_quantity(1, 2).await.unwrap_err();
        assert!(matches!(err, CartError::SyncFailed(_)));

        let err = cart.resync().await.unwrap_err();
        assert!(matches!(err, CartError::SyncFailed(ref e) if e.is_retryable()));
        assert!(cart.is_dirty());
        assert_eq!(i64::from(cart.quantity_of(1)), stock.reserved(5));
        assert_eq!(cart.quantity_of(1), 2);

        orders.fail_push.store(false, Ordering::SeqCst);
        cart.resync().await.unwrap();
        assert!(!cart.is_dirty());
        assert_eq!(cart.quantity_of(1), 2);
        assert_eq!(stock.reserved(5), 2);
        assert_eq!(orders.order.lock().items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_resync_after_refused_push_restores_server_reservations() {
        let order = order_with(vec![OrderItem {
            product_id: 1,
            quantity: 5,
        }]);
        let stock = MockStock::with_available(10);
        let orders = MockOrders::new(order.clone());
        let mut cart = engine(order, stock.clone(), orders.clone());

        orders.refuse_push.store(true, Ordering::SeqCst);
        let err = cart.set_quantity(1, 2).await.unwrap_err();
        assert!(matches!(err, CartError::SyncFailed(ref e) if !e.is_retryable()));

        cart.resync().await.unwrap();
        assert!(!cart.is_dirty());
        assert_eq!(cart.quantity_of(1), 5);
        assert_eq!(stock.reserved(5), 5);
        assert_eq!(stock.calls(), vec![Call::Release(1, 3), Call::Reserve(1, 3)]);
    }

    #[test]
    fn test_status_only_moves_forward() {
        let order = order_with(vec![]);
        let mut cart = engine(order.clone(), MockStock::with_available(0), MockOrders::new(order));
        cart.apply_status(OrderStatus::Assembling);
        cart.apply_status(OrderStatus::Placed);
        assert_eq!(cart.status(), OrderStatus::Assembling);
    }
}
