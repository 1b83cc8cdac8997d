//! In-memory store
//!
//! Default backing for both repositories. Writes can be switched to fail so
//! callers can exercise the storage error paths.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use shared::{Order, OrderId, Product, ProductId, StockLevel, UserId};

use super::repository::{OrderRepository, ProductRepository, RepoError, RepoResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    products: DashMap<ProductId, Product>,
    orders: DashMap<OrderId, Order>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with products (tests, demo data)
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        for product in products {
            store.products.insert(product.id, product);
        }
        store
    }

    /// Make every subsequent write fail with a database error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> RepoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Database("store is read-only".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn find_all(&self) -> RepoResult<Vec<Product>> {
        let mut products: Vec<Product> = self.products.iter().map(|p| p.value().clone()).collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn find_by_id(&self, id: ProductId) -> RepoResult<Option<Product>> {
        Ok(self.products.get(&id).map(|p| p.value().clone()))
    }

    async fn save(&self, product: &Product) -> RepoResult<()> {
        self.check_writable()?;
        self.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_stock(&self, id: ProductId, level: StockLevel) -> RepoResult<bool> {
        self.check_writable()?;
        Ok(self
            .products
            .get_mut(&id)
            .map(|mut p| p.stock = level)
            .is_some())
    }

    async fn delete(&self, id: ProductId) -> RepoResult<bool> {
        self.check_writable()?;
        Ok(self.products.remove(&id).is_some())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn find_by_id(&self, id: OrderId) -> RepoResult<Option<Order>> {
        Ok(self.orders.get(&id).map(|o| o.value().clone()))
    }

    async fn find_active_by_user(&self, user_id: UserId) -> RepoResult<Option<Order>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.is_active())
            .max_by_key(|o| o.created_at)
            .map(|o| o.value().clone()))
    }

    async fn save(&self, order: &Order) -> RepoResult<()> {
        self.check_writable()?;
        self.orders.insert(order.id, order.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: ProductId) -> Product {
        Product {
            id,
            name: format!("p{}", id),
            price: 100,
            is_visible: true,
            stock: StockLevel::unreserved(5),
        }
    }

    #[tokio::test]
    async fn test_update_stock_missing_product() {
        let store = MemoryStore::with_products([product(1)]);
        let level = StockLevel::new(5, 2).unwrap();
        assert!(store.update_stock(1, level).await.unwrap());
        assert!(!store.update_stock(2, level).await.unwrap());
        let saved = ProductRepository::find_by_id(&store, 1).await.unwrap().unwrap();
        assert_eq!(saved.stock, level);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = ProductRepository::save(&store, &product(1)).await.unwrap_err();
        assert!(matches!(err, RepoError::Database(_)));
        store.set_fail_writes(false);
        ProductRepository::save(&store, &product(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_active_order_by_user() {
        let store = MemoryStore::new();
        let mut delivered = Order::new_empty(1, 7, 10);
        delivered.status = shared::OrderStatus::Delivered;
        OrderRepository::save(&store, &delivered).await.unwrap();
        assert!(store.find_active_by_user(7).await.unwrap().is_none());

        OrderRepository::save(&store, &Order::new_empty(2, 7, 20)).await.unwrap();
        assert_eq!(store.find_active_by_user(7).await.unwrap().unwrap().id, 2);
        assert!(store.find_active_by_user(8).await.unwrap().is_none());
    }
}
