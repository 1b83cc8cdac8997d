//! 商品缓存 - 本地读取实时库存
//!
//! Filled from the product listing, then kept current by applying stock
//! change events from the server feed.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared::{Product, ProductId, StockChange, StockLevel};
use tokio_util::sync::CancellationToken;

use crate::error::ClientResult;
use crate::feed::EventFeed;

#[derive(Debug, Default)]
pub struct ProductCache {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let cache = Self::new();
        cache.replace_all(products);
        cache
    }

    /// Replace the whole cache (initial load or resync)
    pub fn replace_all(&self, products: impl IntoIterator<Item = Product>) {
        let products = products.into_iter().map(|p| (p.id, p)).collect();
        *self.products.write() = products;
    }

    pub fn get(&self, product_id: ProductId) -> Option<Product> {
        self.products.read().get(&product_id).cloned()
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.products.read().contains_key(&product_id)
    }

    /// Unreserved units as last reported by the server
    pub fn available(&self, product_id: ProductId) -> Option<u32> {
        self.products.read().get(&product_id).map(Product::available)
    }

    /// Visible products ordered by name
    pub fn visible(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .products
            .read()
            .values()
            .filter(|p| p.is_visible)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
    }

    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }

    /// Apply one change; false when the product is not cached
    pub fn apply(&self, change: &StockChange) -> bool {
        let Some(level) = StockLevel::new(change.stock, change.reserved) else {
            tracing::warn!(product_id = %change.product_id, "Ignoring inconsistent stock change");
            return false;
        };
        match self.products.write().get_mut(&change.product_id) {
            Some(product) => {
                product.stock = level;
                true
            }
            None => false,
        }
    }

    /// Apply changes from `feed` until it ends or `shutdown` fires
    ///
    /// Returns `Ok` when the stream ends; the caller reconnects and reloads
    /// the listing since events may have been missed.
    pub async fn follow(
        &self,
        mut feed: EventFeed<StockChange>,
        shutdown: CancellationToken,
    ) -> ClientResult<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                next = feed.next() => match next {
                    Some(Ok(change)) => {
                        if !self.apply(&change) {
                            tracing::debug!(product_id = %change.product_id, "Change for uncached product");
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        tracing::info!("Stock feed ended");
                        return Ok(());
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientResult;

    fn product(id: ProductId, name: &str, stock: u32, visible: bool) -> Product {
        Product {
            id,
            name: name.to_string(),
            price: 100,
            is_visible: visible,
            stock: StockLevel::unreserved(stock),
        }
    }

    #[test]
    fn test_apply_updates_available() {
        let cache = ProductCache::with_products([product(1, "Tea", 10, true)]);
        assert!(cache.apply(&StockChange {
            product_id: 1,
            stock: 10,
            reserved: 4
        }));
        assert_eq!(cache.available(1), Some(6));
        assert!(!cache.apply(&StockChange {
            product_id: 2,
            stock: 1,
            reserved: 0
        }));
    }

    #[test]
    fn test_visible_sorted_by_name() {
        let cache = ProductCache::with_products([
            product(1, "Tea", 1, true),
            product(2, "Hidden", 1, false),
            product(3, "Cake", 1, true),
        ]);
        let names: Vec<String> = cache.visible().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Cake", "Tea"]);
    }

    #[tokio::test]
    async fn test_follow_applies_until_end() {
        let cache = ProductCache::with_products([product(5, "Bagel", 8, true)]);
        let chunks: Vec<ClientResult<Vec<u8>>> = vec![
            Ok(b"data: 5:8:2\n\n".to_vec()),
            Ok(b": ping\n\ndata: 5:7:2\n\n".to_vec()),
        ];
        let feed = EventFeed::new(futures::stream::iter(chunks));

        cache.follow(feed, CancellationToken::new()).await.unwrap();
        let level = cache.get(5).unwrap().stock;
        assert_eq!((level.stock(), level.reserved()), (7, 2));
    }
}
