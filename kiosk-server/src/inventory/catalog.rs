//! Product catalog administration
//!
//! Product rows live in the repository; their counters live in the ledger.
//! Reads overlay the ledger counters on the stored row.

use std::sync::Arc;

use shared::models::ProductCreate;
use shared::util::snowflake_id;
use shared::{AppError, AppResult, ErrorCode, Product, ProductId, StockLevel};

use super::ledger::StockLedger;
use crate::db::ProductRepository;

pub struct CatalogService {
    repo: Arc<dyn ProductRepository>,
    ledger: Arc<StockLedger>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn ProductRepository>, ledger: Arc<StockLedger>) -> Self {
        Self { repo, ledger }
    }

    /// Fill the ledger from the repository
    pub async fn warm_up(&self) -> AppResult<usize> {
        let products = self.repo.find_all().await?;
        let count = self
            .ledger
            .warm_up(products.into_iter().map(|p| (p.id, p.stock)));
        tracing::info!(products = count, "Stock ledger warmed up");
        Ok(count)
    }

    pub async fn create(&self, data: ProductCreate) -> AppResult<Product> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Product name must not be empty"));
        }
        if data.price < 0 {
            return Err(AppError::new(ErrorCode::ProductInvalidPrice).with_detail("price", data.price));
        }

        let product = Product {
            id: snowflake_id(),
            name: name.to_string(),
            price: data.price,
            is_visible: data.is_visible.unwrap_or(true),
            stock: StockLevel::unreserved(data.stock),
        };
        self.repo.save(&product).await?;
        self.ledger.insert(product.id, data.stock)?;
        tracing::info!(product_id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    /// Visible products with live counters
    pub async fn list_visible(&self) -> AppResult<Vec<Product>> {
        let products = self.repo.find_all().await?;
        Ok(products
            .into_iter()
            .filter(|p| p.is_visible)
            .filter_map(|p| self.with_live_stock(p))
            .collect())
    }

    pub async fn get(&self, id: ProductId) -> AppResult<Product> {
        self.repo
            .find_by_id(id)
            .await?
            .and_then(|p| self.with_live_stock(p))
            .ok_or_else(|| AppError::product_not_found(id))
    }

    /// Counters are persisted by the stock listener
    pub fn set_stock(&self, id: ProductId, stock: u32) -> AppResult<StockLevel> {
        let level = self.ledger.set_stock(id, stock)?;
        tracing::info!(product_id = %id, stock = stock, "Stock adjusted");
        Ok(level)
    }

    pub async fn set_visibility(&self, id: ProductId, is_visible: bool) -> AppResult<Product> {
        let mut product = self.get(id).await?;
        product.is_visible = is_visible;
        self.repo.save(&product).await?;
        Ok(product)
    }

    /// Refused with `ProductInUse` while units are reserved
    pub async fn delete(&self, id: ProductId) -> AppResult<()> {
        let level = self.ledger.delete(id)?;
        match self.repo.delete(id).await {
            Ok(_) => {
                tracing::info!(product_id = %id, "Product deleted");
                Ok(())
            }
            Err(e) => {
                tracing::error!(product_id = %id, error = %e, "Product delete failed, restoring ledger entry");
                self.ledger.restore(id, level);
                Err(e.into())
            }
        }
    }

    fn with_live_stock(&self, mut product: Product) -> Option<Product> {
        product.stock = self.ledger.get(product.id).ok()?;
        Some(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::inventory::NoopNotifier;

    fn service() -> (CatalogService, Arc<MemoryStore>, Arc<StockLedger>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(StockLedger::new(Arc::new(NoopNotifier)));
        (CatalogService::new(store.clone(), ledger.clone()), store, ledger)
    }

    fn create(name: &str, stock: u32) -> ProductCreate {
        ProductCreate {
            name: name.to_string(),
            price: 250,
            stock,
            is_visible: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_reads_live_counters() {
        let (catalog, _, ledger) = service();
        let product = catalog.create(create("Espresso", 10)).await.unwrap();
        ledger.reserve(product.id, 3).unwrap();

        let fetched = catalog.get(product.id).await.unwrap();
        assert_eq!(fetched.available(), 7);
        assert!(fetched.is_visible);
    }

    #[tokio::test]
    async fn test_create_validates() {
        let (catalog, _, _) = service();
        let err = catalog.create(create("  ", 1)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        let mut bad_price = create("Tea", 1);
        bad_price.price = -1;
        let err = catalog.create(bad_price).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProductInvalidPrice);
    }

    #[tokio::test]
    async fn test_hidden_products_not_listed() {
        let (catalog, _, _) = service();
        let shown = catalog.create(create("Shown", 1)).await.unwrap();
        let hidden = catalog.create(create("Hidden", 1)).await.unwrap();
        catalog.set_visibility(hidden.id, false).await.unwrap();

        let listed: Vec<ProductId> = catalog.list_visible().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![shown.id]);
    }

    #[tokio::test]
    async fn test_delete_in_use_then_free() {
        let (catalog, _, ledger) = service();
        let product = catalog.create(create("Bagel", 2)).await.unwrap();
        ledger.reserve(product.id, 1).unwrap();

        let err = catalog.delete(product.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProductInUse);

        ledger.release(product.id, 1).unwrap();
        catalog.delete(product.id).await.unwrap();
        let err = catalog.get(product.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProductNotFound);
    }

    #[tokio::test]
    async fn test_delete_storage_failure_restores_ledger() {
        let (catalog, store, ledger) = service();
        let product = catalog.create(create("Muffin", 4)).await.unwrap();
        store.set_fail_writes(true);

        let err = catalog.delete(product.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StorageError);
        assert_eq!(ledger.get(product.id).unwrap().stock(), 4);
    }

    #[tokio::test]
    async fn test_warm_up_loads_repository() {
        let store = Arc::new(MemoryStore::with_products([Product {
            id: 11,
            name: "Scone".into(),
            price: 300,
            is_visible: true,
            stock: StockLevel::new(8, 2).unwrap(),
        }]));
        let ledger = Arc::new(StockLedger::new(Arc::new(NoopNotifier)));
        let catalog = CatalogService::new(store, ledger.clone());

        assert_eq!(catalog.warm_up().await.unwrap(), 1);
        assert_eq!(ledger.get(11).unwrap().available(), 6);
    }
}
