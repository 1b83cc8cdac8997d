//! 库存写回监听器
//!
//! Subscribes to the product-quantity topic and writes each new counter pair
//! through the repository. The ledger stays authoritative; storage failures
//! are logged and the next change for the product overwrites the row again.
//!
//! When the broadcaster drops the subscription for lagging, the listener
//! resubscribes and writes the full ledger snapshot to cover the gap. It only
//! stops on shutdown.

use std::sync::Arc;

use futures::StreamExt;
use shared::{LiveEvent, ProductId, StockLevel, Topic};
use tokio_util::sync::CancellationToken;

use crate::broadcast::ChangeBroadcaster;
use crate::db::ProductRepository;
use crate::inventory::StockLedger;

pub async fn run_stock_persistence(
    broadcaster: ChangeBroadcaster,
    ledger: Arc<StockLedger>,
    repo: Arc<dyn ProductRepository>,
    shutdown: CancellationToken,
) {
    let mut subscription = broadcaster.subscribe(Topic::ProductQuantity);
    tracing::info!("Stock persistence listener started");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = subscription.next() => event,
        };
        let Some(event) = event else {
            if shutdown.is_cancelled() {
                break;
            }
            tracing::warn!("Stock persistence subscription dropped, catching up from ledger");
            // Subscribe before reading the snapshot so no change falls in between.
            subscription = broadcaster.subscribe(Topic::ProductQuantity);
            for (product_id, level) in ledger.snapshot() {
                persist(repo.as_ref(), product_id, level).await;
            }
            continue;
        };
        let LiveEvent::Stock(change) = event else {
            continue;
        };
        let Some(level) = StockLevel::new(change.stock, change.reserved) else {
            continue;
        };
        persist(repo.as_ref(), change.product_id, level).await;
    }
    subscription.close();
    tracing::info!("Stock persistence listener stopped");
}

async fn persist(repo: &dyn ProductRepository, product_id: ProductId, level: StockLevel) {
    match repo.update_stock(product_id, level).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(product_id = %product_id, "Stock change for unknown product row");
        }
        Err(e) => {
            tracing::error!(product_id = %product_id, error = %e, "Failed to persist stock");
        }
    }
}
