//! 库存账本
//!
//! Per-product `(stock, reserved)` counters. Each product has its own lock, so
//! operations on different products never contend. The notifier is invoked
//! while the product lock is still held, which keeps the order of change
//! events for one product identical to the order of the mutations.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, MutexGuard};
use shared::{ProductId, StockChange, StockLevel};

use super::error::LedgerError;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Receives the new counters after every successful mutation
///
/// Implementations must not fail the caller; delivery problems are theirs to
/// handle.
pub trait StockNotifier: Send + Sync {
    fn stock_changed(&self, change: StockChange);
}

/// Notifier that drops every change (tests, tools)
pub struct NoopNotifier;

impl StockNotifier for NoopNotifier {
    fn stock_changed(&self, _change: StockChange) {}
}

#[derive(Debug)]
struct Cell {
    level: StockLevel,
    /// Set when the product is deleted while another caller still holds the Arc
    retired: bool,
}

type CellRef = Arc<Mutex<Cell>>;

/// In-memory stock ledger, authoritative for all counters
pub struct StockLedger {
    cells: DashMap<ProductId, CellRef>,
    notifier: Arc<dyn StockNotifier>,
}

impl StockLedger {
    pub fn new(notifier: Arc<dyn StockNotifier>) -> Self {
        Self {
            cells: DashMap::new(),
            notifier,
        }
    }

    /// Load counters without emitting change events (startup warm-up)
    pub fn warm_up(&self, levels: impl IntoIterator<Item = (ProductId, StockLevel)>) -> usize {
        let mut count = 0;
        for (id, level) in levels {
            self.cells.insert(
                id,
                Arc::new(Mutex::new(Cell {
                    level,
                    retired: false,
                })),
            );
            count += 1;
        }
        count
    }

    /// Start tracking a new product
    pub fn insert(&self, product_id: ProductId, stock: u32) -> LedgerResult<StockLevel> {
        let level = StockLevel::unreserved(stock);
        match self.cells.entry(product_id) {
            Entry::Occupied(_) => return Err(LedgerError::AlreadyExists(product_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(Cell {
                    level,
                    retired: false,
                })));
            }
        }
        self.notify(product_id, level);
        Ok(level)
    }

    /// Current counters of one product
    pub fn get(&self, product_id: ProductId) -> LedgerResult<StockLevel> {
        let cell = self.cell(product_id)?;
        let cell = cell.lock();
        if cell.retired {
            return Err(LedgerError::ProductNotFound(product_id));
        }
        Ok(cell.level)
    }

    /// Counters of every tracked product
    pub fn snapshot(&self) -> Vec<(ProductId, StockLevel)> {
        // Collect first: never hold a shard lock while taking a product lock.
        let cells: Vec<(ProductId, CellRef)> = self
            .cells
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        cells
            .into_iter()
            .filter_map(|(id, cell)| {
                let cell = cell.lock();
                (!cell.retired).then_some((id, cell.level))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Hold `quantity` units for a cart
    pub fn reserve(&self, product_id: ProductId, quantity: u32) -> LedgerResult<StockLevel> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        self.mutate(product_id, |level| {
            let available = level.available();
            if available < quantity {
                return Err(LedgerError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                });
            }
            Self::level(level.stock(), level.reserved() + quantity)
        })
    }

    /// Give back `quantity` previously reserved units
    pub fn release(&self, product_id: ProductId, quantity: u32) -> LedgerResult<StockLevel> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        self.mutate(product_id, |level| {
            let reserved = level.reserved();
            if quantity > reserved {
                tracing::error!(
                    product_id = %product_id,
                    requested = quantity,
                    reserved = reserved,
                    "Release exceeds reserved amount"
                );
                return Err(LedgerError::InvalidRelease {
                    product_id,
                    requested: quantity,
                    reserved,
                });
            }
            Self::level(level.stock(), reserved - quantity)
        })
    }

    /// Consume `quantity` reserved units as delivered
    pub fn confirm(&self, product_id: ProductId, quantity: u32) -> LedgerResult<StockLevel> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        self.mutate(product_id, |level| Self::confirmed(product_id, level, quantity))
    }

    /// Confirm several lines at once, all or nothing
    ///
    /// Duplicate product ids are summed. Locks are taken in ascending product
    /// id order.
    pub fn confirm_many(
        &self,
        lines: impl IntoIterator<Item = (ProductId, u32)>,
    ) -> LedgerResult<Vec<(ProductId, StockLevel)>> {
        let mut totals: BTreeMap<ProductId, u32> = BTreeMap::new();
        for (id, quantity) in lines {
            *totals.entry(id).or_default() += quantity;
        }
        if totals.values().any(|q| *q == 0) {
            return Err(LedgerError::InvalidQuantity);
        }

        let cells = totals
            .keys()
            .map(|id| self.cell(*id).map(|cell| (*id, cell)))
            .collect::<LedgerResult<Vec<_>>>()?;
        let mut guards: Vec<(ProductId, MutexGuard<'_, Cell>)> = cells
            .iter()
            .map(|(id, cell)| (*id, cell.lock()))
            .collect();

        let mut next = Vec::with_capacity(guards.len());
        for (id, guard) in &guards {
            if guard.retired {
                return Err(LedgerError::ProductNotFound(*id));
            }
            next.push(Self::confirmed(*id, guard.level, totals[id])?);
        }

        let mut applied = Vec::with_capacity(guards.len());
        for ((id, guard), level) in guards.iter_mut().zip(next) {
            guard.level = level;
            self.notify(*id, level);
            applied.push((*id, level));
        }
        Ok(applied)
    }

    /// Administrative stock correction
    pub fn set_stock(&self, product_id: ProductId, stock: u32) -> LedgerResult<StockLevel> {
        self.mutate(product_id, |level| {
            let reserved = level.reserved();
            StockLevel::new(stock, reserved).ok_or(LedgerError::InvalidStock {
                product_id,
                stock,
                reserved,
            })
        })
    }

    /// Stop tracking a product, refused while units are reserved
    pub fn delete(&self, product_id: ProductId) -> LedgerResult<StockLevel> {
        let cell = self.cell(product_id)?;
        let mut guard = cell.lock();
        if guard.retired {
            return Err(LedgerError::ProductNotFound(product_id));
        }
        if guard.level.reserved() > 0 {
            return Err(LedgerError::ProductInUse {
                product_id,
                reserved: guard.level.reserved(),
            });
        }
        guard.retired = true;
        self.cells.remove(&product_id);
        Ok(guard.level)
    }

    /// Put back a product removed by [`delete`](Self::delete) (failed persistence)
    pub fn restore(&self, product_id: ProductId, level: StockLevel) {
        self.warm_up([(product_id, level)]);
    }

    fn cell(&self, product_id: ProductId) -> LedgerResult<CellRef> {
        self.cells
            .get(&product_id)
            .map(|entry| entry.value().clone())
            .ok_or(LedgerError::ProductNotFound(product_id))
    }

    /// Apply `f` under the product lock and notify before unlocking
    fn mutate(
        &self,
        product_id: ProductId,
        f: impl FnOnce(StockLevel) -> LedgerResult<StockLevel>,
    ) -> LedgerResult<StockLevel> {
        // The map guard is dropped by `cell()` before the product lock is taken.
        let cell = self.cell(product_id)?;
        let mut guard = cell.lock();
        if guard.retired {
            return Err(LedgerError::ProductNotFound(product_id));
        }
        let level = f(guard.level)?;
        guard.level = level;
        self.notify(product_id, level);
        Ok(level)
    }

    fn confirmed(product_id: ProductId, level: StockLevel, quantity: u32) -> LedgerResult<StockLevel> {
        if quantity > level.reserved() || quantity > level.stock() {
            return Err(LedgerError::InvalidConfirm {
                product_id,
                requested: quantity,
                reserved: level.reserved(),
            });
        }
        Self::level(level.stock() - quantity, level.reserved() - quantity)
    }

    fn level(stock: u32, reserved: u32) -> LedgerResult<StockLevel> {
        // Callers check bounds first; this only guards against arithmetic slips.
        StockLevel::new(stock, reserved).ok_or(LedgerError::InvalidQuantity)
    }

    fn notify(&self, product_id: ProductId, level: StockLevel) {
        self.notifier.stock_changed(StockChange {
            product_id,
            stock: level.stock(),
            reserved: level.reserved(),
        });
    }
}
