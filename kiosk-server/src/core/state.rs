use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::broadcast::ChangeBroadcaster;
use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::db::{MemoryStore, OrderRepository, ProductRepository};
use crate::inventory::{CatalogService, StockLedger, run_stock_persistence};
use crate::orders::OrderService;
use shared::AppResult;

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，每个请求 clone 一次的成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | ledger | 库存账本 (唯一权威的库存计数) |
/// | broadcaster | 实时推送注册表 |
/// | catalog | 商品管理 |
/// | orders | 订单状态服务 |
/// | products | 商品仓储 |
/// | shutdown | 全局取消令牌 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub ledger: Arc<StockLedger>,
    pub broadcaster: ChangeBroadcaster,
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderService>,
    pub products: Arc<dyn ProductRepository>,
    pub shutdown: CancellationToken,
}

impl ServerState {
    /// 初始化服务器状态 (内存存储)
    pub fn initialize(config: &Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_repositories(config, store.clone(), store)
    }

    /// 使用外部仓储构造状态
    pub fn with_repositories(
        config: &Config,
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
    ) -> Self {
        let broadcaster = ChangeBroadcaster::new(config.subscriber_buffer);
        let ledger = Arc::new(StockLedger::new(Arc::new(broadcaster.clone())));
        let catalog = Arc::new(CatalogService::new(products.clone(), ledger.clone()));
        let orders = Arc::new(OrderService::new(orders, ledger.clone(), broadcaster.clone()));

        Self {
            config: config.clone(),
            ledger,
            broadcaster,
            catalog,
            orders,
            products,
            shutdown: CancellationToken::new(),
        }
    }

    /// 启动预热：从仓储加载库存计数
    pub async fn warm_up(&self) -> AppResult<usize> {
        self.catalog.warm_up().await
    }

    /// 启动后台任务
    ///
    /// - `stock_persistence` (Listener): 库存写回仓储
    /// - `registry_stats` (Periodic): 定时记录连接数
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new(self.shutdown.clone());

        tasks.spawn(
            "stock_persistence",
            TaskKind::Listener,
            run_stock_persistence(
                self.broadcaster.clone(),
                self.ledger.clone(),
                self.products.clone(),
                tasks.shutdown_token(),
            ),
        );

        let broadcaster = self.broadcaster.clone();
        let token = tasks.shutdown_token();
        tasks.spawn("registry_stats", TaskKind::Periodic, async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        tracing::debug!(
                            connections = broadcaster.connection_count(),
                            subscriptions = broadcaster.subscription_count(),
                            "Live registry stats"
                        );
                    }
                }
            }
        });

        tasks.log_summary();
        tasks
    }
}
