//! Kiosk Server - 自助点餐终端的库存预留与实时同步核心
//!
//! # 模块结构
//!
//! ```text
//! kiosk-server/src/
//! ├── core/          # 配置、状态、后台任务、HTTP 服务
//! ├── inventory/     # 库存账本 (stock / reserved) 与商品目录
//! ├── broadcast/     # 按主题推送的变更广播
//! ├── orders/        # 订单状态机
//! ├── db/            # 仓储接口与内存实现
//! ├── auth/          # 调用方身份
//! ├── api/           # HTTP 路由和处理器
//! ├── routes/        # 路由组装与中间件
//! ├── middleware/    # 请求日志
//! └── utils/         # 日志、错误类型
//! ```

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod core;
pub mod db;
pub mod inventory;
pub mod middleware;
pub mod orders;
pub mod routes;
pub mod utils;

pub use auth::CurrentUser;
pub use broadcast::{ChangeBroadcaster, Subscription};
pub use core::{Config, Server, ServerState};
pub use inventory::{CatalogService, LedgerError, StockLedger};
pub use orders::{OrderError, OrderService};
pub use routes::{OneshotRouter, build_app, build_router};
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    __ __ _             __
   / //_/(_)___  _____/ /__
  / ,<  / / __ \/ ___/ //_/
 / /| |/ / /_/ (__  ) ,<
/_/ |_/_/\____/____/_/|_|
    "#
    );
}

/// Load `.env`, prepare the work directory and start logging
pub fn setup_environment(config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.work_dir)?;
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
    }
    init_logger_with_file(
        Some(&config.log_level),
        Some(config.log_json),
        config.log_dir.as_deref(),
    );
    Ok(())
}
