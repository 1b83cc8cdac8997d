//! 后台任务管理
//!
//! 统一管理后台任务的启动和关闭。所有任务共享一个取消令牌，
//! shutdown 时先取消再等待，超时后放弃等待。
//!
//! # 任务类型
//!
//! - [`TaskKind::Listener`] - 事件监听器（如库存写回）
//! - [`TaskKind::Periodic`] - 定时任务（如注册表统计）

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// 事件监听器
    Listener,
    /// 定时任务
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Listener => write!(f, "Listener"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// 后台任务管理器
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new(shutdown.clone());
/// tasks.spawn("stock_persistence", TaskKind::Listener, run_stock_persistence(..));
/// tasks.shutdown(Duration::from_secs(5)).await;
/// ```
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            shutdown,
        }
    }

    /// 获取取消令牌（任务内部监听 shutdown 信号）
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 注册并启动一个后台任务，panic 会被捕获并记录
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) if shutdown.is_cancelled() => {
                    tracing::debug!(task = %name, kind = %kind, "Background task stopped");
                }
                Ok(()) => {
                    tracing::warn!(task = %name, kind = %kind, "Background task exited before shutdown");
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(task = %name, kind = %kind, panic = %message, "Background task panicked");
                }
            }
        });

        tracing::debug!(task = %name, kind = %kind, "Registered background task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 返回已经结束的任务数量（运行期间应为 0）
    pub fn finished(&self) -> usize {
        self.tasks.iter().filter(|t| t.handle.is_finished()).count()
    }

    pub fn log_summary(&self) {
        let listeners = self.tasks.iter().filter(|t| t.kind == TaskKind::Listener).count();
        tracing::info!(
            total = self.tasks.len(),
            listeners = listeners,
            periodic = self.tasks.len() - listeners,
            "Background tasks registered"
        );
    }

    /// Graceful shutdown - 取消所有任务并在超时内等待完成
    pub async fn shutdown(self, timeout: Duration) {
        tracing::info!("Shutting down {} background tasks...", self.tasks.len());
        self.shutdown.cancel();

        for task in self.tasks {
            let mut handle = task.handle;
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(task = %task.name, "Task completed"),
                Ok(Err(e)) => tracing::error!(task = %task.name, error = ?e, "Task join failed"),
                Err(_) => {
                    tracing::warn!(task = %task.name, "Task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_listeners() {
        let token = CancellationToken::new();
        let mut tasks = BackgroundTasks::new(token.clone());
        let inner = tasks.shutdown_token();
        tasks.spawn("waiter", TaskKind::Listener, async move {
            inner.cancelled().await;
        });
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.finished(), 0);

        tasks.shutdown(Duration::from_secs(1)).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let mut tasks = BackgroundTasks::new(CancellationToken::new());
        tasks.spawn("boom", TaskKind::Periodic, async {
            panic!("boom");
        });
        while tasks.finished() == 0 {
            tokio::task::yield_now().await;
        }
        tasks.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_stuck_task_is_aborted() {
        let mut tasks = BackgroundTasks::new(CancellationToken::new());
        tasks.spawn("stuck", TaskKind::Listener, futures::future::pending());
        tasks.shutdown(Duration::from_millis(20)).await;
    }
}
