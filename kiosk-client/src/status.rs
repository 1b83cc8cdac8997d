//! 订单状态监控
//!
//! Watches one order until it is delivered, either by polling the status
//! endpoint or by following the per-order event stream. Both transports feed
//! the same tracker, so consumers see each status once, in order, and the
//! channel closes after `Delivered`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared::{OrderId, OrderStatus, StatusChange};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, StatusTransport};
use crate::error::{ClientError, ClientResult};
use crate::feed::EventFeed;
use crate::http::HttpClient;

/// Status reads used by the monitor
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, order_id: OrderId) -> ClientResult<OrderStatus>;
    async fn watch_status(&self, order_id: OrderId) -> ClientResult<EventFeed<StatusChange>>;
}

#[async_trait]
impl StatusSource for HttpClient {
    async fn fetch_status(&self, order_id: OrderId) -> ClientResult<OrderStatus> {
        self.order_status(order_id).await
    }

    async fn watch_status(&self, order_id: OrderId) -> ClientResult<EventFeed<StatusChange>> {
        self.status_feed(order_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Dedup and forward observed statuses
struct Tracker {
    order_id: OrderId,
    last: Option<OrderStatus>,
    tx: mpsc::Sender<ClientResult<StatusUpdate>>,
}

impl Tracker {
    /// True once nothing more should be observed
    async fn observe(&mut self, status: OrderStatus) -> bool {
        if self.last.is_some_and(|last| status <= last) {
            return false;
        }
        self.last = Some(status);
        let update = StatusUpdate {
            order_id: self.order_id,
            status,
        };
        if self.tx.send(Ok(update)).await.is_err() {
            return true;
        }
        status.is_terminal()
    }

    async fn fail(&self, err: ClientError) {
        tracing::error!(order_id = %self.order_id, error = %err, "Status monitor stopped");
        let _ = self.tx.send(Err(err)).await;
    }
}

/// Handle to a running monitor
///
/// Dropping the handle cancels the background task.
#[derive(Debug)]
pub struct StatusMonitor {
    order_id: OrderId,
    updates: mpsc::Receiver<ClientResult<StatusUpdate>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StatusMonitor {
    /// Start watching with the transport and interval from `config`
    pub fn start(
        source: Arc<dyn StatusSource>,
        order_id: OrderId,
        config: &ClientConfig,
    ) -> Self {
        Self::spawn(
            source,
            order_id,
            config.status_transport,
            config.poll_interval,
            CancellationToken::new(),
        )
    }

    /// Start watching; `cancel` stops the task early
    pub fn spawn(
        source: Arc<dyn StatusSource>,
        order_id: OrderId,
        transport: StatusTransport,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, updates) = mpsc::channel(16);
        let tracker = Tracker {
            order_id,
            last: None,
            tx,
        };
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            match transport {
                StatusTransport::Polling => poll(source, tracker, interval, token).await,
                StatusTransport::Streaming => follow(source, tracker, interval, token).await,
            }
            tracing::debug!(order_id = %order_id, "Status monitor finished");
        });

        Self {
            order_id,
            updates,
            cancel,
            task,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Next update; `None` after `Delivered`, a fatal error or cancellation
    pub async fn recv(&mut self) -> Option<ClientResult<StatusUpdate>> {
        self.updates.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Unknown statuses stop the monitor; other failures are retried
fn is_fatal(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::UnknownStatus(_) | ClientError::NotFound(_) | ClientError::Unauthorized
    )
}

async fn poll(
    source: Arc<dyn StatusSource>,
    mut tracker: Tracker,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match source.fetch_status(tracker.order_id).await {
            Ok(status) => {
                if tracker.observe(status).await {
                    return;
                }
            }
            Err(e) if is_fatal(&e) => return tracker.fail(e).await,
            Err(e) => {
                tracing::warn!(order_id = %tracker.order_id, error = %e, "Status poll failed");
            }
        }
    }
}

async fn follow(
    source: Arc<dyn StatusSource>,
    mut tracker: Tracker,
    reconnect_delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        match source.watch_status(tracker.order_id).await {
            Ok(mut feed) => loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = feed.next() => next,
                };
                match next {
                    Some(Ok(change)) => {
                        if tracker.observe(change.status).await {
                            return;
                        }
                    }
                    Some(Err(e)) if is_fatal(&e) => return tracker.fail(e).await,
                    Some(Err(e)) => {
                        tracing::warn!(order_id = %tracker.order_id, error = %e, "Status stream broke");
                        break;
                    }
                    None => break,
                }
            },
            Err(e) if is_fatal(&e) => return tracker.fail(e).await,
            Err(e) => {
                tracing::warn!(order_id = %tracker.order_id, error = %e, "Status stream unavailable");
            }
        }

        // the server sends the current status first on reconnect
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}
