//! Client configuration

use std::time::Duration;

use shared::UserId;

/// How the client observes order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusTransport {
    /// Fixed-interval `GET /status`
    #[default]
    Polling,
    /// Per-order event stream
    Streaming,
}

/// Client configuration for connecting to the kiosk server
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL (e.g., "http://localhost:3000")
    pub base_url: String,

    /// Caller identity sent as `x-user-id`
    pub user_id: Option<UserId>,

    /// Request timeout in seconds (not applied to event streams)
    pub timeout: u64,

    /// Status polling interval, also the reconnect delay for streams
    pub poll_interval: Duration,

    pub status_transport: StatusTransport,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: None,
            timeout: 30,
            poll_interval: Duration::from_secs(5),
            status_transport: StatusTransport::Polling,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_status_transport(mut self, transport: StatusTransport) -> Self {
        self.status_transport = transport;
        self
    }

    /// Create an HTTP client from this configuration
    pub fn build_http_client(&self) -> crate::ClientResult<crate::HttpClient> {
        crate::HttpClient::new(self)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}
