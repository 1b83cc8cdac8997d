//! Oneshot calls into the router
//!
//! Runs a request through the full middleware stack without a listener.
//! Used by tests and by embedders that host the kiosk core in-process.

use anyhow::Result;
use axum::Router;
use axum::body::Body;
use http::{Request, Response};
use tower::Service;

use crate::core::ServerState;

pub type OneshotResult = Result<Response<Body>>;

#[async_trait::async_trait]
pub trait OneshotRouter {
    /// Process one request against `state`
    ///
    /// ```ignore
    /// let request = Request::builder().uri("/health").body(Body::empty())?;
    /// let response = build_app(&state).oneshot(&state, request).await?;
    /// ```
    async fn oneshot(&mut self, state: &ServerState, request: Request<Body>) -> OneshotResult;
}

#[async_trait::async_trait]
impl OneshotRouter for Router<ServerState> {
    async fn oneshot(&mut self, state: &ServerState, request: Request<Body>) -> OneshotResult {
        let mut svc = self.clone().with_state(state.clone());
        let response = svc.call(request).await?;
        Ok(response)
    }
}
