//! Caller identity extractor
//!
//! Credentials are validated upstream; the server trusts the `x-user-id`
//! header it forwards.

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::{AppError, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(*user);
        }

        let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
            tracing::warn!(uri = %parts.uri, "Missing caller identity");
            return Err(AppError::not_authenticated());
        };

        let id = raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .ok_or_else(|| {
                AppError::not_authenticated().with_detail("reason", "malformed x-user-id header")
            })?;

        let user = CurrentUser { id };
        parts.extensions.insert(user);
        Ok(user)
    }
}
