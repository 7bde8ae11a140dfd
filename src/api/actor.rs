//! Identity extractor for handlers.
//!
//! Authentication happens upstream: the gateway in front of this service sets
//! `x-user-id` and `x-user-role` on every request it lets through. Handlers
//! take an [`Actor`] parameter and trust it as-is.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::error::ApiError;
use crate::error::MarketError;
use crate::types::{Actor, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, USER_ID_HEADER).ok_or_else(|| {
            MarketError::Unauthorized(format!("missing {USER_ID_HEADER} header"))
        })?;
        let role: Role = header(parts, USER_ROLE_HEADER)
            .ok_or_else(|| MarketError::Unauthorized(format!("missing {USER_ROLE_HEADER} header")))?
            .parse()
            .map_err(|_| MarketError::Unauthorized("unrecognised role".into()))?;

        Ok(Actor::new(id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
