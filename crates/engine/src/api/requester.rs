//! Caller identity extraction.
//!
//! The bot forwards the Discord id of the user behind each request in the
//! `X-Discord-Id` header. The header is optional here; whether a command needs
//! an identity is decided by the authorization guard.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

pub const REQUESTER_HEADER: &str = "x-discord-id";

/// Caller identity, if the request carried one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester(pub Option<String>);

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let requester = parts
            .headers
            .get(REQUESTER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Requester(requester))
    }
}
