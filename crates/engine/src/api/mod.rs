//! API layer - HTTP entry points.

pub mod http;
pub mod requester;

pub use requester::Requester;
