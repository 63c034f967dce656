//! Infrastructure - ports and their implementations.

pub mod clock;
pub mod ports;
pub mod simulated_host;
