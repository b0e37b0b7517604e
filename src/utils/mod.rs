//! The `utils` module provides shared definitions used across the `roomsub`
//! crate: the error types surfaced at the transport and session boundaries,
//! and tracing setup for binaries and tests.

pub mod error;
pub mod logging;
