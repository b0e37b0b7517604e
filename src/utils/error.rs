//! The `error` module defines the error types used within the `roomsub`
//! crate.
//!
//! Transport failures stay inside the crate and surface to the session as
//! lifecycle events; `SessionError` is the value a consumer's `on_error`
//! callback receives. Nothing in the session API panics or returns an error
//! for routine disconnected-state usage, so these types cover the genuinely
//! exceptional paths only.

use thiserror::Error;

/// Failures raised by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The operation requires an established connection.
    #[error("transport is not connected")]
    NotConnected,

    /// The outbound queue is gone; the connection has shut down.
    #[error("transport channel closed")]
    ChannelClosed,

    /// A frame could not be encoded as JSON.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Connection faults reported to the consumer through `on_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The broker reported a session-fatal error frame.
    #[error("broker error: {0}")]
    Protocol(String),

    /// The underlying socket failed (handshake, timeout, read or write).
    #[error("transport failure: {0}")]
    Transport(String),
}
