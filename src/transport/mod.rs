//! The `transport` module is the boundary between the session manager and
//! the network.
//!
//! It defines the capabilities a framed pub/sub transport must provide
//! (`Connector`, `Transport`, `Subscription`), the lifecycle events a
//! transport reports back (`TransportEvent`), the JSON frame protocol spoken
//! with the broker, and the production WebSocket implementation. The session
//! manager only ever sees the traits, which is what lets its tests drive it
//! with a scripted in-memory transport.

pub mod frame;
pub mod websocket;

#[cfg(test)]
mod tests;


use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::utils::error::TransportError;

pub use websocket::WsConnector;

/// Delivery callback for one subscription; receives the raw JSON body text.
pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Lifecycle signals a transport reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker acknowledged the session; publishing and subscribing are
    /// now possible.
    Connected,
    /// The broker reported a session-fatal error frame.
    ProtocolError(String),
    /// The socket failed: handshake error, timeout, read or write failure.
    SocketError(String),
    /// The connection ended without a local `deactivate`.
    Closed,
    /// The broker ended the session gracefully. The socket teardown that
    /// follows still produces a `Closed`.
    Disconnected,
}

/// An active broker subscription. State stays registered on the broker
/// until `unsubscribe` is called or the connection dies.
pub trait Subscription: Send + Sync {
    /// Transport-unique subscription id.
    fn id(&self) -> &str;

    /// Destination this subscription listens on.
    fn destination(&self) -> &str;

    /// Removes the subscription. Repeated calls are no-ops.
    fn unsubscribe(&self) -> Result<(), TransportError>;
}

/// One framed pub/sub connection.
///
/// Implementations report their lifecycle exclusively through the event
/// channel supplied at construction, never block in `activate`, and are
/// single-use: once the connection dies the transport is discarded.
pub trait Transport: Send + Sync {
    /// Starts connecting in the background.
    fn activate(&self);

    /// Closes gracefully. Absorbs failures and is safe to call whether or
    /// not the connection ever came up.
    fn deactivate(&self);

    /// Whether the broker has acknowledged the session.
    fn connected(&self) -> bool;

    /// Sends `body` to `destination`.
    fn publish(&self, destination: &str, body: String) -> Result<(), TransportError>;

    /// Registers a delivery callback for `destination` with the broker.
    fn subscribe(
        &self,
        destination: &str,
        on_message: MessageCallback,
    ) -> Result<Box<dyn Subscription>, TransportError>;
}

/// Factory for transports bound to a configured endpoint. The session
/// builds one transport per connection attempt.
pub trait Connector: Send + Sync {
    fn open(&self, events: UnboundedSender<TransportEvent>) -> Arc<dyn Transport>;
}
