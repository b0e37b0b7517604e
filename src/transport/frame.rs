//! The JSON frame protocol spoken with the room broker.
//!
//! One serde-tagged object per WebSocket text message. Message bodies
//! travel as JSON-encoded strings, so any serializable payload round-trips
//! unchanged through the broker. Timestamps are Unix milliseconds stamped
//! by the sender.

use serde::{Deserialize, Serialize};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Opens the session and advertises the client's heartbeat intervals.
    #[serde(rename = "connect")]
    Connect {
        incoming_heartbeat_ms: u64,
        outgoing_heartbeat_ms: u64,
    },

    #[serde(rename = "subscribe")]
    Subscribe { id: String, destination: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { id: String },

    #[serde(rename = "send")]
    Send {
        destination: String,
        body: String,
        timestamp: i64,
    },

    /// Announces a graceful local shutdown before the socket closes.
    #[serde(rename = "disconnect")]
    Disconnect {},
}

/// Frames sent by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// The session is established.
    #[serde(rename = "connected")]
    Connected {},

    /// A message delivered to one subscription.
    #[serde(rename = "message")]
    Message {
        subscription: String,
        destination: String,
        body: String,
        timestamp: i64,
    },

    /// The broker rejected a frame or is failing the session.
    #[serde(rename = "error")]
    Error { message: String },

    /// Graceful shutdown notice; the broker closes the socket afterwards.
    #[serde(rename = "bye")]
    Bye {},
}
