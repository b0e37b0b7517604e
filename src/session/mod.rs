//! The reconnecting session layer.
//!
//! [`Session`] owns one broker connection and the policy around it:
//! lifecycle callbacks, capped-backoff reconnection and per-destination
//! subscriptions. The transport underneath is swappable through the
//! [`Connector`](crate::transport::Connector) trait, which is how the
//! tests drive the session without a network.

pub mod backoff;
mod manager;

pub use manager::{
    ErrorCallback, LifecycleCallback, MessageHandler, Session, SessionCallbacks,
    SubscriptionHandle, room_topic,
};
