//! # RoomSub
//!
//! `roomsub` is a reconnecting publish/subscribe client for watch-party
//! rooms, built with Rust. It keeps one WebSocket session to the message
//! broker alive, retries with capped backoff when that session drops, and
//! routes JSON payloads to per-destination subscriptions.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `session`: The reconnecting session manager and the crate's public face.
//! - `transport`: The wire frames and the WebSocket connection underneath a session.
//! - `config`: Handles loading and managing client configuration.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod config;
pub mod session;
pub mod transport;
pub mod utils;
