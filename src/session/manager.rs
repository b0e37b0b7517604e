use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::session::backoff::delay_for_attempt;
use crate::transport::websocket::WsConnector;
use crate::transport::{Connector, MessageCallback, Subscription, Transport, TransportEvent};
use crate::utils::error::SessionError;

/// Callback invoked on session lifecycle transitions.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;
/// Callback invoked with connection faults.
pub type ErrorCallback = Arc<dyn Fn(&SessionError) + Send + Sync>;
/// Callback invoked with each decoded message payload.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Destination all events for one room flow over.
pub fn room_topic(room_id: &str) -> String {
    format!("/topic/rooms/{room_id}")
}

/// The lifecycle callbacks supplied to [`Session::connect`].
///
/// The most recently supplied set is stored and reused verbatim by every
/// scheduled reconnection attempt, so a consumer wires its handlers once.
/// Each callback is optional.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    pub on_connect: Option<LifecycleCallback>,
    pub on_disconnect: Option<LifecycleCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after every successful connect, including reconnects.
    /// Subscriptions die with their connection, so this is the place to
    /// (re)subscribe.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when the broker ends the session gracefully.
    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Called with every connection fault, before the reconnect is
    /// scheduled.
    pub fn on_error(mut self, f: impl Fn(&SessionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

struct ActiveSubscription {
    /// Distinguishes an entry from any replacement under the same
    /// destination, so a stale handle cannot unsubscribe its successor.
    token: u64,
    handle: Box<dyn Subscription>,
}

#[derive(Default)]
struct State {
    /// Generation counter for connection attempts. Bumped when an attempt
    /// starts, when a connection is torn down and by `disconnect`; transport
    /// events and reconnect timers tagged with an older value are stale and
    /// ignored.
    epoch: u64,
    connecting: bool,
    transport: Option<Arc<dyn Transport>>,
    subscriptions: HashMap<String, ActiveSubscription>,
    reconnect_attempt: u32,
    /// Pending retry timer, tagged with the epoch it was armed for.
    reconnect_timer: Option<(u64, JoinHandle<()>)>,
    callbacks: SessionCallbacks,
    subscription_seq: u64,
}

struct SessionInner {
    connector: Arc<dyn Connector>,
    settings: Settings,
    state: Mutex<State>,
}

/// A reconnecting publish/subscribe session over one broker connection.
///
/// Cheap to clone; all clones share the same underlying connection. Build
/// one in the application's composition root and hand clones to whatever
/// needs to publish or subscribe. Operations never block, but they spawn
/// background tasks and so must run inside a Tokio runtime.
///
/// Connection failures are reported through the registered callbacks and
/// always followed by a reconnection attempt with capped backoff;
/// [`Session::disconnect`] is the only way to stop retrying.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Creates a session over a custom transport connector.
    pub fn new(settings: Settings, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                connector,
                settings,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Creates a session over the production WebSocket transport.
    pub fn websocket(settings: Settings) -> Self {
        let connector = Arc::new(WsConnector::new(settings.clone()));
        Self::new(settings, connector)
    }

    /// Opens the session, recording `callbacks` for this and every later
    /// reconnection attempt.
    ///
    /// Returns immediately; completion arrives through the callbacks. When
    /// already connected, `on_connect` is re-invoked and no new connection
    /// is made. While an attempt is in progress the call is a no-op and the
    /// pending attempt keeps the callbacks it was started with.
    pub fn connect(&self, callbacks: SessionCallbacks) {
        enum Plan {
            AlreadyConnected(Option<LifecycleCallback>),
            InFlight,
            Open(u64, Option<Arc<dyn Transport>>),
        }

        let plan = {
            let mut state = self.inner.state.lock().unwrap();
            if state.transport.as_ref().is_some_and(|t| t.connected()) {
                state.callbacks = callbacks;
                Plan::AlreadyConnected(state.callbacks.on_connect.clone())
            } else if state.connecting {
                Plan::InFlight
            } else {
                state.callbacks = callbacks;
                if let Some((_, timer)) = state.reconnect_timer.take() {
                    timer.abort();
                }
                // A dead transport can still occupy the slot when connect
                // lands before its terminal event is dispatched. Its
                // bookkeeping dies here; the epoch bump strands the event.
                let stale = state.transport.take();
                if stale.is_some() {
                    state.subscriptions.clear();
                }
                state.connecting = true;
                state.epoch += 1;
                Plan::Open(state.epoch, stale)
            }
        };

        match plan {
            Plan::AlreadyConnected(on_connect) => {
                debug!("connect called while connected");
                if let Some(on_connect) = on_connect {
                    on_connect();
                }
            }
            Plan::InFlight => {
                debug!("connect ignored: an attempt is already in progress");
            }
            Plan::Open(epoch, stale) => {
                if let Some(stale) = stale {
                    stale.deactivate();
                }
                self.open_transport(epoch);
            }
        }
    }

    fn open_transport(&self, epoch: u64) {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let transport = self.inner.connector.open(events_tx);

        {
            let mut state = self.inner.state.lock().unwrap();
            if state.epoch != epoch {
                // A disconnect superseded this attempt before it started.
                drop(state);
                transport.deactivate();
                return;
            }
            state.transport = Some(Arc::clone(&transport));
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                Session::handle_event(&inner, epoch, event);
            }
        });

        info!("connecting to {}", self.inner.settings.broker.url);
        transport.activate();
    }

    fn handle_event(inner: &Arc<SessionInner>, epoch: u64, event: TransportEvent) {
        let mut state = inner.state.lock().unwrap();
        if state.epoch != epoch {
            debug!("dropping stale transport event: {event:?}");
            return;
        }

        match event {
            TransportEvent::Connected => {
                state.connecting = false;
                state.reconnect_attempt = 0;
                if let Some((_, timer)) = state.reconnect_timer.take() {
                    timer.abort();
                }
                let on_connect = state.callbacks.on_connect.clone();
                drop(state);
                info!("session established");
                if let Some(on_connect) = on_connect {
                    on_connect();
                }
            }
            TransportEvent::ProtocolError(message) => {
                let on_error = state.callbacks.on_error.clone();
                let (next_epoch, transport) = Self::clear_connection(&mut state);
                drop(state);
                if let Some(transport) = transport {
                    transport.deactivate();
                }
                warn!("broker error: {message}");
                let fault = SessionError::Protocol(message);
                if let Some(on_error) = on_error {
                    on_error(&fault);
                }
                Self::schedule_reconnect(inner, next_epoch);
            }
            TransportEvent::SocketError(message) => {
                let on_error = state.callbacks.on_error.clone();
                let (next_epoch, transport) = Self::clear_connection(&mut state);
                drop(state);
                if let Some(transport) = transport {
                    transport.deactivate();
                }
                warn!("transport failure: {message}");
                let fault = SessionError::Transport(message);
                if let Some(on_error) = on_error {
                    on_error(&fault);
                }
                Self::schedule_reconnect(inner, next_epoch);
            }
            TransportEvent::Closed => {
                let (next_epoch, transport) = Self::clear_connection(&mut state);
                drop(state);
                if let Some(transport) = transport {
                    transport.deactivate();
                }
                warn!("connection closed unexpectedly");
                Self::schedule_reconnect(inner, next_epoch);
            }
            TransportEvent::Disconnected => {
                let on_disconnect = state.callbacks.on_disconnect.clone();
                let (next_epoch, transport) = Self::clear_connection(&mut state);
                drop(state);
                if let Some(transport) = transport {
                    transport.deactivate();
                }
                info!("broker ended the session");
                if let Some(on_disconnect) = on_disconnect {
                    on_disconnect();
                }
                Self::schedule_reconnect(inner, next_epoch);
            }
        }
    }

    /// Tears down per-connection state after the connection died and
    /// advances the epoch, so anything else the dead connection still emits
    /// is dropped as stale. Subscription entries die with it; the caller
    /// deactivates the returned transport outside the lock.
    fn clear_connection(state: &mut State) -> (u64, Option<Arc<dyn Transport>>) {
        state.connecting = false;
        state.subscriptions.clear();
        state.epoch += 1;
        (state.epoch, state.transport.take())
    }

    /// Arms the one-shot retry timer for the generation created by a
    /// teardown. A pending timer, or a newer generation created by a
    /// disconnect or a fresh connect, makes this a no-op.
    fn schedule_reconnect(inner: &Arc<SessionInner>, epoch: u64) {
        let mut state = inner.state.lock().unwrap();
        if state.epoch != epoch {
            debug!("reconnect not scheduled: superseded");
            return;
        }
        if state.reconnect_timer.is_some() {
            return;
        }

        let delay = delay_for_attempt(
            state.reconnect_attempt,
            &inner.settings.reconnect.delays_ms,
        );
        info!("retrying in {delay:?}");

        let task_inner = Arc::clone(inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // The abort in `disconnect` cannot interrupt the task once the
            // sleep has returned; the epoch check under the lock is what
            // makes cancellation reliable.
            let (next_epoch, attempt) = {
                let mut state = task_inner.state.lock().unwrap();
                if state
                    .reconnect_timer
                    .as_ref()
                    .is_some_and(|(tag, _)| *tag == epoch)
                {
                    state.reconnect_timer = None;
                }
                if state.epoch != epoch {
                    return;
                }
                state.reconnect_attempt += 1;
                state.connecting = true;
                state.epoch += 1;
                (state.epoch, state.reconnect_attempt)
            };

            info!("reconnect attempt {attempt}");
            Session { inner: task_inner }.open_transport(next_epoch);
        });
        state.reconnect_timer = Some((epoch, timer));
    }

    /// Tears the session down: cancels any pending reconnect, unsubscribes
    /// everything, closes the transport and resets the backoff counter.
    ///
    /// Idempotent, and the only way to stop the session from retrying. Safe
    /// to call from inside any lifecycle callback.
    pub fn disconnect(&self) {
        let (timer, subscriptions, transport) = {
            let mut state = self.inner.state.lock().unwrap();
            state.epoch += 1;
            state.connecting = false;
            state.reconnect_attempt = 0;
            (
                state.reconnect_timer.take(),
                std::mem::take(&mut state.subscriptions),
                state.transport.take(),
            )
        };

        if let Some((_, timer)) = timer {
            timer.abort();
        }
        for (destination, subscription) in subscriptions {
            if let Err(e) = subscription.handle.unsubscribe() {
                warn!("failed to unsubscribe from {destination} during disconnect: {e}");
            }
        }
        if let Some(transport) = transport {
            transport.deactivate();
        }
        info!("session disconnected");
    }

    /// Registers `handler` for JSON payloads arriving on `destination` and
    /// returns the handle that removes the registration.
    ///
    /// Payloads that fail to parse as JSON are logged and dropped without
    /// reaching `handler`. While disconnected this logs an error and
    /// returns an inert handle. Subscriptions do not survive a reconnect;
    /// consumers re-subscribe from `on_connect`.
    ///
    /// Subscribing to a destination that already has a subscription
    /// replaces it: the previous registration is unsubscribed and its
    /// handle becomes inert.
    pub fn subscribe(
        &self,
        destination: &str,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let on_message = decode_json_payloads(destination.to_string(), Arc::new(handler));

        let mut state = self.inner.state.lock().unwrap();
        let Some(transport) = state
            .transport
            .as_ref()
            .filter(|t| t.connected())
            .map(Arc::clone)
        else {
            drop(state);
            error!("cannot subscribe to {destination}: session is not connected");
            return SubscriptionHandle::inert();
        };

        if let Some(previous) = state.subscriptions.remove(destination) {
            warn!("replacing existing subscription on {destination}");
            if let Err(e) = previous.handle.unsubscribe() {
                warn!("failed to drop replaced subscription on {destination}: {e}");
            }
        }

        match transport.subscribe(destination, on_message) {
            Ok(handle) => {
                state.subscription_seq += 1;
                let token = state.subscription_seq;
                state
                    .subscriptions
                    .insert(destination.to_string(), ActiveSubscription { token, handle });
                debug!("subscribed to {destination}");
                SubscriptionHandle {
                    target: Some(SubscriptionTarget {
                        session: Arc::downgrade(&self.inner),
                        destination: destination.to_string(),
                        token,
                    }),
                }
            }
            Err(e) => {
                drop(state);
                error!("subscribe to {destination} failed: {e}");
                SubscriptionHandle::inert()
            }
        }
    }

    /// Subscribes to the shared topic for `room_id`; see [`room_topic`].
    pub fn subscribe_room(
        &self,
        room_id: &str,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(&room_topic(room_id), handler)
    }

    /// Serializes `body` as JSON and publishes it to `destination`.
    ///
    /// Fire and forget: while disconnected the message is logged and
    /// dropped, never queued.
    pub fn send<T: Serialize>(&self, destination: &str, body: &T) {
        let transport = {
            let state = self.inner.state.lock().unwrap();
            state
                .transport
                .as_ref()
                .filter(|t| t.connected())
                .map(Arc::clone)
        };
        let Some(transport) = transport else {
            error!("cannot send to {destination}: session is not connected");
            return;
        };

        let body = match serde_json::to_string(body) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to encode payload for {destination}: {e}");
                return;
            }
        };
        if let Err(e) = transport.publish(destination, body) {
            warn!("send to {destination} failed: {e}");
        }
    }

    /// Whether the broker currently acknowledges this session.
    pub fn connected(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.transport.as_ref().is_some_and(|t| t.connected())
    }

    /// Reconnect attempts made since the last successful connect.
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.state.lock().unwrap().reconnect_attempt
    }

    /// Destinations with a live subscription, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let state = self.inner.state.lock().unwrap();
        let mut destinations: Vec<String> = state.subscriptions.keys().cloned().collect();
        destinations.sort();
        destinations
    }
}

/// Wraps a consumer handler so payloads are decoded before delivery and
/// malformed ones never escape the transport boundary.
fn decode_json_payloads(destination: String, handler: MessageHandler) -> MessageCallback {
    Arc::new(move |raw: &str| match serde_json::from_str::<Value>(raw) {
        Ok(payload) => handler(payload),
        Err(e) => warn!("dropping malformed payload on {destination}: {e}"),
    })
}

struct SubscriptionTarget {
    session: Weak<SessionInner>,
    destination: String,
    token: u64,
}

/// Removes one subscription on request.
///
/// Calling [`unsubscribe`](SubscriptionHandle::unsubscribe) repeatedly is
/// safe; a handle whose entry was replaced or already cleared does nothing.
/// Dropping the handle does not unsubscribe.
pub struct SubscriptionHandle {
    target: Option<SubscriptionTarget>,
}

impl SubscriptionHandle {
    fn inert() -> Self {
        Self { target: None }
    }

    /// Drops the subscription's bookkeeping and tells the broker.
    pub fn unsubscribe(&self) {
        let Some(target) = &self.target else {
            return;
        };
        let Some(inner) = target.session.upgrade() else {
            return;
        };

        let removed = {
            let mut state = inner.state.lock().unwrap();
            match state.subscriptions.get(&target.destination) {
                Some(entry) if entry.token == target.token => {
                    state.subscriptions.remove(&target.destination)
                }
                _ => None,
            }
        };

        if let Some(entry) = removed {
            if let Err(e) = entry.handle.unsubscribe() {
                warn!("failed to unsubscribe from {}: {e}", target.destination);
            } else {
                debug!("unsubscribed from {}", target.destination);
            }
        }
    }
}
