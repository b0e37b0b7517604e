//! WebSocket implementation of the transport boundary.
//!
//! Each `WsTransport` owns a single connection attempt. `activate` spawns
//! the connect task, which splits the socket into a writer task draining an
//! unbounded outbound queue (interleaving protocol pings) and a read loop
//! that dispatches broker frames to per-subscription callbacks. Lifecycle is
//! reported exclusively through `TransportEvent`s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::config::Settings;
use crate::transport::frame::{ClientFrame, ServerFrame};
use crate::transport::{Connector, MessageCallback, Subscription, Transport, TransportEvent};
use crate::utils::error::TransportError;

// Subscription id → delivery callback for the live connection.
type CallbackRegistry = Arc<Mutex<HashMap<String, MessageCallback>>>;

/// Builds [`WsTransport`]s bound to the configured broker endpoint.
pub struct WsConnector {
    settings: Settings,
}

impl WsConnector {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Connector for WsConnector {
    fn open(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Arc<dyn Transport> {
        Arc::new(WsTransport::new(self.settings.clone(), events))
    }
}

/// One WebSocket connection to the broker.
pub struct WsTransport {
    settings: Settings,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    // Taken by the first `activate`; a transport connects at most once.
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<WsMessage>>>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    subscriptions: CallbackRegistry,
}

impl WsTransport {
    fn new(settings: Settings, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            events,
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            connected: Arc::new(AtomicBool::new(false)),
            closing: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn send_frame(&self, frame: &ClientFrame) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame)?;
        self.outbound
            .send(WsMessage::text(text))
            .map_err(|_| TransportError::ChannelClosed)
    }
}

impl Transport for WsTransport {
    fn activate(&self) {
        let Some(outbound_rx) = self.outbound_rx.lock().unwrap().take() else {
            warn!("transport activated twice; ignoring");
            return;
        };
        tokio::spawn(run_connection(ConnectionParts {
            settings: self.settings.clone(),
            events: self.events.clone(),
            outbound: self.outbound.clone(),
            outbound_rx,
            connected: Arc::clone(&self.connected),
            closing: Arc::clone(&self.closing),
            subscriptions: Arc::clone(&self.subscriptions),
        }));
    }

    fn deactivate(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            if let Err(e) = self.send_frame(&ClientFrame::Disconnect {}) {
                debug!("goodbye frame not sent: {e}");
            }
        }
        // If the handshake is still pending the connect task notices
        // `closing` and drops the socket itself.
        if self.outbound.send(WsMessage::Close(None)).is_err() {
            debug!("connection already gone during deactivate");
        }
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, destination: &str, body: String) -> Result<(), TransportError> {
        if !self.connected() {
            return Err(TransportError::NotConnected);
        }
        self.send_frame(&ClientFrame::Send {
            destination: destination.to_string(),
            body,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn subscribe(
        &self,
        destination: &str,
        on_message: MessageCallback,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        if !self.connected() {
            return Err(TransportError::NotConnected);
        }
        let id = Uuid::new_v4().to_string();
        self.subscriptions
            .lock()
            .unwrap()
            .insert(id.clone(), on_message);
        if let Err(e) = self.send_frame(&ClientFrame::Subscribe {
            id: id.clone(),
            destination: destination.to_string(),
        }) {
            self.subscriptions.lock().unwrap().remove(&id);
            return Err(e);
        }
        Ok(Box::new(WsSubscription {
            id,
            destination: destination.to_string(),
            outbound: self.outbound.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
        }))
    }
}

struct WsSubscription {
    id: String,
    destination: String,
    outbound: mpsc::UnboundedSender<WsMessage>,
    subscriptions: CallbackRegistry,
}

impl Subscription for WsSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    fn unsubscribe(&self) -> Result<(), TransportError> {
        if self.subscriptions.lock().unwrap().remove(&self.id).is_none() {
            // Already removed; nothing left to tell the broker.
            return Ok(());
        }
        let frame = ClientFrame::Unsubscribe {
            id: self.id.clone(),
        };
        let text = serde_json::to_string(&frame)?;
        self.outbound
            .send(WsMessage::text(text))
            .map_err(|_| TransportError::ChannelClosed)
    }
}

struct ConnectionParts {
    settings: Settings,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    outbound_rx: mpsc::UnboundedReceiver<WsMessage>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    subscriptions: CallbackRegistry,
}

async fn run_connection(parts: ConnectionParts) {
    let ConnectionParts {
        settings,
        events,
        outbound,
        outbound_rx,
        connected,
        closing,
        subscriptions,
    } = parts;

    let url = settings.broker.url.clone();
    let connect_timeout = Duration::from_millis(settings.session.connect_timeout_ms);

    let ws_stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            let _ = events.send(TransportEvent::SocketError(format!(
                "handshake with {url} failed: {e}"
            )));
            return;
        }
        Err(_) => {
            let _ = events.send(TransportEvent::SocketError(format!(
                "timed out connecting to {url}"
            )));
            return;
        }
    };

    if closing.load(Ordering::SeqCst) {
        debug!("deactivated before the handshake finished");
        return;
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Writer: drain the outbound queue, interleaving pings so the broker
    // sees traffic even on a quiet room.
    let ping_every = settings.session.outgoing_heartbeat_ms;
    let writer_closing = Arc::clone(&closing);
    let writer_events = events.clone();
    tokio::spawn(async move {
        let mut rx = outbound_rx;
        let mut ping = interval(Duration::from_millis(ping_every.max(1)));
        ping.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let was_close = matches!(msg, WsMessage::Close(_));
                    if let Err(e) = ws_sender.send(msg).await {
                        if !writer_closing.load(Ordering::SeqCst) {
                            let _ = writer_events
                                .send(TransportEvent::SocketError(format!("write failed: {e}")));
                        }
                        break;
                    }
                    if was_close {
                        break;
                    }
                }
                _ = ping.tick(), if ping_every > 0 => {
                    if ws_sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("writer loop ended");
    });

    let hello = ClientFrame::Connect {
        incoming_heartbeat_ms: settings.session.incoming_heartbeat_ms,
        outgoing_heartbeat_ms: settings.session.outgoing_heartbeat_ms,
    };
    match serde_json::to_string(&hello) {
        Ok(text) => {
            if outbound.send(WsMessage::text(text)).is_err() {
                return;
            }
        }
        Err(e) => {
            let _ = events.send(TransportEvent::SocketError(format!(
                "failed to encode connect frame: {e}"
            )));
            return;
        }
    }

    // Read loop with an idle watchdog: a broker that stops talking for two
    // heartbeat windows is treated as dead.
    let idle_ms = settings.session.incoming_heartbeat_ms;
    let idle_window = Duration::from_millis(idle_ms.saturating_mul(2));
    loop {
        let next = if idle_ms == 0 {
            ws_receiver.next().await
        } else {
            match timeout(idle_window, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let _ = events.send(TransportEvent::SocketError(format!(
                        "no broker traffic for {}ms",
                        idle_window.as_millis()
                    )));
                    break;
                }
            }
        };

        let Some(result) = next else {
            break;
        };
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                if !closing.load(Ordering::SeqCst) {
                    let _ = events.send(TransportEvent::SocketError(format!("read failed: {e}")));
                }
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                handle_frame(text.as_str(), &events, &connected, &subscriptions);
            }
            WsMessage::Ping(payload) => {
                let _ = outbound.send(WsMessage::Pong(payload));
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    connected.store(false, Ordering::SeqCst);
    if closing.load(Ordering::SeqCst) {
        debug!("connection closed");
    } else {
        let _ = events.send(TransportEvent::Closed);
    }
}

fn handle_frame(
    text: &str,
    events: &mpsc::UnboundedSender<TransportEvent>,
    connected: &AtomicBool,
    subscriptions: &CallbackRegistry,
) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::Connected {}) => {
            connected.store(true, Ordering::SeqCst);
            let _ = events.send(TransportEvent::Connected);
        }
        Ok(ServerFrame::Message {
            subscription,
            destination,
            body,
            ..
        }) => {
            // Clone the callback out so no registry lock is held while
            // consumer code runs.
            let callback = subscriptions
                .lock()
                .unwrap()
                .get(&subscription)
                .map(Arc::clone);
            match callback {
                Some(on_message) => on_message(&body),
                // Expected after an unsubscribe races an in-flight delivery.
                None => debug!("dropping message for unknown subscription on {destination}"),
            }
        }
        Ok(ServerFrame::Error { message }) => {
            let _ = events.send(TransportEvent::ProtocolError(message));
        }
        Ok(ServerFrame::Bye {}) => {
            connected.store(false, Ordering::SeqCst);
            let _ = events.send(TransportEvent::Disconnected);
        }
        Err(e) => {
            warn!("ignoring unparseable broker frame: {e}");
        }
    }
}
