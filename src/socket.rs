//! Real-time transport for presence and message delivery.
//!
//! A connection is opened per authenticated session, parameterized by the
//! user id. Inbound frames are decoded into typed [`SocketEvent`]s and handed
//! to whichever listeners are registered for that event kind; the owner of
//! the connection registers its listeners once and removes them before
//! closing.

use crate::config::{socket_endpoint, ClientConfig};
use crate::error::{ClientError, Result};
use crate::models::UserId;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Inbound event kinds a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    OnlineUsers,
    NewMessage,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::OnlineUsers,
        EventKind::NewMessage,
    ];

    /// Event name on the wire
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::OnlineUsers => "getOnlineUsers",
            EventKind::NewMessage => "newMessage",
        }
    }
}

/// Typed inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Handshake completed
    Connected,
    /// Connection lost or closed
    Disconnected { reason: String },
    /// Complete current online set
    OnlineUsers(Vec<UserId>),
    /// One chat message, opaque to the session layer
    NewMessage(Value),
}

impl SocketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SocketEvent::Connected => EventKind::Connect,
            SocketEvent::Disconnected { .. } => EventKind::Disconnect,
            SocketEvent::OnlineUsers(_) => EventKind::OnlineUsers,
            SocketEvent::NewMessage(_) => EventKind::NewMessage,
        }
    }
}

/// Outbound event
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Best-effort notice sent right before a client-initiated close
    UserDisconnected { user_id: UserId },
}

impl OutboundEvent {
    pub fn wire_name(&self) -> &'static str {
        match self {
            OutboundEvent::UserDisconnected { .. } => "user-disconnected",
        }
    }

    /// Encode as a `{ "event", "data" }` text frame
    pub fn to_frame(&self) -> Result<String> {
        let data = match self {
            OutboundEvent::UserDisconnected { user_id } => json!({ "userId": user_id }),
        };
        let frame = Frame {
            event: self.wire_name().to_string(),
            data,
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Decode an inbound text frame.
///
/// Returns `Ok(None)` for events this client does not consume.
pub fn decode_frame(text: &str) -> Result<Option<SocketEvent>> {
    let frame: Frame = serde_json::from_str(text)?;
    let event = match frame.event.as_str() {
        "getOnlineUsers" => SocketEvent::OnlineUsers(serde_json::from_value(frame.data)?),
        "newMessage" => SocketEvent::NewMessage(frame.data),
        other => {
            log::debug!("Ignoring socket event: {}", other);
            return Ok(None);
        }
    };
    Ok(Some(event))
}

/// Handle returned by [`SocketConnection::on`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(raw: u64) -> Self {
        ListenerId(raw)
    }
}

/// Where a listener delivers its events
pub type EventSink = mpsc::UnboundedSender<SocketEvent>;

/// Listeners of one connection, keyed by id
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Vec<(ListenerId, EventKind, EventSink)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ListenerId, kind: EventKind, sink: EventSink) {
        self.listeners.push((id, kind, sink));
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners.iter().filter(|(_, k, _)| *k == kind).count()
    }

    /// Deliver to every listener of the event's kind; returns how many got it
    pub fn dispatch(&self, event: &SocketEvent) -> usize {
        let kind = event.kind();
        self.listeners
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .filter(|(_, _, sink)| sink.send(event.clone()).is_ok())
            .count()
    }
}

/// One live real-time connection
pub trait SocketConnection: Send {
    /// Transport-level connected flag; lags behind `open` until the handshake
    fn is_connected(&self) -> bool;

    /// Register a listener for one event kind
    fn on(&mut self, kind: EventKind, sink: EventSink) -> ListenerId;

    /// Unregister a listener; false if it was not registered
    fn off(&mut self, id: ListenerId) -> bool;

    fn listener_count(&self) -> usize;

    /// Send an event; fails if not connected
    fn emit(&self, event: &OutboundEvent) -> Result<()>;

    /// Close the transport
    fn disconnect(&mut self);
}

/// Opens connections.
///
/// `open` must not suspend: it returns a handle immediately and the
/// handshake proceeds in the background.
pub trait RealtimeTransport: Send + Sync {
    fn open(&self, user_id: &UserId) -> Result<Box<dyn SocketConnection>>;
}

/// WebSocket [`RealtimeTransport`] using tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsTransport {
    base_url: Url,
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> Self {
        WsTransport {
            base_url: config.socket_url.clone(),
        }
    }
}

impl RealtimeTransport for WsTransport {
    fn open(&self, user_id: &UserId) -> Result<Box<dyn SocketConnection>> {
        let url = socket_endpoint(&self.base_url, user_id)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::State(format!("no async runtime: {}", e)))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        log::info!("Opening socket for user {}", user_id);
        runtime.spawn(run_connection(url, command_rx, connected.clone()));

        Ok(Box::new(WsConnection {
            commands,
            connected,
            listeners: HashSet::new(),
            next_listener: 0,
            closed: false,
        }))
    }
}

enum Command {
    Register {
        id: ListenerId,
        kind: EventKind,
        sink: EventSink,
    },
    Unregister(ListenerId),
    Emit(String),
    Close,
}

/// Handle to a connection task.
///
/// Commands are applied by the task in the order they were issued, so
/// unregistering before `disconnect` guarantees no listener sees the close.
pub struct WsConnection {
    commands: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    listeners: HashSet<ListenerId>,
    next_listener: u64,
    closed: bool,
}

impl SocketConnection for WsConnection {
    fn is_connected(&self) -> bool {
        !self.closed && self.connected.load(Ordering::SeqCst)
    }

    fn on(&mut self, kind: EventKind, sink: EventSink) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        if self
            .commands
            .send(Command::Register { id, kind, sink })
            .is_err()
        {
            log::debug!("Socket task gone; listener {:?} will never fire", id);
        }
        self.listeners.insert(id);
        id
    }

    fn off(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id);
        if removed && self.commands.send(Command::Unregister(id)).is_err() {
            log::debug!("Socket task gone; listener {:?} already dropped", id);
        }
        removed
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn emit(&self, event: &OutboundEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::State("socket not connected".to_string()));
        }
        let frame = event.to_frame()?;
        self.commands
            .send(Command::Emit(frame))
            .map_err(|e| ClientError::WebSocket(format!("failed to queue event: {}", e)))
    }

    fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connected.store(false, Ordering::SeqCst);
        if self.commands.send(Command::Close).is_err() {
            log::debug!("Socket task gone; nothing to close");
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Connection task: owns the socket and the listener registry
async fn run_connection(
    url: Url,
    mut commands: mpsc::UnboundedReceiver<Command>,
    connected: Arc<AtomicBool>,
) {
    let mut registry = ListenerRegistry::new();

    let handshake = connect_async(url.as_str());
    tokio::pin!(handshake);

    // Listeners registered while the handshake is in flight must see `connect`
    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok((stream, _)) => break stream,
                Err(e) => {
                    log::warn!("Socket connection to {} failed: {}", url, e);
                    registry.dispatch(&SocketEvent::Disconnected {
                        reason: e.to_string(),
                    });
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Register { id, kind, sink }) => registry.insert(id, kind, sink),
                Some(Command::Unregister(id)) => {
                    registry.remove(id);
                }
                Some(Command::Emit(_)) => log::warn!("Dropping event sent before connect"),
                Some(Command::Close) | None => {
                    log::debug!("Socket closed before handshake completed");
                    return;
                }
            },
        }
    };

    let (mut write, mut read) = ws_stream.split();
    connected.store(true, Ordering::SeqCst);
    registry.dispatch(&SocketEvent::Connected);

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Register { id, kind, sink }) => registry.insert(id, kind, sink),
                Some(Command::Unregister(id)) => {
                    registry.remove(id);
                }
                Some(Command::Emit(frame)) => {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        log::warn!("Failed to send socket event: {}", e);
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        log::debug!("Close frame not sent: {}", e);
                    }
                    break "client disconnect".to_string();
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                    Ok(Some(event)) => {
                        registry.dispatch(&event);
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Malformed socket frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break "server closed connection".to_string(),
                Some(Err(e)) => break e.to_string(),
                Some(Ok(_)) => {}
            },
        }
    };

    connected.store(false, Ordering::SeqCst);
    log::info!("Socket closed: {}", reason);
    registry.dispatch(&SocketEvent::Disconnected { reason });
}
