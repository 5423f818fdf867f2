//! Session coordinator
//!
//! Owns the authenticated identity, the busy flags, the user roster, the
//! online set and the single real-time connection, and keeps the connection
//! in lockstep with the identity: it is opened only after an identity is
//! committed and torn down when the identity goes away.
//!
//! Every operation is a terminal handler for its own failures. Errors are
//! logged and surfaced through the [`Notifier`]; nothing is returned to the
//! caller beyond a success flag.

use crate::api::AuthService;
use crate::busy::{BusyFlags, Operation};
use crate::error::ClientError;
use crate::message_store::MessageSink;
use crate::models::{AuthUser, LoginRequest, ProfileUpdate, SignupRequest, UserId};
use crate::notify::Notifier;
use crate::socket::{
    EventKind, ListenerId, OutboundEvent, RealtimeTransport, SocketConnection, SocketEvent,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub const CHECK_AUTH_FAILED: &str = "error occured";
pub const SIGNUP_SUCCEEDED: &str = "Signed up successfully";
pub const SIGNUP_FAILED: &str = "Signup failed";
pub const LOGIN_SUCCEEDED: &str = "Loged in successfully";
pub const LOGIN_FAILED: &str = "Login failed";
pub const LOGOUT_FAILED: &str = "Logout failed";
pub const PROFILE_UPDATED: &str = "updated successfully";
pub const PROFILE_UPDATE_FAILED: &str = "updation failed";
pub const FETCH_USERS_FAILED: &str = "Failed to fetch users";

/// Lifecycle of the real-time connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle
    Disconnected,
    /// Handle exists, handshake not (yet) complete
    Connecting,
    Connected,
}

/// The live connection plus everything needed to tear it down
struct ActiveSocket {
    connection: Box<dyn SocketConnection>,
    listeners: Vec<ListenerId>,
    /// Identity the connection was opened for
    user_id: UserId,
    /// Fed by this connection's listeners only; dropping it discards
    /// anything still in flight from the connection
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

pub struct SessionCoordinator<A, T> {
    auth: A,
    transport: T,
    notifier: Arc<dyn Notifier>,
    messages: Arc<dyn MessageSink>,
    auth_user: Option<AuthUser>,
    busy: BusyFlags,
    all_users: Vec<AuthUser>,
    online_users: BTreeSet<UserId>,
    online_tx: watch::Sender<BTreeSet<UserId>>,
    socket: Option<ActiveSocket>,
}

impl<A: AuthService, T: RealtimeTransport> SessionCoordinator<A, T> {
    pub fn new(
        auth: A,
        transport: T,
        notifier: Arc<dyn Notifier>,
        messages: Arc<dyn MessageSink>,
    ) -> Self {
        let (online_tx, _) = watch::channel(BTreeSet::new());
        SessionCoordinator {
            auth,
            transport,
            notifier,
            messages,
            auth_user: None,
            busy: BusyFlags::new(),
            all_users: Vec::new(),
            online_users: BTreeSet::new(),
            online_tx,
            socket: None,
        }
    }

    // --- Authentication operations ---

    /// Recover an existing session, e.g. from the session cookie.
    ///
    /// Any failure, transient or not, leaves the user logged out.
    pub async fn check_session(&mut self) -> bool {
        let _busy = self.busy.begin(Operation::CheckAuth);

        match self.auth.check_auth().await {
            Ok(response) => {
                log::info!("Session restored for {}", response.user.id);
                self.auth_user = Some(response.user);
                self.connect_socket();
                true
            }
            Err(e) => {
                self.report_failure(Operation::CheckAuth, &e, CHECK_AUTH_FAILED);
                self.clear_identity();
                false
            }
        }
    }

    pub async fn sign_up(&mut self, request: &SignupRequest) -> bool {
        let _busy = self.busy.begin(Operation::SignUp);

        match self.auth.signup(request).await {
            Ok(response) => {
                self.auth_user = Some(response.user_data);
                self.notifier
                    .success(message_or(&response.message, SIGNUP_SUCCEEDED));
                self.connect_socket();
                true
            }
            Err(e) => {
                self.report_failure(Operation::SignUp, &e, SIGNUP_FAILED);
                self.clear_identity();
                false
            }
        }
    }

    pub async fn log_in(&mut self, request: &LoginRequest) -> bool {
        let _busy = self.busy.begin(Operation::LogIn);

        match self.auth.login(request).await {
            Ok(response) => {
                self.auth_user = Some(response.user);
                self.notifier
                    .success(message_or(&response.message, LOGIN_SUCCEEDED));
                self.connect_socket();
                true
            }
            Err(e) => {
                self.report_failure(Operation::LogIn, &e, LOGIN_FAILED);
                self.clear_identity();
                false
            }
        }
    }

    /// End the session.
    ///
    /// The service call is awaited first so the UI never shows a logout the
    /// service has not seen; local state is cleared whatever it returns.
    pub async fn log_out(&mut self) {
        if let Err(e) = self.auth.logout().await {
            self.report_failure("logout", &e, LOGOUT_FAILED);
        }

        if let Some(user) = self.auth_user.take() {
            log::info!("Logged out {}", user.id);
        }
        self.disconnect_socket();
        self.set_online_users(BTreeSet::new());
    }

    /// Send profile fields (and optionally an avatar); on success the stored
    /// identity becomes the server's copy. On failure it is left as it was.
    pub async fn update_profile(&mut self, update: ProfileUpdate) -> bool {
        let _busy = self.busy.begin(Operation::UpdateProfile);

        match self.auth.update_profile(update).await {
            Ok(response) => {
                self.auth_user = Some(response.user);
                self.notifier
                    .success(message_or(&response.message, PROFILE_UPDATED));
                true
            }
            Err(e) => {
                self.report_failure(Operation::UpdateProfile, &e, PROFILE_UPDATE_FAILED);
                false
            }
        }
    }

    /// Replace the roster. A failed fetch empties it rather than leaving a
    /// stale list behind.
    pub async fn fetch_all_users(&mut self) -> bool {
        let _busy = self.busy.begin(Operation::FetchUsers);

        match self.auth.users().await {
            Ok(response) => {
                log::debug!("Fetched {} users", response.users.len());
                self.all_users = response.users;
                true
            }
            Err(e) => {
                self.all_users.clear();
                self.report_failure(Operation::FetchUsers, &e, FETCH_USERS_FAILED);
                false
            }
        }
    }

    // --- Real-time connection lifecycle ---

    /// Open the connection for the current identity.
    ///
    /// No-op without an identity or while a connected handle for the same
    /// identity exists. A connected handle opened for another identity is
    /// closed the regular way (departure notice included). A handle that is
    /// not connected is torn down before its replacement is opened, so there
    /// is never more than one connection or one set of listeners.
    /// Nothing here suspends, so the check and the assignment cannot
    /// interleave with another operation.
    pub fn connect_socket(&mut self) {
        let Some(user_id) = self.auth_user.as_ref().map(|u| u.id.clone()) else {
            log::debug!("connect_socket: no session");
            return;
        };

        if let Some(active) = &self.socket {
            if active.user_id != user_id {
                log::info!(
                    "Session changed from {} to {}; reopening socket",
                    active.user_id,
                    user_id
                );
                self.disconnect_socket();
                self.set_online_users(BTreeSet::new());
            } else if active.connection.is_connected() {
                log::debug!("connect_socket: already connected");
                return;
            }
        }

        if let Some(stale) = self.socket.take() {
            log::info!("Replacing socket that is not connected");
            Self::teardown(stale);
        }

        let mut connection = match self.transport.open(&user_id) {
            Ok(connection) => connection,
            Err(e) => {
                log::error!("Failed to open socket for {}: {}", user_id, e);
                return;
            }
        };

        let (events_tx, events) = mpsc::unbounded_channel();
        let listeners = EventKind::ALL
            .iter()
            .map(|kind| connection.on(*kind, events_tx.clone()))
            .collect();

        self.socket = Some(ActiveSocket {
            connection,
            listeners,
            user_id,
            events,
        });
    }

    /// Close the connection, announcing the departure first if connected.
    pub fn disconnect_socket(&mut self) {
        let Some(active) = self.socket.take() else {
            log::debug!("disconnect_socket: no socket");
            return;
        };

        if active.connection.is_connected() {
            let notice = OutboundEvent::UserDisconnected {
                user_id: active.user_id.clone(),
            };
            if let Err(e) = active.connection.emit(&notice) {
                log::warn!("Disconnect notice not sent: {}", e);
            }
        } else {
            log::debug!("Socket not connected; skipping disconnect notice");
        }

        Self::teardown(active);
    }

    /// Unregister exactly the listeners `connect_socket` registered, then close
    fn teardown(mut active: ActiveSocket) {
        for id in active.listeners.drain(..) {
            if !active.connection.off(id) {
                log::warn!("Listener {:?} was already gone", id);
            }
        }
        active.connection.disconnect();
        log::info!("Socket for {} closed", active.user_id);
    }

    // --- Inbound events ---

    /// Wait for the next event from the current connection.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` next to user input.
    /// Pends forever while there is no connection or the connection has
    /// nothing more to say.
    pub async fn next_socket_event(&mut self) -> SocketEvent {
        if let Some(active) = self.socket.as_mut() {
            if let Some(event) = active.events.recv().await {
                return event;
            }
        }
        futures::future::pending().await
    }

    /// Route one inbound event
    pub fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Connected => log::info!("socket connected"),
            SocketEvent::Disconnected { reason } => log::info!("socket disconnected: {}", reason),
            SocketEvent::OnlineUsers(users) => {
                log::debug!("Presence snapshot: {} online", users.len());
                self.set_online_users(users.into_iter().collect());
            }
            SocketEvent::NewMessage(message) => self.messages.add_new_message(message),
        }
    }

    /// Route every event already queued without waiting; returns the count
    pub fn dispatch_pending(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(active) = self.socket.as_mut() {
            while let Ok(event) = active.events.try_recv() {
                pending.push(event);
            }
        }

        let count = pending.len();
        for event in pending {
            self.handle_socket_event(event);
        }
        count
    }

    // --- State accessors ---

    pub fn auth_user(&self) -> Option<&AuthUser> {
        self.auth_user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_user.is_some()
    }

    /// Handle onto the busy flags; clone it to watch from another task
    pub fn busy(&self) -> &BusyFlags {
        &self.busy
    }

    pub fn all_users(&self) -> &[AuthUser] {
        &self.all_users
    }

    pub fn online_users(&self) -> &BTreeSet<UserId> {
        &self.online_users
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.online_users.contains(user_id)
    }

    /// Receiver that sees every replacement of the online set
    pub fn subscribe_online_users(&self) -> watch::Receiver<BTreeSet<UserId>> {
        self.online_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        match &self.socket {
            None => ConnectionState::Disconnected,
            Some(active) if active.connection.is_connected() => ConnectionState::Connected,
            Some(_) => ConnectionState::Connecting,
        }
    }

    /// Listeners registered on the current connection (0 or 4)
    pub fn listener_count(&self) -> usize {
        self.socket
            .as_ref()
            .map(|active| active.connection.listener_count())
            .unwrap_or(0)
    }

    // --- Helpers ---

    fn set_online_users(&mut self, users: BTreeSet<UserId>) {
        self.online_users = users.clone();
        self.online_tx.send_replace(users);
    }

    /// Identity gone: the connection tied to it goes too
    fn clear_identity(&mut self) {
        self.auth_user = None;
        if self.socket.is_some() {
            self.disconnect_socket();
            self.set_online_users(BTreeSet::new());
        }
    }

    fn report_failure(&self, op: impl fmt::Display, err: &ClientError, default: &str) {
        log::error!("{} failed: {}", op, err);
        self.notifier.error(err.server_message().unwrap_or(default));
    }
}

fn message_or<'a>(message: &'a Option<String>, default: &'a str) -> &'a str {
    message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(default)
}
