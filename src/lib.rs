/// Chat Session Client Library
/// Keeps the authenticated identity, the user roster and presence in step
/// with a single real-time connection

pub mod api;
pub mod busy;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod message_store;
pub mod models;
pub mod notify;
pub mod socket;

pub use api::{AuthService, HttpAuthService};
pub use busy::{BusyFlags, Operation};
pub use config::ClientConfig;
pub use coordinator::{ConnectionState, SessionCoordinator};
pub use error::{ClientError, Result};
pub use message_store::MessageSink;
pub use notify::Notifier;
pub use socket::{RealtimeTransport, SocketConnection, SocketEvent, WsTransport};
