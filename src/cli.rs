//! CLI interface for the chat session client
//!
//! Provides command parsing, console implementations of the notification
//! surface and message store, and a cancel-safe stdin reader so input can be
//! multiplexed with socket events in the main loop.

use crate::api::AuthService;
use crate::coordinator::{ConnectionState, SessionCoordinator};
use crate::error::{ClientError, Result};
use crate::message_store::MessageSink;
use crate::models::{AuthUser, Avatar, LoginRequest, ProfileUpdate, SignupRequest};
use crate::notify::Notifier;
use crate::socket::RealtimeTransport;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, Lines};

pub const HELP: &str = "Commands:
  /signup <full_name> <email> <password>
  /login <email> <password>
  /logout
  /users            list all users with their presence
  /online           list online user ids
  /whoami
  /profile key=value [key=value ...]   (use _ for spaces in fullName)
  /avatar <path>
  /help
  /quit";

/// Command types for the CLI
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SignUp(SignupRequest),
    LogIn(LoginRequest),
    LogOut,
    Users,
    Online,
    WhoAmI,
    Profile(Vec<(String, String)>),
    Avatar(PathBuf),
    Help,
    Quit,
}

impl Command {
    /// Parse a command line
    pub fn parse(input: &str) -> std::result::Result<Self, String> {
        let input = input.trim();
        let mut parts = input.split_whitespace();
        let Some(head) = parts.next() else {
            return Err("Empty command".to_string());
        };
        let args: Vec<&str> = parts.collect();

        match head {
            "/quit" | "/exit" => Ok(Command::Quit),
            "/help" => Ok(Command::Help),
            "/logout" => Ok(Command::LogOut),
            "/users" => Ok(Command::Users),
            "/online" => Ok(Command::Online),
            "/whoami" => Ok(Command::WhoAmI),
            "/signup" => match args.as_slice() {
                [name, email, password] => Ok(Command::SignUp(SignupRequest {
                    full_name: name.replace('_', " "),
                    email: email.to_string(),
                    password: password.to_string(),
                })),
                _ => Err("Usage: /signup <full_name> <email> <password>".to_string()),
            },
            "/login" => match args.as_slice() {
                [email, password] => Ok(Command::LogIn(LoginRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                })),
                _ => Err("Usage: /login <email> <password>".to_string()),
            },
            "/profile" => {
                if args.is_empty() {
                    return Err("Usage: /profile key=value [key=value ...]".to_string());
                }
                args.iter()
                    .map(|arg| match arg.split_once('=') {
                        Some((key, value)) if !key.is_empty() => {
                            Ok((key.to_string(), profile_value(key, value)))
                        }
                        _ => Err(format!("Expected key=value, got: {}", arg)),
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Command::Profile)
            }
            "/avatar" => match args.as_slice() {
                [path] => Ok(Command::Avatar(PathBuf::from(path))),
                _ => Err("Usage: /avatar <path>".to_string()),
            },
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

/// Names cannot contain spaces on the command line, so `_` stands in for one.
/// Other values (emails, URLs, ...) are taken verbatim.
fn profile_value(key: &str, value: &str) -> String {
    if key == "fullName" {
        value.replace('_', " ")
    } else {
        value.to_string()
    }
}

/// Parse a command from user input
pub fn parse_command(input: &str) -> Result<Command> {
    Command::parse(input).map_err(ClientError::InvalidCommand)
}

/// Format a chat message for display; falls back to raw JSON for payloads
/// without the usual fields
pub fn format_message(message: &Value) -> String {
    let sender = message.get("senderId").and_then(Value::as_str);
    let text = message.get("text").and_then(Value::as_str);
    match (sender, text) {
        (Some(sender), Some(text)) => format!("<{}> {}", sender, text),
        (Some(sender), None) if message.get("image").is_some() => {
            format!("<{}> [image]", sender)
        }
        _ => message.to_string(),
    }
}

/// Format one roster line with a presence marker
pub fn format_user(user: &AuthUser, online: bool) -> String {
    let marker = if online { "*" } else { " " };
    format!("{} {} ({})", marker, user.display_name(), user.id)
}

/// Read the next line from stdin (or any async reader).
///
/// `Lines::next_line` is cancel-safe, so this can race socket events inside
/// `tokio::select!` without losing input.
///
/// # Returns
/// - `Ok(Some(line))` - User entered a line
/// - `Ok(None)` - EOF reached (Ctrl+D)
/// - `Err(e)` - I/O error
pub async fn read_line_async<R>(lines: &mut Lines<R>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await? {
        Some(mut line) => {
            if line.ends_with('\r') {
                line.pop();
            }
            Ok(Some(line))
        }
        None => Ok(None),
    }
}

/// Run one command against the coordinator.
///
/// `Quit` is handled by the caller's loop.
pub async fn execute<A, T>(coordinator: &mut SessionCoordinator<A, T>, command: Command) -> Result<()>
where
    A: AuthService,
    T: RealtimeTransport,
{
    match command {
        Command::SignUp(request) => {
            coordinator.sign_up(&request).await;
        }
        Command::LogIn(request) => {
            coordinator.log_in(&request).await;
        }
        Command::LogOut => {
            coordinator.log_out().await;
            println!("Logged out");
        }
        Command::Users => {
            if coordinator.fetch_all_users().await {
                for user in coordinator.all_users() {
                    println!("{}", format_user(user, coordinator.is_online(&user.id)));
                }
            }
        }
        Command::Online => {
            let online: Vec<String> = coordinator
                .online_users()
                .iter()
                .map(|id| id.to_string())
                .collect();
            println!("Online ({}): {}", online.len(), online.join(", "));
        }
        Command::WhoAmI => match coordinator.auth_user() {
            Some(user) => {
                let socket = match coordinator.connection_state() {
                    ConnectionState::Connected => "connected",
                    ConnectionState::Connecting => "connecting",
                    ConnectionState::Disconnected => "disconnected",
                };
                println!("{} ({}), socket {}", user.display_name(), user.id, socket);
            }
            None => println!("Not logged in"),
        },
        Command::Profile(fields) => {
            require_session(coordinator)?;
            let update = fields
                .into_iter()
                .fold(ProfileUpdate::new(), |update, (k, v)| update.field(k, v));
            coordinator.update_profile(update).await;
        }
        Command::Avatar(path) => {
            require_session(coordinator)?;
            let avatar = Avatar::load(&path).await?;
            coordinator
                .update_profile(ProfileUpdate::new().avatar(avatar))
                .await;
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn require_session<A, T>(coordinator: &SessionCoordinator<A, T>) -> Result<()>
where
    A: AuthService,
    T: RealtimeTransport,
{
    if coordinator.is_authenticated() {
        Ok(())
    } else {
        Err(ClientError::State("not logged in".to_string()))
    }
}

/// Prints notices to the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        println!("[ok] {}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("[error] {}", message);
    }
}

/// Stands in for the message store: prints every inbound message
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMessages;

impl MessageSink for ConsoleMessages {
    fn add_new_message(&self, message: Value) {
        println!("{}", format_message(&message));
    }
}
