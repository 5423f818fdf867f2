//! Error types for the chat session client.
//! Coordinator operations never surface these to callers; they are logged and
//! turned into notices. The collaborator traits return them.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status.
    #[error("Server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Api {
        status: u16,
        message: Option<String>,
    },

    /// A success body did not match the endpoint's schema.
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl ClientError {
    /// Message supplied by the server in a failure body, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Api {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Http(err.to_string())
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Config(format!("invalid URL: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
