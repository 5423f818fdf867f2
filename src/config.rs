//! Client configuration: where the authentication service and the real-time
//! endpoint live, and how long a single HTTP request may take.

use crate::error::{ClientError, Result};
use crate::models::UserId;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_SOCKET_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: Url,
    pub socket_url: Url,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Parse both endpoints; either may be given as http(s) or ws(s).
    pub fn new(api_base_url: &str, socket_url: &str) -> Result<Self> {
        let api_base_url = Url::parse(api_base_url)?;
        match api_base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported API scheme: {}",
                    other
                )))
            }
        }

        let socket_url = Url::parse(socket_url)?;
        match socket_url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported socket scheme: {}",
                    other
                )))
            }
        }

        Ok(ClientConfig {
            api_base_url,
            socket_url,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// WebSocket URL for a user's connection: http(s) becomes ws(s) and the
    /// user id is passed as the `userId` query parameter.
    pub fn socket_endpoint(&self, user_id: &UserId) -> Result<Url> {
        socket_endpoint(&self.socket_url, user_id)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            socket_url: Url::parse(DEFAULT_SOCKET_URL).expect("default socket URL is valid"),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

pub(crate) fn socket_endpoint(base: &Url, user_id: &UserId) -> Result<Url> {
    let rewritten = match base.scheme() {
        "http" => base.as_str().replacen("http://", "ws://", 1),
        "https" => base.as_str().replacen("https://", "wss://", 1),
        _ => base.as_str().to_string(),
    };

    let mut url = Url::parse(&rewritten)?;
    url.query_pairs_mut()
        .append_pair("userId", user_id.as_str());
    Ok(url)
}
