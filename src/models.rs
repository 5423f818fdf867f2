//! Data models and DTOs for the chat session client
//!
//! One response type per authentication endpoint; bodies are validated
//! against these at the HTTP boundary.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// Opaque user identifier assigned by the service (`_id` on the wire)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId(id)
    }
}

/// A user as returned by the service.
///
/// Only the identifier is interpreted; every other field (name, avatar, ...)
/// is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl AuthUser {
    pub fn new(id: impl Into<UserId>) -> Self {
        AuthUser {
            id: id.into(),
            profile: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.profile.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.profile.get(key)
    }

    /// Best human-readable label: full name, then email, then the id.
    pub fn display_name(&self) -> String {
        ["fullName", "email"]
            .iter()
            .find_map(|key| self.field(key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// POST /auth/signup body
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// POST /auth/login body
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// GET /auth/check-auth
#[derive(Debug, Clone, Deserialize)]
pub struct CheckAuthResponse {
    pub user: AuthUser,
}

/// POST /auth/signup
#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    #[serde(rename = "userData")]
    pub user_data: AuthUser,
    #[serde(default)]
    pub message: Option<String>,
}

/// POST /auth/login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: AuthUser,
    #[serde(default)]
    pub message: Option<String>,
}

/// PUT /auth/update-profile
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileResponse {
    pub user: AuthUser,
    #[serde(default)]
    pub message: Option<String>,
}

/// GET /auth/users
#[derive(Debug, Clone, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<AuthUser>,
}

/// Failure body; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Binary profile picture sent as a multipart file part
#[derive(Debug, Clone, PartialEq)]
pub struct Avatar {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Avatar {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Avatar {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read an image from disk, guessing the content type from its extension
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("avatar")
            .to_string();
        let content_type = content_type_for(path).to_string();

        Ok(Avatar {
            file_name,
            content_type,
            bytes,
        })
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// PUT /auth/update-profile payload (sent as multipart/form-data)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub fields: Vec<(String, String)>,
    pub avatar: Option<Avatar>,
}

impl ProfileUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn avatar(mut self, avatar: Avatar) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.avatar.is_none()
    }
}
