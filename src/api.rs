//! Authentication service client for the `/auth/*` REST endpoints

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{
    CheckAuthResponse, ErrorBody, LoginRequest, LoginResponse, ProfileUpdate, SignupRequest,
    SignupResponse, UpdateProfileResponse, UsersResponse,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

/// Multipart field name carrying the avatar image
pub const AVATAR_FIELD: &str = "profilePic";

/// Request/response contract of the authentication service.
///
/// One call per method, one schema per response. Implementations report
/// non-success responses as [`ClientError::Api`] carrying the body's
/// optional `message`.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// GET /auth/check-auth
    async fn check_auth(&self) -> Result<CheckAuthResponse>;

    /// POST /auth/signup
    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse>;

    /// POST /auth/login
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse>;

    /// POST /auth/logout
    async fn logout(&self) -> Result<()>;

    /// PUT /auth/update-profile (multipart)
    async fn update_profile(&self, update: ProfileUpdate) -> Result<UpdateProfileResponse>;

    /// GET /auth/users
    async fn users(&self) -> Result<UsersResponse>;
}

/// reqwest-backed [`AuthService`].
///
/// Keeps a cookie store so the session cookie issued by signup/login is
/// replayed on later calls, which is what lets `check_auth` recover a session.
#[derive(Debug, Clone)]
pub struct HttpAuthService {
    client: Client,
    base_url: String,
}

impl HttpAuthService {
    /// Create a client for the configured API base URL
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Turn a response into the endpoint's schema, or into an `Api` error
/// carrying the server's message.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|e| {
        ClientError::Decode(format!("{}: {}", std::any::type_name::<T>(), e))
    })
}

fn api_error(status: u16, body: &str) -> ClientError {
    let body: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    ClientError::Api {
        status,
        message: body.message,
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn check_auth(&self) -> Result<CheckAuthResponse> {
        let response = self.client.get(self.url("/auth/check-auth")).send().await?;
        read_json(response).await
    }

    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse> {
        let response = self
            .client
            .post(self.url("/auth/signup"))
            .json(request)
            .send()
            .await?;
        let parsed: SignupResponse = read_json(response).await?;
        log::info!("Signed up as {}", parsed.user_data.id);
        Ok(parsed)
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(request)
            .send()
            .await?;
        let parsed: LoginResponse = read_json(response).await?;
        log::info!("Logged in as {}", parsed.user.id);
        Ok(parsed)
    }

    async fn logout(&self) -> Result<()> {
        let response = self.client.post(self.url("/auth/logout")).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(api_error(status.as_u16(), &text))
        }
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<UpdateProfileResponse> {
        let mut form = Form::new();
        for (key, value) in update.fields {
            form = form.text(key, value);
        }
        if let Some(avatar) = update.avatar {
            let part = Part::bytes(avatar.bytes)
                .file_name(avatar.file_name)
                .mime_str(&avatar.content_type)?;
            form = form.part(AVATAR_FIELD, part);
        }

        let response = self
            .client
            .put(self.url("/auth/update-profile"))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    async fn users(&self) -> Result<UsersResponse> {
        let response = self.client.get(self.url("/auth/users")).send().await?;
        read_json(response).await
    }
}
