//! Common test utilities for integration tests
//! Provides scripted fakes for every collaborator of the session coordinator
//! and an in-process mock of the authentication service
#![allow(dead_code)]

use actix_web::cookie::Cookie;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use async_trait::async_trait;
use chat_session::busy::{BusyFlags, Operation};
use chat_session::error::{ClientError, Result};
use chat_session::message_store::MessageSink;
use chat_session::models::{
    CheckAuthResponse, LoginRequest, LoginResponse, ProfileUpdate, SignupRequest, SignupResponse,
    UpdateProfileResponse, UserId, UsersResponse,
};
use chat_session::notify::Notifier;
use chat_session::socket::{
    EventKind, EventSink, ListenerId, ListenerRegistry, OutboundEvent, RealtimeTransport,
    SocketConnection, SocketEvent,
};
use chat_session::{AuthService, SessionCoordinator};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// --- Authentication service fake ---

/// Scripted outcome of one service call
pub enum Reply {
    Ok(Value),
    Fail {
        status: u16,
        message: Option<String>,
    },
    Network(String),
    /// Never completes
    Hang,
}

impl Reply {
    pub fn fail(status: u16, message: &str) -> Self {
        Reply::Fail {
            status,
            message: Some(message.to_string()),
        }
    }

    pub fn fail_silently(status: u16) -> Self {
        Reply::Fail {
            status,
            message: None,
        }
    }
}

#[derive(Default)]
struct FakeAuthState {
    replies: HashMap<&'static str, VecDeque<Reply>>,
    calls: Vec<&'static str>,
    observed: Option<BusyFlags>,
    busy_during_call: Vec<(&'static str, bool)>,
    profile_updates: Vec<ProfileUpdate>,
    logins: Vec<LoginRequest>,
    signups: Vec<SignupRequest>,
}

/// [`AuthService`] answering from per-endpoint reply queues.
/// An endpoint with no queued reply fails with a bare 500.
#[derive(Clone, Default)]
pub struct FakeAuth {
    state: Arc<Mutex<FakeAuthState>>,
}

impl FakeAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, endpoint: &'static str, reply: Reply) {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    /// Record the busy flags seen while each call is in flight
    pub fn observe(&self, flags: BusyFlags) {
        self.state.lock().unwrap().observed = Some(flags);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn busy_during_call(&self) -> Vec<(&'static str, bool)> {
        self.state.lock().unwrap().busy_during_call.clone()
    }

    pub fn profile_updates(&self) -> Vec<ProfileUpdate> {
        self.state.lock().unwrap().profile_updates.clone()
    }

    pub fn logins(&self) -> Vec<LoginRequest> {
        self.state.lock().unwrap().logins.clone()
    }

    pub fn signups(&self) -> Vec<SignupRequest> {
        self.state.lock().unwrap().signups.clone()
    }

    async fn answer<T: DeserializeOwned>(&self, endpoint: &'static str, op: Option<Operation>) -> Result<T> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(endpoint);
            if let (Some(flags), Some(op)) = (state.observed.clone(), op) {
                state.busy_during_call.push((endpoint, flags.is_busy(op)));
            }
            state
                .replies
                .get_mut(endpoint)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Reply::Fail {
                    status: 500,
                    message: None,
                })
        };

        match reply {
            Reply::Ok(value) => {
                serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
            }
            Reply::Fail { status, message } => Err(ClientError::Api { status, message }),
            Reply::Network(reason) => Err(ClientError::Http(reason)),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn check_auth(&self) -> Result<CheckAuthResponse> {
        self.answer("check-auth", Some(Operation::CheckAuth)).await
    }

    async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse> {
        self.state.lock().unwrap().signups.push(request.clone());
        self.answer("signup", Some(Operation::SignUp)).await
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.state.lock().unwrap().logins.push(request.clone());
        self.answer("login", Some(Operation::LogIn)).await
    }

    async fn logout(&self) -> Result<()> {
        let _: Value = self.answer("logout", None).await?;
        Ok(())
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<UpdateProfileResponse> {
        self.state.lock().unwrap().profile_updates.push(update);
        self.answer("update-profile", Some(Operation::UpdateProfile))
            .await
    }

    async fn users(&self) -> Result<UsersResponse> {
        self.answer("users", Some(Operation::FetchUsers)).await
    }
}

// --- Real-time transport fake ---

/// State of one fake connection, shared between the handle given to the
/// coordinator and the test
#[derive(Default)]
pub struct FakeSocketState {
    pub user_id: Option<UserId>,
    pub connected: bool,
    pub closed: bool,
    pub registry: ListenerRegistry,
    pub emitted: Vec<OutboundEvent>,
    /// Ordered record of calls made on the handle
    pub journal: Vec<String>,
    next_listener: u64,
}

/// Test-side view of a fake connection
#[derive(Clone)]
pub struct FakeSocket {
    state: Arc<Mutex<FakeSocketState>>,
}

impl FakeSocket {
    pub fn user_id(&self) -> Option<UserId> {
        self.state.lock().unwrap().user_id.clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().registry.len()
    }

    pub fn listener_count_for(&self, kind: EventKind) -> usize {
        self.state.lock().unwrap().registry.count(kind)
    }

    pub fn emitted(&self) -> Vec<OutboundEvent> {
        self.state.lock().unwrap().emitted.clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    /// Deliver an inbound event to the registered listeners; returns how
    /// many listeners received it
    pub fn push(&self, event: SocketEvent) -> usize {
        self.state.lock().unwrap().registry.dispatch(&event)
    }
}

struct FakeConnection {
    state: Arc<Mutex<FakeSocketState>>,
}

impl SocketConnection for FakeConnection {
    fn is_connected(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.connected && !state.closed
    }

    fn on(&mut self, kind: EventKind, sink: EventSink) -> ListenerId {
        let mut state = self.state.lock().unwrap();
        state.next_listener += 1;
        let id = ListenerId::new(state.next_listener);
        state.registry.insert(id, kind, sink);
        state.journal.push(format!("on:{}", kind.wire_name()));
        id
    }

    fn off(&mut self, id: ListenerId) -> bool {
        let mut state = self.state.lock().unwrap();
        state.journal.push("off".to_string());
        state.registry.remove(id)
    }

    fn listener_count(&self) -> usize {
        self.state.lock().unwrap().registry.len()
    }

    fn emit(&self, event: &OutboundEvent) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected || state.closed {
            return Err(ClientError::State("socket not connected".to_string()));
        }
        state.journal.push(format!("emit:{}", event.wire_name()));
        state.emitted.push(event.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.journal.push("disconnect".to_string());
        state.connected = false;
        state.closed = true;
    }
}

#[derive(Default)]
struct FakeTransportState {
    sockets: Vec<FakeSocket>,
    connect_immediately: bool,
    refuse: bool,
}

/// [`RealtimeTransport`] handing out in-memory connections
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeTransportState>>,
}

impl FakeTransport {
    /// Connections report connected as soon as they are opened
    pub fn new() -> Self {
        FakeTransport {
            state: Arc::new(Mutex::new(FakeTransportState {
                connect_immediately: true,
                ..Default::default()
            })),
        }
    }

    /// Connections stay "connecting" until the test says otherwise
    pub fn lagging() -> Self {
        FakeTransport {
            state: Arc::new(Mutex::new(FakeTransportState::default())),
        }
    }

    pub fn refuse_connections(&self) {
        self.state.lock().unwrap().refuse = true;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().sockets.len()
    }

    pub fn socket(&self, index: usize) -> FakeSocket {
        self.state.lock().unwrap().sockets[index].clone()
    }

    pub fn last_socket(&self) -> FakeSocket {
        self.state
            .lock()
            .unwrap()
            .sockets
            .last()
            .cloned()
            .expect("no connection was opened")
    }
}

impl RealtimeTransport for FakeTransport {
    fn open(&self, user_id: &UserId) -> Result<Box<dyn SocketConnection>> {
        let mut state = self.state.lock().unwrap();
        if state.refuse {
            return Err(ClientError::WebSocket("connection refused".to_string()));
        }
        let socket_state = Arc::new(Mutex::new(FakeSocketState {
            user_id: Some(user_id.clone()),
            connected: state.connect_immediately,
            ..Default::default()
        }));
        state.sockets.push(FakeSocket {
            state: socket_state.clone(),
        });
        Ok(Box::new(FakeConnection {
            state: socket_state,
        }))
    }
}

// --- Notification surface and message store fakes ---

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Success(String),
    Error(String),
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().unwrap().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.notices
            .lock()
            .unwrap()
            .push(Notice::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.notices
            .lock()
            .unwrap()
            .push(Notice::Error(message.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingMessages {
    messages: Mutex<Vec<Value>>,
}

impl RecordingMessages {
    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }
}

impl MessageSink for RecordingMessages {
    fn add_new_message(&self, message: Value) {
        self.messages.lock().unwrap().push(message);
    }
}

// --- Test context ---

pub type TestCoordinator = SessionCoordinator<FakeAuth, FakeTransport>;

/// A coordinator wired to fakes, plus test-side handles onto every fake
pub struct TestContext {
    pub coordinator: TestCoordinator,
    pub auth: FakeAuth,
    pub transport: FakeTransport,
    pub notifier: Arc<RecordingNotifier>,
    pub messages: Arc<RecordingMessages>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_transport(FakeTransport::new())
    }

    pub fn with_transport(transport: FakeTransport) -> Self {
        let auth = FakeAuth::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let messages = Arc::new(RecordingMessages::default());
        let coordinator = SessionCoordinator::new(
            auth.clone(),
            transport.clone(),
            notifier.clone(),
            messages.clone(),
        );
        auth.observe(coordinator.busy().clone());

        TestContext {
            coordinator,
            auth,
            transport,
            notifier,
            messages,
        }
    }

    /// Log in as `id` through the fake service
    pub async fn logged_in_as(id: &str) -> Self {
        let mut ctx = Self::new();
        ctx.auth.reply(
            "login",
            Reply::Ok(json!({ "user": { "_id": id }, "message": "Loged in successfully" })),
        );
        assert!(ctx.coordinator.log_in(&login_request()).await);
        ctx
    }
}

pub fn login_request() -> LoginRequest {
    LoginRequest {
        email: "alice@example.com".to_string(),
        password: "secret".to_string(),
    }
}

pub fn signup_request() -> SignupRequest {
    SignupRequest {
        full_name: "Alice Doe".to_string(),
        email: "alice@example.com".to_string(),
        password: "secret".to_string(),
    }
}

pub fn ids(raw: &[&str]) -> Vec<UserId> {
    raw.iter().map(|id| UserId::from(*id)).collect()
}

// --- Mock authentication service over HTTP ---

const SESSION_COOKIE: &str = "jwt";

fn session_cookie(value: &str) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value.to_string())
        .path("/")
        .http_only(true)
        .finish()
}

fn alice() -> Value {
    json!({ "_id": "u1", "fullName": "Alice Doe", "email": "alice@example.com" })
}

async fn mock_login(body: web::Json<Value>) -> HttpResponse {
    if body.get("password").and_then(Value::as_str) == Some("secret") {
        HttpResponse::Ok()
            .cookie(session_cookie("token-u1"))
            .json(json!({ "user": alice(), "message": "Loged in successfully" }))
    } else {
        HttpResponse::BadRequest().json(json!({ "message": "Invalid credentials" }))
    }
}

async fn mock_signup(body: web::Json<Value>) -> HttpResponse {
    let name = body.get("fullName").cloned().unwrap_or(Value::Null);
    HttpResponse::Created()
        .cookie(session_cookie("token-u2"))
        .json(json!({ "userData": { "_id": "u2", "fullName": name }, "message": "User created" }))
}

async fn mock_check_auth(req: HttpRequest) -> HttpResponse {
    match req.cookie(SESSION_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => {
            HttpResponse::Ok().json(json!({ "user": alice() }))
        }
        _ => HttpResponse::Unauthorized()
            .json(json!({ "message": "Unauthorized - No Token Provided" })),
    }
}

async fn mock_logout() -> HttpResponse {
    let mut cookie = session_cookie("");
    cookie.make_removal();
    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "message": "Logged out successfully" }))
}

async fn mock_update_profile(req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("multipart/form-data") {
        return HttpResponse::BadRequest().json(json!({ "message": "expected multipart" }));
    }

    let body = String::from_utf8_lossy(&body);
    let mut user = alice();
    if body.contains("name=\"fullName\"") {
        user["fullName"] = json!("Alice Updated");
    }
    if body.contains("name=\"profilePic\"") {
        user["profilePic"] = json!("https://cdn.example/u1.png");
    }
    HttpResponse::Ok().json(json!({ "user": user, "message": "Profile updated" }))
}

async fn mock_users() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "users": [
            { "_id": "u2", "fullName": "Bob" },
            { "_id": "u3", "fullName": "Carol" }
        ]
    }))
}

async fn mock_wrong_shape() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "people": [] }))
}

/// Start the mock authentication service on a random port.
///
/// The API lives under `/api`; `/broken/auth/users` answers 200 with a body
/// of the wrong shape.
///
/// # Returns
/// A tuple of (server, bind_address)
pub fn create_mock_auth_server() -> std::io::Result<(actix_web::dev::Server, String)> {
    let server = HttpServer::new(|| {
        App::new()
            .route("/api/auth/signup", web::post().to(mock_signup))
            .route("/api/auth/login", web::post().to(mock_login))
            .route("/api/auth/check-auth", web::get().to(mock_check_auth))
            .route("/api/auth/logout", web::post().to(mock_logout))
            .route("/api/auth/update-profile", web::put().to(mock_update_profile))
            .route("/api/auth/users", web::get().to(mock_users))
            .route("/broken/auth/users", web::get().to(mock_wrong_shape))
    })
    .workers(1)
    .bind("127.0.0.1:0")?;

    let addr = server
        .addrs()
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    Ok((server.run(), addr))
}
