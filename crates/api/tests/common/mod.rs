//! Shared fixtures for router-level tests
//!
//! Each test builds its own router over a fresh in-memory store, so tests
//! can run in parallel.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use helpdesk_api::{
    auth::hash_password,
    notify::{BroadcastHub, ChangeEmitter, HubEmitter},
    AppState, Config,
};
use helpdesk_shared::{
    Comment, HelpdeskStore, MemoryStore, NewTechnician, NewUser, Technician, Ticket, TicketPatch,
    User, UserRole,
};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "test-session-secret-must-be-at-least-32-characters";
pub const PASSWORD: &str = "correct-horse-battery";

// ============================================================================
// Emitter double
// ============================================================================

/// Records every change it is told about, then forwards to the hub
pub struct RecordingEmitter {
    events: Mutex<Vec<(&'static str, Uuid)>>,
    inner: HubEmitter,
}

impl RecordingEmitter {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            inner: HubEmitter::new(hub),
        }
    }

    fn record(&self, name: &'static str, ticket_id: Uuid) {
        self.events.lock().unwrap().push((name, ticket_id));
    }

    pub fn events(&self) -> Vec<(&'static str, Uuid)> {
        self.events.lock().unwrap().clone()
    }
}

impl ChangeEmitter for RecordingEmitter {
    fn ticket_created(&self, ticket: &Ticket) {
        self.record("ticket_created", ticket.id);
        self.inner.ticket_created(ticket);
    }

    fn ticket_updated(&self, ticket_id: Uuid, patch: &TicketPatch) {
        self.record("ticket_updated", ticket_id);
        self.inner.ticket_updated(ticket_id, patch);
    }

    fn ticket_deleted(&self, ticket_id: Uuid) {
        self.record("ticket_deleted", ticket_id);
        self.inner.ticket_deleted(ticket_id);
    }

    fn comment_created(&self, comment: &Comment) {
        self.record("comment_created", comment.ticket_id);
        self.inner.comment_created(comment);
    }
}

// ============================================================================
// Test application
// ============================================================================

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub emitter: Arc<RecordingEmitter>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build the app after adjusting the test config
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::for_memory(SECRET);
        adjust(&mut config);
        config.upload_dir = std::env::temp_dir().join(format!("helpdesk-test-{}", Uuid::new_v4()));

        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let emitter = Arc::new(RecordingEmitter::new(Arc::clone(&hub)));
        let state = AppState::with_emitter(
            config,
            Arc::clone(&store) as Arc<dyn HelpdeskStore>,
            hub,
            Arc::clone(&emitter) as Arc<dyn ChangeEmitter>,
        );
        let router = helpdesk_api::create_router(state.clone());

        Self {
            state,
            store,
            emitter,
            router,
        }
    }

    pub async fn user(&self, name: &str, role: UserRole) -> User {
        self.store
            .create_user(NewUser {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                password_hash: hash_password(PASSWORD).unwrap(),
                role,
            })
            .await
            .unwrap()
    }

    pub async fn technician(&self, name: &str, user_id: Option<Uuid>, active: bool) -> Technician {
        self.store
            .create_technician(NewTechnician {
                display_name: name.to_string(),
                email: None,
                user_id,
                active,
            })
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state
            .jwt_manager
            .generate_session_token(user.id, &user.name, &user.email, user.role)
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    /// Submit a ticket anonymously and return its id
    pub async fn submit_ticket(&self, title: &str) -> Uuid {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/tickets",
                None,
                Some(serde_json::json!({
                    "title": title,
                    "description": "It stopped working",
                    "requester_name": "Carla",
                    "requester_email": "carla@example.com",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().parse().unwrap()
    }
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}
