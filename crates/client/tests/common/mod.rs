//! In-process fake of the VM backend.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use powerctl_client::ClientConfig;
use serde_json::{json, Value};

pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "correct-horse";
pub const TOKEN: &str = "token-abc";

#[derive(Default)]
pub struct Backend {
    pub vms: Mutex<Vec<Value>>,
    /// Statuses returned by `GET /vms/` before it starts succeeding.
    pub list_failures: Mutex<VecDeque<u16>>,
    pub start_delay: Mutex<Duration>,
    /// Statuses returned by `/health` before it starts succeeding.
    pub health_failures: Mutex<VecDeque<u16>>,
    pub health_delay: Mutex<Duration>,
    /// Served by `/vms/{id}/status` regardless of the id, when set.
    pub status_reply: Mutex<Option<Value>>,
    pub revoked: AtomicBool,
    pub expires_in: AtomicU64,
    /// (content type, body) served by the device endpoint.
    pub device_reply: Mutex<(String, String)>,
    pub device_commands: Mutex<Vec<Value>>,
    hits: Mutex<HashMap<&'static str, usize>>,
}

impl Backend {
    pub fn hits(&self, route: &'static str) -> usize {
        self.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    fn hit(&self, route: &'static str) {
        *self.hits.lock().unwrap().entry(route).or_default() += 1;
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {TOKEN}");
        !self.revoked.load(Ordering::SeqCst)
            && headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                == Some(expected.as_str())
    }
}

pub struct FakeBackend {
    pub addr: SocketAddr,
    pub state: Arc<Backend>,
}

impl FakeBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(Backend {
            vms: Mutex::new(vec![
                json!({"vm_id": 106, "vm_name": "win-desktop", "status": "stopped", "assigned_user": EMAIL}),
                json!({"vm_id": 107, "vm_name": "lab", "status": "running", "uptime": 4200}),
            ]),
            expires_in: AtomicU64::new(3600),
            device_reply: Mutex::new(("application/json".into(), r#"{"status":"on"}"#.into())),
            ..Default::default()
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/auth/login", post(login))
            .route("/vms/", get(list_vms))
            .route("/vms/{id}/status", get(vm_status))
            .route("/vms/{id}/start", post(start_vm))
            .route("/device", get(device_status).post(device_command))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url(),
            request_timeout_ms: 2_000,
            ..ClientConfig::default()
        }
    }
}

/// Base URL of a port nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn health(State(st): State<Arc<Backend>>) -> Response {
    st.hit("health");
    let delay = *st.health_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    if let Some(status) = st.health_failures.lock().unwrap().pop_front() {
        return detail(StatusCode::from_u16(status).unwrap(), "unhealthy");
    }
    Json(json!({"status": "healthy"})).into_response()
}

fn same_vm(vm: &Value, id: &str) -> bool {
    vm["vm_id"].to_string() == id
}

async fn login(State(st): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    st.hit("login");
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return detail(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }
    st.revoked.store(false, Ordering::SeqCst);
    Json(json!({
        "access_token": TOKEN,
        "token_type": "bearer",
        "expires_in": st.expires_in.load(Ordering::SeqCst),
        "user": {"id": "u-1", "email": EMAIL, "is_admin": false, "created_at": "2024-01-01T00:00:00"}
    }))
    .into_response()
}

async fn list_vms(State(st): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    st.hit("list");
    if !st.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Token has expired");
    }
    if let Some(status) = st.list_failures.lock().unwrap().pop_front() {
        let status = StatusCode::from_u16(status).unwrap();
        return detail(status, "Failed to fetch VMs: upstream unavailable");
    }
    let vms = st.vms.lock().unwrap().clone();
    Json(json!({"vms": vms, "total": vms.len()})).into_response()
}

async fn vm_status(
    State(st): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    st.hit("status");
    if !st.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Token has expired");
    }
    if let Some(reply) = st.status_reply.lock().unwrap().clone() {
        return Json(reply).into_response();
    }
    let vms = st.vms.lock().unwrap().clone();
    match vms.into_iter().find(|vm| same_vm(vm, &id)) {
        Some(vm) => Json(vm).into_response(),
        None => detail(StatusCode::FORBIDDEN, "You don't have access to this VM"),
    }
}

async fn start_vm(
    State(st): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    st.hit("start");
    let delay = *st.start_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    // Checked after the delay so a token revoked mid-request is rejected.
    if !st.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Token has expired");
    }

    let mut vms = st.vms.lock().unwrap();
    let Some(vm) = vms.iter_mut().find(|vm| same_vm(vm, &id)) else {
        return detail(StatusCode::NOT_FOUND, &format!("VM {id} not found"));
    };
    vm["status"] = json!("running");
    Json(json!({
        "success": true,
        "message": format!("VM {id} started"),
        "vm_id": vm["vm_id"].clone(),
        "vm_name": vm["vm_name"].clone(),
        "status": "running"
    }))
    .into_response()
}

async fn device_status(State(st): State<Arc<Backend>>) -> Response {
    st.hit("device_status");
    let (content_type, body) = st.device_reply.lock().unwrap().clone();
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn device_command(State(st): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    st.hit("device_command");
    st.device_commands.lock().unwrap().push(body);
    let delay = *st.start_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    ([(header::CONTENT_TYPE, "text/plain")], "PC is turning on").into_response()
}
