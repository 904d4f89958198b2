//! One bounded-time HTTP attempt, classified into an [`Outcome`].

use std::sync::Arc;
use std::time::Duration;

use powerctl_core::model::ActionAck;
use powerctl_core::normalize;
use powerctl_core::{Failure, Outcome};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use uuid::Uuid;

/// A completed 2xx response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Parses the body as a JSON record.
    pub fn decode<T: DeserializeOwned>(&self) -> Outcome<T> {
        normalize::decode(self.content_type.as_deref(), &self.body)
    }

    /// On/off reading of a schema-flexible status payload.
    pub fn is_on(&self) -> Outcome<bool> {
        normalize::normalize_boolean(self.content_type.as_deref(), &self.body)
    }

    /// Acknowledgment of a device command.
    pub fn ack(&self) -> Outcome<ActionAck> {
        normalize::decode_ack(self.content_type.as_deref(), &self.body)
    }
}

/// Description of one attempt.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, or an absolute http(s) URL.
    pub path: String,
    /// Extra path segments, each percent-encoded as a single segment.
    pub segments: Vec<String>,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
    /// Bearer token; `None` for unauthenticated endpoints.
    pub credential: Option<String>,
    /// Hard budget for this attempt.
    pub timeout: Duration,
}

impl ApiRequest {
    /// Request with no body and no credential.
    pub fn new(method: Method, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            path: path.into(),
            segments: Vec::new(),
            body: None,
            credential: None,
            timeout,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>, timeout: Duration) -> Self {
        Self::new(Method::GET, path, timeout)
    }

    /// POST request.
    pub fn post(path: impl Into<String>, timeout: Duration) -> Self {
        Self::new(Method::POST, path, timeout)
    }

    /// Appends one path segment. `/`, `?`, `#` and `%` inside it are escaped,
    /// so it can never address a different route.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Attaches a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attaches a bearer token.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.credential = Some(token.into());
        self
    }
}

/// Issues single attempts against one backend.
///
/// Clones share the HTTP connection pool and the abort switch.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: Client,
    base_url: String,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
}

impl RequestExecutor {
    /// Executor with a default HTTP client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Executor over an existing HTTP client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            abort_tx: Arc::new(abort_tx),
            abort_rx,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Aborts in-flight attempts and fails every later one. Aborted attempts
    /// complete as `Timeout`.
    pub fn abort(&self) {
        self.abort_tx.send_replace(true);
    }

    /// Whether [`abort`](Self::abort) has been called.
    pub fn is_aborted(&self) -> bool {
        *self.abort_rx.borrow()
    }

    /// Resolves once [`abort`](Self::abort) has been called.
    pub async fn aborted(&self) {
        let mut rx = self.abort_rx.clone();
        let closed = rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// `path` resolved against the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Full URL of `req`: its path resolved against the base URL, then its
    /// segments appended one by one.
    pub fn request_url(&self, req: &ApiRequest) -> Outcome<Url> {
        let mut url = Url::parse(&self.url(&req.path))
            .map_err(|e| Failure::network(format!("invalid url {:?}: {e}", req.path)))?;
        if !req.segments.is_empty() {
            url.path_segments_mut()
                .map_err(|()| Failure::network("base url cannot carry path segments"))?
                .pop_if_empty()
                .extend(&req.segments);
        }
        Ok(url)
    }

    /// Runs one attempt. Never touches session or tracker state.
    pub async fn execute(&self, req: &ApiRequest) -> Outcome<RawResponse> {
        if self.is_aborted() {
            return Err(Failure::timeout("request aborted"));
        }

        let request_id = Uuid::new_v4();
        let url = self.request_url(req)?;
        let mut builder = self
            .client
            .request(req.method.clone(), url.clone())
            .header("x-request-id", request_id.to_string());
        if let Some(token) = &req.credential {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        tracing::debug!(%request_id, method = %req.method, %url, "sending request");

        let call = async {
            let resp = builder.send().await.map_err(transport_failure)?;
            let status = resp.status().as_u16();
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.bytes().await.map_err(transport_failure)?.to_vec();
            Ok::<_, Failure>(RawResponse {
                status,
                content_type,
                body,
            })
        };

        let raw = tokio::select! {
            res = tokio::time::timeout(req.timeout, call) => match res {
                Ok(raw) => raw,
                Err(_) => Err(Failure::timeout(format!(
                    "no response within {}ms",
                    req.timeout.as_millis()
                ))),
            },
            _ = self.aborted() => Err(Failure::timeout("request aborted")),
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(failure) => {
                tracing::warn!(%request_id, %url, error = %failure, "request attempt failed");
                return Err(failure);
            }
        };

        if let Some(failure) = Failure::from_status(raw.status, normalize::error_detail(&raw.body)) {
            tracing::warn!(%request_id, %url, status = raw.status, error = %failure, "request rejected");
            return Err(failure);
        }

        tracing::debug!(%request_id, status = raw.status, "request completed");
        Ok(raw)
    }
}

fn transport_failure(err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::timeout(err.to_string())
    } else {
        Failure::network(err.to_string())
    }
}
