//! The operation contract exposed to the UI layer.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use powerctl_core::api::{LoginRequest, LoginResponse, VmActionResponse, VmListResponse, VmRecord};
use powerctl_core::model::{CommandOutcome, Identity, Resource, ResourceId, ResourceSnapshot, Session};
use powerctl_core::session::{Credential, SessionStore};
use powerctl_core::tracker::OperationTracker;
use powerctl_core::view::{self, DisplayState, ResourceView};
use powerctl_core::{now_ms, Failure, FailureKind, Outcome};
use reqwest::Method;
use tokio::sync::broadcast;

use crate::config::{ClientConfig, ConfigError};
use crate::executor::{ApiRequest, RawResponse, RequestExecutor};
use crate::poll::{PollEvent, PollHandle, PollLoop};
use crate::retry::RetryPolicy;

type ExpiryListener = Arc<dyn Fn() + Send + Sync>;

/// Login, resource listing, start commands, and polling against one backend.
///
/// Cheap to clone; clones share session, tracker, and poll state.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    executor: RequestExecutor,
    retry: RetryPolicy,
    session: SessionStore,
    tracker: OperationTracker,
    poller: PollLoop,
    poll_handle: Mutex<Option<PollHandle>>,
    expiry_listeners: RwLock<Vec<ExpiryListener>>,
}

impl Controller {
    /// Controller with its own, empty session.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_session(config, SessionStore::new())
    }

    /// Controller sharing an existing session slot.
    pub fn with_session(config: ClientConfig, session: SessionStore) -> Result<Self, ConfigError> {
        config.validate()?;
        let executor = RequestExecutor::new(config.base_url.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                retry: config.retry_policy(),
                executor,
                session,
                tracker: OperationTracker::new(),
                poller: PollLoop::new(),
                poll_handle: Mutex::new(None),
                expiry_listeners: RwLock::new(Vec::new()),
                config,
            }),
        })
    }

    /// Settings this controller was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The session slot, shared with clones.
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// In-flight start commands.
    pub fn tracker(&self) -> &OperationTracker {
        &self.inner.tracker
    }

    /// Whether a start command for `id` is in flight; drives disabled state.
    pub fn is_active(&self, id: &ResourceId) -> bool {
        self.inner.tracker.is_active(id)
    }

    /// Registers `callback` to run whenever the session is invalidated by the
    /// backend (401) or by local expiry. Not called on [`logout`](Self::logout).
    pub fn on_session_expired(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner
            .expiry_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Exchanges credentials for a session and stores it.
    pub async fn login(&self, email: &str, password: &str) -> Outcome<Session> {
        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .map_err(|e| Failure::malformed(format!("encode login request: {e}")))?;
        let req = ApiRequest::post("auth/login", self.inner.config.request_timeout()).json(body);

        let raw = self.send("login", &req).await?;
        let resp: LoginResponse = raw.decode()?;
        if resp.access_token.is_empty() {
            return Err(Failure::malformed("login response carried an empty token"));
        }

        let expires_at_ms = now_ms().saturating_add((resp.expires_in as i64).saturating_mul(1_000));
        let identity = Identity::from(resp.user);
        tracing::info!(user = %identity.email, is_admin = identity.is_admin, "logged in");
        self.inner
            .session
            .set_expiring(resp.access_token, identity, Some(expires_at_ms));
        Ok(self.inner.session.get())
    }

    /// Ends the session voluntarily: stops polling and forgets the snapshot.
    pub fn logout(&self) {
        self.stop_polling();
        self.inner.poller.clear_snapshot();
        if self.inner.session.clear() {
            tracing::info!("logged out");
        }
    }

    /// Fetches the resource list and makes it the current snapshot.
    pub async fn list_resources(&self) -> Outcome<ResourceSnapshot> {
        let snapshot = self
            .inner
            .poller
            .refresh_now(|| self.fetch_resources())
            .await?;
        Ok(snapshot.as_ref().clone())
    }

    /// Reads one resource. A record for any other id is rejected.
    pub async fn get_resource_status(&self, id: &ResourceId) -> Outcome<Resource> {
        let req = self.resource_request(Method::GET, id, "status")?;
        let raw = self.send_authed("resource status", req).await?;
        let vm: VmRecord = raw.decode()?;
        let resource = Resource::from(vm);
        if resource.id != *id {
            return Err(Failure::malformed(format!(
                "asked for resource {id}, got {}",
                resource.id
            )));
        }
        Ok(resource)
    }

    /// Issues a start command unless one is already in flight for `id`, in
    /// which case nothing is sent.
    pub async fn start_resource(&self, id: &ResourceId) -> Outcome<CommandOutcome> {
        let req = self.resource_request(Method::POST, id, "start")?;
        let Some(_guard) = self.inner.tracker.begin_scoped(id.clone()) else {
            tracing::debug!(%id, "start already in flight; skipping");
            return Ok(CommandOutcome::AlreadyInFlight);
        };

        let raw = self.send_authed("start resource", req).await?;
        let resp: VmActionResponse = raw.decode()?;
        tracing::info!(%id, success = resp.success, message = %resp.message, "start acknowledged");
        Ok(CommandOutcome::Acknowledged(resp.into()))
    }

    /// Liveness probe: short timeout, no retry, no credential.
    pub async fn health(&self) -> bool {
        let req = ApiRequest::get("health", self.inner.config.health_timeout());
        match self.inner.executor.execute(&req).await {
            Ok(_) => true,
            Err(failure) => {
                tracing::debug!(error = %failure, "health probe failed");
                false
            }
        }
    }

    /// Starts (or restarts) background polling at the configured interval.
    pub fn start_polling(&self) -> PollHandle {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = self.inner.poller.start(
            move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => Controller { inner }.fetch_resources().await,
                        None => Err(Failure::timeout("controller dropped")),
                    }
                }
            },
            self.inner.config.poll_interval(),
        );
        *self
            .inner
            .poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        handle
    }

    /// Returns `false` if nothing was polling.
    pub fn stop_polling(&self) -> bool {
        let handle = self
            .inner
            .poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => self.inner.poller.stop(handle),
            None => false,
        }
    }

    /// Whether background polling is running.
    pub fn is_polling(&self) -> bool {
        self.inner.poller.is_polling()
    }

    /// Last fetched resource list.
    pub fn snapshot(&self) -> Option<Arc<ResourceSnapshot>> {
        self.inner.poller.snapshot()
    }

    /// Poll and refresh events.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.inner.poller.subscribe()
    }

    /// What the UI should show for `id` right now.
    pub fn display_state(&self, id: &ResourceId) -> DisplayState {
        let snapshot = self.snapshot();
        view::display_state(snapshot.as_deref(), &self.inner.tracker, id)
    }

    /// Display rows for every resource in the last snapshot.
    pub fn resource_views(&self) -> Vec<ResourceView> {
        match self.snapshot() {
            Some(snapshot) => view::resource_views(&snapshot, &self.inner.tracker),
            None => Vec::new(),
        }
    }

    /// Stops polling and aborts in-flight requests. Later calls fail as
    /// `Timeout`.
    pub fn teardown(&self) {
        self.stop_polling();
        self.inner.executor.abort();
    }

    async fn fetch_resources(&self) -> Outcome<Vec<Resource>> {
        let req = ApiRequest::get("vms/", self.inner.config.request_timeout());
        let raw = self.send_authed("list resources", req).await?;
        let list: VmListResponse = raw.decode()?;
        Ok(list.vms.into_iter().map(Resource::from).collect())
    }

    /// `vms/{id}/{action}` with `id` escaped as a single segment.
    fn resource_request(
        &self,
        method: Method,
        id: &ResourceId,
        action: &str,
    ) -> Outcome<ApiRequest> {
        let segment = id.as_path_segment().ok_or_else(|| {
            Failure::new(
                FailureKind::HttpClientError(400),
                format!("invalid resource id {:?}", id.as_str()),
            )
        })?;
        Ok(ApiRequest::new(method, "vms", self.inner.config.request_timeout())
            .segment(segment)
            .segment(action))
    }

    /// Attaches the bearer token, failing fast without one.
    async fn send_authed(&self, label: &str, req: ApiRequest) -> Outcome<RawResponse> {
        let token = match self.inner.session.credential(now_ms()) {
            Credential::Bearer(token) => token,
            Credential::Missing => return Err(Failure::unauthorized("not logged in")),
            Credential::Expired => {
                self.notify_expired();
                return Err(Failure::unauthorized("session expired"));
            }
        };
        self.send(label, &req.bearer(token)).await
    }

    /// Retried attempt sequence. A 401 invalidates the session only if it
    /// still holds the token that was rejected.
    async fn send(&self, label: &str, req: &ApiRequest) -> Outcome<RawResponse> {
        let executor = &self.inner.executor;
        let attempts = self.inner.retry.run(label, move |_| executor.execute(req));
        let result = tokio::select! {
            result = attempts => result,
            _ = executor.aborted() => Err(Failure::timeout("request aborted")),
        };
        if let Err(failure) = &result {
            let cleared = failure.is_session_expired()
                && match &req.credential {
                    Some(token) => self.inner.session.clear_if_token(token),
                    None => self.inner.session.clear(),
                };
            if cleared {
                self.notify_expired();
            }
        }
        result
    }

    fn notify_expired(&self) {
        tracing::warn!("session expired; re-authentication required");
        let listeners = self
            .inner
            .expiry_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener();
        }
    }
}
