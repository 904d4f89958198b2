//! Periodic resource refresh with deterministic cancellation.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use powerctl_core::model::{Resource, ResourceSnapshot};
use powerctl_core::{now_ms, Failure, Outcome};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use ulid::Ulid;

/// Identifies one started loop; stopping a stale handle does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollHandle(Ulid);

impl std::fmt::Display for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a tick or a manual refresh produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// The snapshot was replaced.
    Refreshed {
        /// Number of resources in the new snapshot.
        resources: usize,
        /// When the fetch completed.
        fetched_at_ms: i64,
    },
    /// The fetch failed; polling continues.
    Failed(Failure),
    /// The fetch was rejected as unauthorized; polling has stopped.
    SessionExpired,
    /// The loop is no longer ticking.
    Stopped(PollHandle),
}

/// Owns the current snapshot and at most one ticking loop.
pub struct PollLoop {
    shared: Arc<Shared>,
}

struct Shared {
    snapshot: RwLock<Option<Arc<ResourceSnapshot>>>,
    active: Mutex<Option<Active>>,
    events: broadcast::Sender<PollEvent>,
}

struct Active {
    handle: PollHandle,
    task: JoinHandle<()>,
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl PollLoop {
    /// Idle poller with no snapshot.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                snapshot: RwLock::new(None),
                active: Mutex::new(None),
                events,
            }),
        }
    }

    /// Last successfully fetched snapshot.
    pub fn snapshot(&self) -> Option<Arc<ResourceSnapshot>> {
        self.shared
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forgets the last snapshot.
    pub fn clear_snapshot(&self) {
        *self
            .shared
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Receiver for events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.shared.events.subscribe()
    }

    /// Whether a loop is ticking.
    pub fn is_polling(&self) -> bool {
        self.shared.active().is_some()
    }

    /// Starts ticking: one fetch right away, then one per `interval`. A loop
    /// that is already running is stopped first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, fetch: F, interval: Duration) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<Vec<Resource>>> + Send + 'static,
    {
        let handle = PollHandle(Ulid::new());
        let interval = interval.max(Duration::from_millis(1));

        let mut active = self.shared.active();
        if let Some(prev) = active.take() {
            prev.task.abort();
            tracing::debug!(previous = %prev.handle, "replacing active poll loop");
            let _ = self.shared.events.send(PollEvent::Stopped(prev.handle));
        }

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                // The fetch is created under the lock so a concurrent `stop`
                // either wins (no fetch) or waits for the call to be issued.
                let pending = {
                    let active = shared.active();
                    if !is_current(&active, handle) {
                        break;
                    }
                    fetch()
                };
                tracing::debug!(%handle, "poll tick");
                let outcome = pending.await;

                let mut active = shared.active();
                if !is_current(&active, handle) {
                    break;
                }
                if let Err(failure) = shared.apply(outcome) {
                    if failure.is_session_expired() {
                        active.take();
                        tracing::info!(%handle, "poll loop stopped: session expired");
                        let _ = shared.events.send(PollEvent::Stopped(handle));
                        break;
                    }
                }
            }
        });

        *active = Some(Active { handle, task });
        tracing::info!(%handle, interval_ms = interval.as_millis() as u64, "poll loop started");
        handle
    }

    /// Stops the loop identified by `handle`. Once this returns no further
    /// fetch is issued for it. Returns `false` if `handle` is not the active
    /// loop.
    pub fn stop(&self, handle: PollHandle) -> bool {
        let mut active = self.shared.active();
        if !is_current(&active, handle) {
            return false;
        }
        if let Some(current) = active.take() {
            current.task.abort();
        }
        drop(active);
        tracing::info!(%handle, "poll loop stopped");
        let _ = self.shared.events.send(PollEvent::Stopped(handle));
        true
    }

    /// Fetches once, outside the timer, and applies the result the same way
    /// a tick would. The interval schedule is left alone. An unauthorized
    /// result also stops the active loop.
    pub async fn refresh_now<F, Fut>(&self, fetch: F) -> Outcome<Arc<ResourceSnapshot>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<Vec<Resource>>>,
    {
        let outcome = fetch().await;
        let result = self.shared.apply(outcome);
        if let Err(failure) = &result {
            if failure.is_session_expired() {
                let current = self.shared.active().as_ref().map(|a| a.handle);
                if let Some(handle) = current {
                    self.stop(handle);
                }
            }
        }
        result
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        if let Some(active) = self.shared.active().take() {
            active.task.abort();
        }
    }
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the snapshot wholesale on success; publishes the outcome.
    fn apply(&self, outcome: Outcome<Vec<Resource>>) -> Outcome<Arc<ResourceSnapshot>> {
        match outcome {
            Ok(resources) => {
                let snapshot = Arc::new(ResourceSnapshot::new(resources, now_ms()));
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&snapshot));
                let _ = self.events.send(PollEvent::Refreshed {
                    resources: snapshot.len(),
                    fetched_at_ms: snapshot.fetched_at_ms,
                });
                Ok(snapshot)
            }
            Err(failure) if failure.is_session_expired() => {
                let _ = self.events.send(PollEvent::SessionExpired);
                Err(failure)
            }
            Err(failure) => {
                tracing::warn!(error = %failure, "resource refresh failed");
                let _ = self.events.send(PollEvent::Failed(failure.clone()));
                Err(failure)
            }
        }
    }
}

fn is_current(active: &Option<Active>, handle: PollHandle) -> bool {
    active.as_ref().is_some_and(|a| a.handle == handle)
}
