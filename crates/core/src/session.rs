//! The single authentication slot.

use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{Identity, Session};

/// Shared handle to one session slot. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    slot: Arc<RwLock<Option<Live>>>,
}

#[derive(Debug, Clone)]
struct Live {
    token: String,
    identity: Identity,
    expires_at_ms: Option<i64>,
}

/// What [`SessionStore::credential`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Token usable for a bearer header.
    Bearer(String),
    /// Nobody is signed in.
    Missing,
    /// The token outlived `expires_in`; the slot has been cleared.
    Expired,
}

impl SessionStore {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slot with a session that never expires locally.
    pub fn set(&self, token: impl Into<String>, identity: Identity) {
        self.set_expiring(token, identity, None);
    }

    /// Replaces the slot with a session that expires at `expires_at_ms`.
    pub fn set_expiring(
        &self,
        token: impl Into<String>,
        identity: Identity,
        expires_at_ms: Option<i64>,
    ) {
        let live = Live {
            token: token.into(),
            identity,
            expires_at_ms,
        };
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(live);
    }

    /// Empties the slot. Returns whether a session was live; calling it on an
    /// empty slot is a no-op.
    pub fn clear(&self) -> bool {
        let was_live = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if was_live {
            tracing::info!("session cleared");
        }
        was_live
    }

    /// Empties the slot only if it still holds `token`. A rejection of an
    /// older token leaves a newer session alone.
    pub fn clear_if_token(&self, token: &str) -> bool {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|live| live.token == token) {
            *slot = None;
            tracing::info!("session cleared");
            return true;
        }
        false
    }

    /// Snapshot of the slot.
    pub fn get(&self) -> Session {
        match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Some(live) => Session {
                token: Some(live.token.clone()),
                identity: Some(live.identity.clone()),
                expires_at_ms: live.expires_at_ms,
            },
            None => Session::default(),
        }
    }

    /// Whether a session is live.
    pub fn is_authenticated(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Token to attach to the next request, clearing the slot if it expired.
    pub fn credential(&self, now_ms: i64) -> Credential {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let (token, expired) = match slot.as_ref() {
            None => return Credential::Missing,
            Some(live) => (
                live.token.clone(),
                live.expires_at_ms.is_some_and(|at| now_ms >= at),
            ),
        };
        if expired {
            *slot = None;
            tracing::info!("session expired locally");
            return Credential::Expired;
        }
        Credential::Bearer(token)
    }
}
