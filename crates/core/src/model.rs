//! Domain types shared by the client and the UI.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a controlled machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as one URL path segment, or `None` if it would collapse into
    /// its neighbours (`""`, `"."`, `".."`).
    pub fn as_path_segment(&self) -> Option<&str> {
        match self.0.as_str() {
            "" | "." | ".." => None,
            id => Some(id),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Who the current token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account id.
    pub id: String,
    /// Account email.
    pub email: String,
    /// Whether the account has admin rights.
    pub is_admin: bool,
}

/// Snapshot of the authentication slot.
///
/// `token` and `identity` are either both present or both absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token.
    pub token: Option<String>,
    /// Owner of the token.
    pub identity: Option<Identity>,
    /// Token expiry (ms), when the server told us.
    #[serde(default)]
    pub expires_at_ms: Option<i64>,
}

impl Session {
    /// Whether a token is present.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// The token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether the token has passed its expiry at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }
}

/// One controlled machine as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable id.
    pub id: ResourceId,
    /// Display name.
    pub name: String,
    /// Whether the backend reports it running.
    pub running: bool,
    /// Uptime, when running.
    #[serde(default)]
    pub uptime_seconds: Option<u64>,
    /// Owner email, if assigned.
    #[serde(default)]
    pub assigned_owner: Option<String>,
}

/// All resources as of one successful fetch. Replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resources in server order.
    pub resources: Vec<Resource>,
    /// When the fetch completed.
    pub fetched_at_ms: i64,
}

impl ResourceSnapshot {
    /// Snapshot of `resources` taken at `fetched_at_ms`.
    pub fn new(resources: Vec<Resource>, fetched_at_ms: i64) -> Self {
        Self {
            resources,
            fetched_at_ms,
        }
    }

    /// Resource with this id.
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    /// Whether `id` is reported running.
    pub fn is_running(&self, id: &ResourceId) -> bool {
        self.get(id).is_some_and(|r| r.running)
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the snapshot has no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Acknowledgment of a mutating command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    /// Whether the remote side accepted the command.
    pub success: bool,
    /// Remote message.
    pub message: String,
}

/// Result of asking for a mutating command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The command was sent and the remote side answered.
    Acknowledged(ActionAck),
    /// The same command is still in flight; nothing was sent.
    AlreadyInFlight,
}
