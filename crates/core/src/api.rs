//! Wire shapes of the backend HTTP contract.

use serde::{Deserialize, Serialize};

use crate::model::{ActionAck, Identity, Resource, ResourceId};

/// `POST /auth/login` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// `POST /auth/login` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for later calls.
    pub access_token: String,
    /// Always `bearer` in practice.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    /// The account the token belongs to.
    pub user: UserRecord,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

fn default_expires_in() -> u64 {
    3_600
}

/// Account record as returned by login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Account id.
    pub id: String,
    /// Account email.
    pub email: String,
    /// Whether the account has admin rights.
    #[serde(default)]
    pub is_admin: bool,
    /// Creation time as sent by the server.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl From<UserRecord> for Identity {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

/// `GET /vms/` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmListResponse {
    /// Visible VMs, in server order.
    pub vms: Vec<VmRecord>,
    /// Server-side count.
    #[serde(default)]
    pub total: Option<u64>,
}

/// One VM as returned by `GET /vms/` and `GET /vms/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    /// Numeric VM id.
    pub vm_id: u64,
    /// Display name.
    #[serde(default)]
    pub vm_name: Option<String>,
    /// `running` or anything else.
    pub status: String,
    /// Uptime in seconds.
    #[serde(default)]
    pub uptime: Option<u64>,
    /// Owner email.
    #[serde(default)]
    pub assigned_user: Option<String>,
}

impl From<VmRecord> for Resource {
    fn from(vm: VmRecord) -> Self {
        let name = vm.vm_name.unwrap_or_else(|| format!("VM-{}", vm.vm_id));
        Self {
            id: ResourceId::from(vm.vm_id),
            name,
            running: vm.status == "running",
            uptime_seconds: vm.uptime,
            assigned_owner: vm.assigned_user,
        }
    }
}

/// `POST /vms/{id}/start` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmActionResponse {
    /// Whether the command was accepted.
    pub success: bool,
    /// Server message.
    pub message: String,
    /// Id of the VM acted on.
    #[serde(default)]
    pub vm_id: Option<u64>,
    /// Name of the VM acted on.
    #[serde(default)]
    pub vm_name: Option<String>,
    /// VM status after the command.
    #[serde(default)]
    pub status: Option<String>,
}

impl From<VmActionResponse> for ActionAck {
    fn from(resp: VmActionResponse) -> Self {
        Self {
            success: resp.success,
            message: resp.message,
        }
    }
}

/// Error body used by every non-2xx response. FastAPI validation errors put a
/// list in `detail`, so it is kept loosely typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// String message or validation error list.
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// The detail as one human-readable string.
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// `POST <device endpoint>` body for the single-device variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCommand {
    /// Command name.
    pub action: String,
    /// Unix epoch milliseconds at send time.
    pub timestamp: i64,
    /// Who sent the command.
    pub source: String,
}

impl DeviceCommand {
    /// A `turn_on` command.
    pub fn turn_on(source: impl Into<String>, timestamp: i64) -> Self {
        Self {
            action: "turn_on".to_string(),
            timestamp,
            source: source.into(),
        }
    }
}
