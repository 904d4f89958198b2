//! Merges the last snapshot with optimistic local state for display.

use serde::{Deserialize, Serialize};

use crate::model::{Resource, ResourceId, ResourceSnapshot};
use crate::tracker::OperationTracker;

/// How a resource should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    /// The snapshot reports it running.
    Running,
    /// A start is in flight and the snapshot does not yet report it running.
    Starting,
    /// In the snapshot, not running, nothing in flight.
    Stopped,
    /// Not in the snapshot (or no snapshot yet) and nothing in flight.
    Unknown,
}

/// One display row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceView {
    /// The resource as last reported.
    pub resource: Resource,
    /// Display state.
    pub state: DisplayState,
    /// Whether the start control should be disabled.
    pub busy: bool,
}

/// Display state of `id` given the last snapshot and in-flight commands.
pub fn display_state(
    snapshot: Option<&ResourceSnapshot>,
    tracker: &OperationTracker,
    id: &ResourceId,
) -> DisplayState {
    let reported = snapshot.and_then(|s| s.get(id));
    match reported {
        Some(r) if r.running => DisplayState::Running,
        _ if tracker.is_active(id) => DisplayState::Starting,
        Some(_) => DisplayState::Stopped,
        None => DisplayState::Unknown,
    }
}

/// One view per snapshot resource, in snapshot order.
pub fn resource_views(
    snapshot: &ResourceSnapshot,
    tracker: &OperationTracker,
) -> Vec<ResourceView> {
    snapshot
        .resources
        .iter()
        .map(|r| ResourceView {
            resource: r.clone(),
            state: display_state(Some(snapshot), tracker, &r.id),
            busy: tracker.is_active(&r.id),
        })
        .collect()
}
