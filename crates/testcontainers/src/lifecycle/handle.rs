//! Container handle and lifecycle state machine
//!
//! States move monotonically: `Created -> Starting -> Running ->
//! (Ready | Failed) -> Stopping -> Removed`. `Failed` is reachable from
//! `Starting` or from a failed wait; from `Failed` the only exits are
//! `Stopping`/`Removed`. `Removed` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use tc_common::EngineError;

use crate::spec::ContainerPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Created,
    Starting,
    Running,
    Ready,
    Failed,
    Stopping,
    Removed,
}

impl ContainerState {
    pub fn can_transition_to(self, next: ContainerState) -> bool {
        use ContainerState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Created, Stopping)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Ready)
                | (Running, Failed)
                | (Running, Stopping)
                | (Ready, Stopping)
                | (Failed, Stopping)
                | (Failed, Removed)
                | (Stopping, Removed)
        )
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerState::Created => "created",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Ready => "ready",
            ContainerState::Failed => "failed",
            ContainerState::Stopping => "stopping",
            ContainerState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a managed container
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) image: String,
    pub(crate) state: ContainerState,
    pub(crate) port_bindings: HashMap<ContainerPort, u16>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) session: String,
}

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn port_binding(&self, port: ContainerPort) -> Option<u16> {
        self.port_bindings.get(&port).copied()
    }
}

/// Registry entry pairing handle data with the per-handle operation lock.
///
/// `op_lock` serializes daemon mutations for one container; `info` uses a
/// separate sync lock so status queries never wait behind an in-flight
/// daemon call.
pub(crate) struct HandleEntry {
    info: RwLock<ContainerHandle>,
    pub(crate) op_lock: tokio::sync::Mutex<()>,
}

impl HandleEntry {
    pub(crate) fn new(id: &str, name: &str, image: &str, session: &str) -> Self {
        Self {
            info: RwLock::new(ContainerHandle {
                id: id.to_string(),
                name: name.to_string(),
                image: image.to_string(),
                state: ContainerState::Created,
                port_bindings: HashMap::new(),
                created_at: Utc::now(),
                session: session.to_string(),
            }),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn id(&self) -> String {
        self.info.read().unwrap().id.clone()
    }

    pub(crate) fn session(&self) -> String {
        self.info.read().unwrap().session.clone()
    }

    pub(crate) fn state(&self) -> ContainerState {
        self.info.read().unwrap().state
    }

    pub(crate) fn snapshot(&self) -> ContainerHandle {
        self.info.read().unwrap().clone()
    }

    pub(crate) fn set_port_bindings(&self, bindings: HashMap<ContainerPort, u16>) {
        self.info.write().unwrap().port_bindings = bindings;
    }

    /// Advance the state machine; illegal transitions are state conflicts.
    pub(crate) fn transition(&self, next: ContainerState) -> Result<(), EngineError> {
        let mut info = self.info.write().unwrap();
        if !info.state.can_transition_to(next) {
            return Err(EngineError::state_conflict(
                info.id.clone(),
                info.state,
                format!("transition to {next}"),
            ));
        }
        info.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContainerState::*;

    #[test]
    fn test_happy_path_transitions() {
        let entry = HandleEntry::new("abc", "tc-abc", "redis:7", "session-1");
        for next in [Starting, Running, Ready, Stopping, Removed] {
            entry.transition(next).unwrap();
        }
        assert_eq!(entry.state(), Removed);
    }

    #[test]
    fn test_no_state_skipping() {
        let entry = HandleEntry::new("abc", "tc-abc", "redis:7", "session-1");
        // Created cannot jump straight to Ready
        assert!(entry.transition(Ready).is_err());
        assert_eq!(entry.state(), Created);
    }

    #[test]
    fn test_removed_is_terminal() {
        assert!(!Removed.can_transition_to(Stopping));
        assert!(!Removed.can_transition_to(Created));
        assert!(!Removed.can_transition_to(Removed));
    }

    #[test]
    fn test_failed_only_exits_to_teardown() {
        assert!(Failed.can_transition_to(Stopping));
        assert!(Failed.can_transition_to(Removed));
        assert!(!Failed.can_transition_to(Starting));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Ready));
    }

    #[test]
    fn test_ready_requires_running() {
        assert!(Running.can_transition_to(Ready));
        assert!(!Starting.can_transition_to(Ready));
    }

    #[test]
    fn test_illegal_transition_reports_conflict() {
        let entry = HandleEntry::new("abc", "tc-abc", "redis:7", "session-1");
        let err = entry.transition(Removed).unwrap_err();
        match err {
            EngineError::StateConflict { container_id, state, .. } => {
                assert_eq!(container_id, "abc");
                assert_eq!(state, "created");
            }
            other => panic!("expected StateConflict, got {other}"),
        }
    }
}
