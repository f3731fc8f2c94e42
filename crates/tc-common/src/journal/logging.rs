//! Structured logging functions
//!
//! Cleanup is best-effort by contract: failures must never escalate, but
//! they must always be recorded. These helpers keep the field names
//! consistent so sweeps can be audited from the log stream alone.

use tracing::{info, warn};

/// Log a single resource cleanup
pub fn log_cleanup_operation(resource_kind: &str, resource_id: &str, session: &str) {
    info!(
        resource_kind = %resource_kind,
        resource_id = %resource_id,
        session = %session,
        "Resource cleaned up"
    );
}

/// Log a best-effort cleanup failure (recorded, never escalated)
pub fn log_cleanup_failure(resource_kind: &str, resource_id: &str, session: &str, reason: &str) {
    warn!(
        resource_kind = %resource_kind,
        resource_id = %resource_id,
        session = %session,
        reason = %reason,
        "Cleanup failed; reaper remains the backstop"
    );
}

/// Log the outcome of a full session sweep
pub fn log_sweep_completed(session: &str, containers_removed: u32, networks_removed: u32) {
    info!(
        session = %session,
        containers_removed = containers_removed,
        networks_removed = networks_removed,
        "Session sweep completed"
    );
}
