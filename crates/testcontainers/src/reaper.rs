//! Cleanup sentinel
//!
//! Every session owns a sentinel task with its own daemon client. The
//! sentinel sweeps all session-labeled resources when any of three things
//! happens: the session signals an explicit end, the session is dropped
//! without one (crash paths that unwind), or the daemon liveness stream
//! closes. Cleanup correctness therefore does not depend on the normal
//! exit path of the code that provisioned the resources.

use futures_util::stream::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use tc_common::journal::{log_cleanup_failure, log_cleanup_operation, log_sweep_completed};
use tc_common::EngineError;

use crate::config::ReaperConfig;
use crate::daemon::{DaemonApi, LivenessStream};

/// Label marking a resource as engine-owned
pub const MANAGED_LABEL: &str = "org.testcontainers.managed";

/// Label carrying the owning session id
pub const SESSION_LABEL: &str = "org.testcontainers.session";

enum EndMode {
    /// Sentinel running; signal it and await the sweep
    Sentinel(mpsc::Sender<oneshot::Sender<()>>),
    /// Sentinel disabled; sweep inline on explicit end
    Inline,
    /// Already ended; nothing left to do
    Done,
}

/// A cleanup session. Resources provisioned under it carry its labels;
/// ending it (or losing it) removes them all.
pub struct ReaperSession {
    id: String,
    daemon: Arc<dyn DaemonApi>,
    stop_timeout: Duration,
    mode: Mutex<EndMode>,
}

impl ReaperSession {
    /// Start a session and, unless disabled, its sentinel task.
    /// Must be called within a tokio runtime.
    pub(crate) fn begin(daemon: Arc<dyn DaemonApi>, config: &ReaperConfig) -> Self {
        let id = uuid::Uuid::new_v4().to_string();

        let mode = if config.enabled {
            let (end_tx, end_rx) = mpsc::channel(1);
            let liveness = daemon.liveness_stream();
            tokio::spawn(sentinel(
                daemon.clone(),
                id.clone(),
                config.sweep_stop_timeout,
                end_rx,
                liveness,
            ));
            EndMode::Sentinel(end_tx)
        } else {
            EndMode::Inline
        };

        info!(session = %id, sentinel = config.enabled, "Session started");

        Self {
            id,
            daemon,
            stop_timeout: config.sweep_stop_timeout,
            mode: Mutex::new(mode),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ownership labels stamped onto every resource of this session
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(SESSION_LABEL.to_string(), self.id.clone());
        labels
    }

    /// Daemon-side filter selecting this session's resources
    pub fn label_filter(&self) -> String {
        format!("{SESSION_LABEL}={}", self.id)
    }

    /// End the session, removing every resource carrying its label.
    /// Idempotent: a second end after resources are gone succeeds silently.
    pub async fn end(&self) -> Result<(), EngineError> {
        let mode = {
            let mut guard = self.mode.lock().await;
            std::mem::replace(&mut *guard, EndMode::Done)
        };

        match mode {
            EndMode::Sentinel(end_tx) => {
                let (ack_tx, ack_rx) = oneshot::channel();
                if end_tx.send(ack_tx).await.is_ok() {
                    // sentinel already gone means it already swept
                    let _ = ack_rx.await;
                }
                Ok(())
            }
            EndMode::Inline => {
                sweep(&self.daemon, &self.id, self.stop_timeout).await;
                Ok(())
            }
            EndMode::Done => Ok(()),
        }
    }
}

async fn sentinel(
    daemon: Arc<dyn DaemonApi>,
    session_id: String,
    stop_timeout: Duration,
    mut end_rx: mpsc::Receiver<oneshot::Sender<()>>,
    mut liveness: LivenessStream,
) {
    debug!(session = %session_id, "Cleanup sentinel watching");

    let ack = tokio::select! {
        command = end_rx.recv() => match command {
            Some(ack) => {
                debug!(session = %session_id, "Session end requested");
                Some(ack)
            }
            None => {
                warn!(session = %session_id, "Session dropped without end; sweeping");
                None
            }
        },
        _ = drain(&mut liveness) => {
            warn!(session = %session_id, "Daemon connection lost; sweeping session resources");
            None
        }
    };

    sweep(&daemon, &session_id, stop_timeout).await;

    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}

/// Run a liveness stream to completion; resolves only on disconnect.
async fn drain(liveness: &mut LivenessStream) {
    while liveness.next().await.is_some() {}
}

/// Remove every container and network carrying the session label. Every
/// failure is recorded and the sweep continues; nothing escalates.
async fn sweep(daemon: &Arc<dyn DaemonApi>, session_id: &str, stop_timeout: Duration) {
    let filter = format!("{SESSION_LABEL}={session_id}");
    let mut containers_removed: u32 = 0;
    let mut networks_removed: u32 = 0;

    match daemon.list_containers(&filter).await {
        Ok(containers) => {
            for container in containers {
                if let Err(e) = daemon
                    .stop_container(&container.id, Some(stop_timeout.as_secs() as i64))
                    .await
                {
                    debug!(container_id = %container.id, error = %e, "Sweep stop failed");
                }
                match daemon.remove_container(&container.id, true).await {
                    Ok(()) => {
                        containers_removed += 1;
                        log_cleanup_operation("container", &container.id, session_id);
                    }
                    Err(e) => {
                        log_cleanup_failure("container", &container.id, session_id, &e.to_string())
                    }
                }
            }
        }
        Err(e) => log_cleanup_failure("container", "*", session_id, &e.to_string()),
    }

    match daemon.list_networks(&filter).await {
        Ok(networks) => {
            for network in networks {
                match daemon.remove_network(&network.id).await {
                    Ok(()) => {
                        networks_removed += 1;
                        log_cleanup_operation("network", &network.id, session_id);
                    }
                    Err(e) => {
                        log_cleanup_failure("network", &network.id, session_id, &e.to_string())
                    }
                }
            }
        }
        Err(e) => log_cleanup_failure("network", "*", session_id, &e.to_string()),
    }

    log_sweep_completed(session_id, containers_removed, networks_removed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_carry_session_id() {
        // label layout is a wire contract with the sweep filter
        let filter_key = SESSION_LABEL;
        assert!(filter_key.starts_with("org.testcontainers."));
        assert_ne!(MANAGED_LABEL, SESSION_LABEL);
    }
}
