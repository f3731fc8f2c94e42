//! Container lifecycle management
//!
//! The manager owns every `ContainerHandle` and serializes daemon mutations
//! per handle while keeping cross-handle operations concurrent. `provision`
//! returns only once the container is `Ready` or classified as failed, and
//! a failed provision always attempts best-effort teardown of whatever was
//! partially created; the reaper is a backstop, not the primary cleanup
//! path.

pub mod handle;

pub use handle::{ContainerHandle, ContainerState};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use tc_common::journal::{log_cleanup_failure, log_cleanup_operation};
use tc_common::EngineError;

use crate::config::WaitConfig;
use crate::daemon::{DaemonApi, ExecOutput};
use crate::lifecycle::handle::HandleEntry;
use crate::spec::{ContainerPort, ContainerSpec};
use crate::wait::{self, WaitContext};

/// Grace period handed to the daemon when stopping a container
const STOP_GRACE_SECS: i64 = 10;

pub struct LifecycleManager {
    daemon: Arc<dyn DaemonApi>,
    wait_config: WaitConfig,
    handles: RwLock<HashMap<String, Arc<HandleEntry>>>,
}

impl LifecycleManager {
    pub fn new(daemon: Arc<dyn DaemonApi>, wait_config: WaitConfig) -> Self {
        Self {
            daemon,
            wait_config,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Create, start, and wait for readiness. Returns the container id once
    /// `Ready`; on any failure the partially-created container is torn down
    /// best-effort and the original error surfaces.
    pub async fn provision(
        &self,
        session_id: &str,
        session_labels: &BTreeMap<String, String>,
        mut spec: ContainerSpec,
    ) -> Result<String, EngineError> {
        spec.validate()?;

        for (key, value) in session_labels {
            spec.labels.insert(key.clone(), value.clone());
        }

        let image = spec.image_ref();
        self.daemon.ensure_image(&image).await?;

        let name = spec.container_name.clone().unwrap_or_else(|| {
            let uuid = uuid::Uuid::new_v4().to_string();
            format!("tc-{}", &uuid[..8])
        });

        let id = self.daemon.create_container(&name, &spec).await?;
        info!(container_id = %id, name = %name, image = %image, "Created container");

        let entry = Arc::new(HandleEntry::new(&id, &name, &image, session_id));
        self.handles
            .write()
            .unwrap()
            .insert(id.clone(), entry.clone());

        let _guard = entry.op_lock.lock().await;
        match self.start_and_wait(&entry, &spec).await {
            Ok(()) => {
                entry.transition(ContainerState::Ready)?;
                info!(container_id = %id, "Container ready");
                Ok(id)
            }
            Err(primary) => {
                // Failed is reachable from Starting and from a failed wait;
                // a create-time failure never got past Created.
                let _ = entry.transition(ContainerState::Failed);
                self.teardown_locked(&entry).await;
                Err(primary)
            }
        }
    }

    async fn start_and_wait(
        &self,
        entry: &HandleEntry,
        spec: &ContainerSpec,
    ) -> Result<(), EngineError> {
        let id = entry.id();

        entry.transition(ContainerState::Starting)?;

        // The first network rides in the create request; the rest are
        // attached before the process starts.
        for network in spec.networks.iter().skip(1) {
            self.daemon.connect_network(network, &id).await?;
        }

        self.daemon.start_container(&id).await?;
        entry.transition(ContainerState::Running)?;

        let details = self.daemon.inspect_container(&id).await?;
        let mut ports = details.port_bindings;
        for (host_port, container_port) in &spec.fixed_ports {
            ports.entry(*container_port).or_insert(*host_port);
        }
        entry.set_port_bindings(ports.clone());

        let ctx = WaitContext {
            daemon: self.daemon.clone(),
            container_id: id,
            host: "127.0.0.1".to_string(),
            ports,
            config: self.wait_config.clone(),
            default_timeout: spec
                .startup_timeout
                .unwrap_or(self.wait_config.startup_timeout),
        };

        wait::await_ready(&ctx, spec.wait_conditions()).await
    }

    /// Stop and remove a container. Idempotent: terminating an unknown or
    /// already-`Removed` handle is a no-op success, so explicit cleanup and
    /// the reaper can both run without coordination.
    pub async fn terminate(&self, id: &str) -> Result<(), EngineError> {
        let entry = { self.handles.read().unwrap().get(id).cloned() };
        let Some(entry) = entry else {
            debug!(container_id = %id, "Terminate on unknown handle, nothing to do");
            return Ok(());
        };

        let _guard = entry.op_lock.lock().await;

        if entry.state() == ContainerState::Removed {
            return Ok(());
        }

        // A previous terminate may have failed mid-way; re-entering
        // Stopping is the explicit retry of that transition.
        if entry.state() != ContainerState::Stopping {
            entry.transition(ContainerState::Stopping)?;
        }

        if let Err(e) = self
            .daemon
            .stop_container(id, Some(STOP_GRACE_SECS))
            .await
        {
            warn!(container_id = %id, error = %e, "Stop failed, forcing removal");
        }

        self.daemon.remove_container(id, true).await?;
        entry.transition(ContainerState::Removed)?;
        info!(container_id = %id, "Container removed");
        Ok(())
    }

    /// Best-effort teardown used on failed provisions. Never escalates;
    /// failures are recorded and left to the reaper.
    async fn teardown_locked(&self, entry: &HandleEntry) {
        let id = entry.id();
        let session = entry.session();

        if entry.transition(ContainerState::Stopping).is_err() {
            return;
        }

        if let Err(e) = self.daemon.stop_container(&id, Some(STOP_GRACE_SECS)).await {
            debug!(container_id = %id, error = %e, "Stop during teardown failed");
        }

        match self.daemon.remove_container(&id, true).await {
            Ok(()) => {
                let _ = entry.transition(ContainerState::Removed);
                log_cleanup_operation("container", &id, &session);
            }
            Err(e) => {
                log_cleanup_failure("container", &id, &session, &e.to_string());
            }
        }
    }

    /// Run a command inside a `Running`/`Ready` container. Serialized with
    /// other mutations on the same handle.
    pub async fn exec_in(&self, id: &str, argv: &[String]) -> Result<ExecOutput, EngineError> {
        let entry = { self.handles.read().unwrap().get(id).cloned() }
            .ok_or_else(|| EngineError::state_conflict(id, "unknown", "exec_in"))?;

        let _guard = entry.op_lock.lock().await;

        let state = entry.state();
        if !matches!(state, ContainerState::Running | ContainerState::Ready) {
            return Err(EngineError::state_conflict(id, state, "exec_in"));
        }

        self.daemon.exec(id, argv).await
    }

    /// Non-blocking readiness query
    pub fn ready(&self, id: &str) -> bool {
        self.handles
            .read()
            .unwrap()
            .get(id)
            .map(|entry| entry.state() == ContainerState::Ready)
            .unwrap_or(false)
    }

    /// Non-blocking resolved host port lookup
    pub fn port_binding(&self, id: &str, port: ContainerPort) -> Option<u16> {
        self.handles
            .read()
            .unwrap()
            .get(id)
            .and_then(|entry| entry.snapshot().port_binding(port))
    }

    /// Snapshot of a managed handle
    pub fn handle(&self, id: &str) -> Option<ContainerHandle> {
        self.handles
            .read()
            .unwrap()
            .get(id)
            .map(|entry| entry.snapshot())
    }

    /// Drop handle records for an ended session. The daemon-side resources
    /// are the sweep's responsibility; this only clears local state.
    pub fn purge_session(&self, session_id: &str) {
        self.handles
            .write()
            .unwrap()
            .retain(|_, entry| entry.session() != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::api::MockDaemonApi;

    fn manager_with(mock: MockDaemonApi) -> LifecycleManager {
        LifecycleManager::new(Arc::new(mock), WaitConfig::default())
    }

    #[tokio::test]
    async fn test_exec_on_unknown_handle_is_state_conflict() {
        let manager = manager_with(MockDaemonApi::new());

        let err = manager
            .exec_in("missing", &["true".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_terminate_unknown_handle_is_noop_success() {
        let manager = manager_with(MockDaemonApi::new());
        assert!(manager.terminate("missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_queries_on_unknown_handle() {
        let manager = manager_with(MockDaemonApi::new());
        assert!(!manager.ready("missing"));
        assert_eq!(
            manager.port_binding("missing", ContainerPort::tcp(80)),
            None
        );
        assert!(manager.handle("missing").is_none());
    }
}
