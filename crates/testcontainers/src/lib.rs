//! # testcontainers engine
//!
//! Container lifecycle orchestration for ephemeral integration-test
//! containers: provision against a container daemon, wait for readiness,
//! and guarantee cleanup through session-scoped labels and a cleanup
//! sentinel.
//!
//! The [`Engine`] is the aggregate root. A facade begins a session,
//! provisions containers under it, and ends the session; everything the
//! session created is removed even if the facade never gets that far.

pub mod config;
pub mod daemon;
pub mod lifecycle;
pub mod network;
pub mod reaper;
pub mod spec;
pub mod test_utils;
pub mod wait;

pub use config::EngineConfig;
pub use daemon::{DaemonApi, DockerDaemon, ExecOutput};
pub use lifecycle::{ContainerHandle, ContainerState, LifecycleManager};
pub use network::{NetworkHandle, NetworkManager};
pub use reaper::ReaperSession;
pub use spec::{ContainerPort, ContainerSpec, Mount, Protocol};
pub use tc_common::EngineError;
pub use wait::{MatchSource, WaitCondition};

use std::sync::Arc;
use tracing::info;

/// The engine: daemon client, lifecycle manager, network manager, and
/// session factory behind one root.
pub struct Engine {
    config: EngineConfig,
    daemon: Arc<dyn DaemonApi>,
    lifecycle: LifecycleManager,
    networks: NetworkManager,
}

impl Engine {
    /// Connect to the configured daemon and assemble the engine.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let daemon: Arc<dyn DaemonApi> =
            Arc::new(DockerDaemon::connect(config.daemon.clone()).await?);
        Ok(Self::with_daemon(config, daemon))
    }

    /// Assemble the engine over an existing daemon client. This is the
    /// seam tests use to substitute an in-memory daemon.
    pub fn with_daemon(config: EngineConfig, daemon: Arc<dyn DaemonApi>) -> Self {
        let lifecycle = LifecycleManager::new(daemon.clone(), config.wait.clone());
        let networks = NetworkManager::new(daemon.clone());

        Self {
            config,
            daemon,
            lifecycle,
            networks,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Begin a cleanup session. Must be called within a tokio runtime;
    /// the session's sentinel task is spawned onto it.
    pub fn begin_session(&self) -> Arc<ReaperSession> {
        Arc::new(ReaperSession::begin(
            self.daemon.clone(),
            &self.config.reaper,
        ))
    }

    /// End a session: every resource carrying its label is removed and the
    /// local handle records are dropped. Idempotent.
    pub async fn end_session(&self, session: &ReaperSession) -> Result<(), EngineError> {
        session.end().await?;
        self.lifecycle.purge_session(session.id());
        Ok(())
    }

    /// Provision a container under a session: create, start, and wait.
    /// Returns the container id only once it is `Ready`.
    pub async fn provision(
        &self,
        session: &ReaperSession,
        spec: ContainerSpec,
    ) -> Result<String, EngineError> {
        self.lifecycle
            .provision(session.id(), &session.labels(), spec)
            .await
    }

    /// Stop and remove a container. Idempotent.
    pub async fn terminate(&self, id: &str) -> Result<(), EngineError> {
        self.lifecycle.terminate(id).await
    }

    /// Run a command inside a `Running`/`Ready` container
    pub async fn exec_in(&self, id: &str, argv: &[String]) -> Result<ExecOutput, EngineError> {
        self.lifecycle.exec_in(id, argv).await
    }

    /// Non-blocking readiness query
    pub fn ready(&self, id: &str) -> bool {
        self.lifecycle.ready(id)
    }

    /// Non-blocking resolved host port lookup
    pub fn port_binding(&self, id: &str, port: ContainerPort) -> Option<u16> {
        self.lifecycle.port_binding(id, port)
    }

    /// Snapshot of a managed container
    pub fn handle(&self, id: &str) -> Option<ContainerHandle> {
        self.lifecycle.handle(id)
    }

    /// Create an isolated test network labeled with the session
    pub async fn create_network(
        &self,
        session: &ReaperSession,
        name: Option<String>,
    ) -> Result<NetworkHandle, EngineError> {
        self.networks.create_network(&session.labels(), name).await
    }

    pub fn networks(&self) -> &NetworkManager {
        &self.networks
    }

    /// Verify the daemon still responds
    pub async fn health_check(&self) -> Result<(), EngineError> {
        self.daemon.ping().await?;
        let version = self.daemon.version().await?;
        info!("Daemon healthy, version {version}");
        Ok(())
    }
}
