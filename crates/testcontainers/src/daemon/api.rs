//! Typed daemon contract
//!
//! The engine talks to the container daemon exclusively through this trait.
//! The production implementation wraps bollard; tests substitute an
//! in-memory fake so lifecycle, wait, and reaper behavior can be exercised
//! without a running daemon.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use tc_common::EngineError;

use crate::spec::{ContainerPort, ContainerSpec};

/// Which stream a log chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    Stdout,
    Stderr,
}

/// One chunk of container output. Chunk boundaries are arbitrary; matching
/// must not assume line framing.
#[derive(Debug, Clone)]
pub struct LogChunk {
    pub source: LogSource,
    pub message: Vec<u8>,
}

/// Inspect snapshot of a single container
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    pub id: String,
    pub running: bool,
    pub exited: bool,
    pub exit_code: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Resolved container-port to host-port mappings
    pub port_bindings: HashMap<ContainerPort, u16>,
}

/// Result of a command executed inside a running container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Label-filtered container listing entry
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
}

/// Label-filtered network listing entry
#[derive(Debug, Clone)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

pub type LogStream = BoxStream<'static, Result<LogChunk, EngineError>>;

/// Stream of daemon liveness events. The stream ending means the daemon
/// connection was lost.
pub type LivenessStream = BoxStream<'static, ()>;

/// The daemon operations the engine depends on
///
/// Every call is bounded by the client's per-request deadline and may be
/// cancelled by dropping the returned future; implementations must not
/// leak connections on cancellation. Transport failures are retried with
/// bounded backoff inside the implementation before `DaemonUnreachable`
/// surfaces. Removal-type calls treat "not found" as success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DaemonApi: Send + Sync {
    async fn ping(&self) -> Result<(), EngineError>;

    async fn version(&self) -> Result<String, EngineError>;

    /// Pull the image unless it is already present locally
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError>;

    /// Create a container from a validated spec; returns the daemon id
    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str, timeout_secs: Option<i64>)
        -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError>;

    async fn exec(&self, id: &str, argv: &[String]) -> Result<ExecOutput, EngineError>;

    /// Subscribe to the container's output. With `follow`, the stream stays
    /// open and yields chunks as they are produced; it ends when the
    /// container exits.
    fn log_stream(&self, id: &str, follow: bool) -> LogStream;

    /// Daemon event stream used as a connection-liveness signal
    fn liveness_stream(&self) -> LivenessStream;

    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, EngineError>;

    async fn connect_network(&self, network_id: &str, container_id: &str)
        -> Result<(), EngineError>;

    async fn disconnect_network(
        &self,
        network_id: &str,
        container_id: &str,
    ) -> Result<(), EngineError>;

    async fn remove_network(&self, network_id: &str) -> Result<(), EngineError>;

    /// List containers carrying the given `key=value` label
    async fn list_containers(&self, label_filter: &str)
        -> Result<Vec<ContainerSummary>, EngineError>;

    /// List networks carrying the given `key=value` label
    async fn list_networks(&self, label_filter: &str) -> Result<Vec<NetworkSummary>, EngineError>;
}
