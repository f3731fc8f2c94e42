//! Test support: an in-memory daemon
//!
//! `FakeDaemon` implements [`DaemonApi`] entirely in memory with scriptable
//! per-image behavior (start failures, immediate exits, log output) so
//! lifecycle, wait, and reaper flows can be exercised without a container
//! daemon. Mutating calls record begin/end markers, letting tests assert
//! that per-handle operations never interleave.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use tc_common::EngineError;

use crate::daemon::{
    ContainerDetails, ContainerSummary, DaemonApi, ExecOutput, LivenessStream, LogChunk,
    LogSource, LogStream, NetworkSummary,
};
use crate::spec::{ContainerPort, ContainerSpec};

/// Scripted behavior for containers of one image
#[derive(Debug, Clone, Default)]
pub struct ImageScript {
    /// `start_container` fails with this daemon message
    pub fail_start: Option<String>,
    /// The container exits with this code immediately after starting
    pub exits_with: Option<i64>,
    /// Output emitted on the log stream
    pub logs: Vec<(LogSource, String)>,
    /// Result returned by `exec`
    pub exec_output: Option<ExecOutput>,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    image: String,
    labels: BTreeMap<String, String>,
    started: bool,
    stopped: bool,
    ports: HashMap<ContainerPort, u16>,
}

#[derive(Debug, Clone)]
struct FakeNetwork {
    name: String,
    labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    next_host_port: u16,
    containers: HashMap<String, FakeContainer>,
    networks: HashMap<String, FakeNetwork>,
    scripts: HashMap<String, ImageScript>,
    calls: Vec<String>,
    liveness: Vec<mpsc::UnboundedSender<()>>,
}

/// In-memory `DaemonApi` implementation
pub struct FakeDaemon {
    state: Mutex<FakeState>,
    op_delay: Duration,
}

impl Default for FakeDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_host_port: 32768,
                ..Default::default()
            }),
            op_delay: Duration::ZERO,
        }
    }

    /// Add a pause inside mutating calls so interleaving would be observable
    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = delay;
        self
    }

    /// Script the behavior of containers created from `image`
    pub fn script_image(&self, image: &str, script: ImageScript) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(image.to_string(), script);
    }

    /// Recorded call markers, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn network_count(&self) -> usize {
        self.state.lock().unwrap().networks.len()
    }

    /// Close every handed-out liveness stream, simulating a dropped daemon
    /// connection.
    pub fn kill_connection(&self) {
        self.state.lock().unwrap().liveness.clear();
    }

    fn record(&self, marker: impl Into<String>) {
        self.state.lock().unwrap().calls.push(marker.into());
    }

    async fn pause(&self) {
        if !self.op_delay.is_zero() {
            tokio::time::sleep(self.op_delay).await;
        }
    }

    fn script_for(&self, image: &str) -> ImageScript {
        self.state
            .lock()
            .unwrap()
            .scripts
            .get(image)
            .cloned()
            .unwrap_or_default()
    }

    fn container(&self, id: &str) -> Result<FakeContainer, EngineError> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::spec_rejected(404, format!("no such container: {id}")))
    }

    fn matches_filter(labels: &BTreeMap<String, String>, filter: &str) -> bool {
        match filter.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(filter),
        }
    }

    fn is_exited(container: &FakeContainer, script: &ImageScript) -> bool {
        container.stopped || (container.started && script.exits_with.is_some())
    }
}

#[async_trait]
impl DaemonApi for FakeDaemon {
    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn version(&self) -> Result<String, EngineError> {
        Ok("fake-1.0".to_string())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        self.record(format!("ensure_image {image}"));
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);

        let mut ports = HashMap::new();
        for port in &spec.exposed_ports {
            ports.insert(*port, state.next_host_port);
            state.next_host_port += 1;
        }
        for (host_port, container_port) in &spec.fixed_ports {
            ports.insert(*container_port, *host_port);
        }

        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: name.to_string(),
                image: spec.image_ref(),
                labels: spec.labels.clone(),
                started: false,
                stopped: false,
                ports,
            },
        );
        state.calls.push(format!("create {id}"));
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let container = self.container(id)?;
        let script = self.script_for(&container.image);

        self.record(format!("start {id}"));

        if let Some(message) = script.fail_start {
            return Err(EngineError::spec_rejected(409, message));
        }

        self.state
            .lock()
            .unwrap()
            .containers
            .get_mut(id)
            .expect("container vanished")
            .started = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout_secs: Option<i64>) -> Result<(), EngineError> {
        self.record(format!("begin stop {id}"));
        self.pause().await;

        if let Some(container) = self.state.lock().unwrap().containers.get_mut(id) {
            container.stopped = true;
        }

        self.record(format!("end stop {id}"));
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), EngineError> {
        self.record(format!("begin remove {id}"));
        self.pause().await;

        self.state.lock().unwrap().containers.remove(id);

        self.record(format!("end remove {id}"));
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError> {
        let container = self.container(id)?;
        let script = self.script_for(&container.image);
        let exited = Self::is_exited(&container, &script);

        Ok(ContainerDetails {
            id: id.to_string(),
            running: container.started && !exited,
            exited,
            exit_code: if exited {
                script.exits_with.or(Some(0))
            } else {
                None
            },
            started_at: None,
            finished_at: None,
            port_bindings: container.ports.clone(),
        })
    }

    async fn exec(&self, id: &str, argv: &[String]) -> Result<ExecOutput, EngineError> {
        let container = self.container(id)?;
        let script = self.script_for(&container.image);

        self.record(format!("begin exec {id} {}", argv.join(" ")));
        self.pause().await;
        self.record(format!("end exec {id}"));

        Ok(script.exec_output.unwrap_or(ExecOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        }))
    }

    fn log_stream(&self, id: &str, follow: bool) -> LogStream {
        let (chunks, stay_open) = match self.container(id) {
            Ok(container) => {
                let script = self.script_for(&container.image);
                let exited = Self::is_exited(&container, &script);
                let chunks: Vec<Result<LogChunk, EngineError>> = script
                    .logs
                    .iter()
                    .map(|(source, line)| {
                        Ok(LogChunk {
                            source: *source,
                            message: line.clone().into_bytes(),
                        })
                    })
                    .collect();
                (chunks, follow && !exited)
            }
            Err(_) => (Vec::new(), false),
        };

        let scripted = stream::iter(chunks);
        if stay_open {
            Box::pin(scripted.chain(stream::pending()))
        } else {
            Box::pin(scripted)
        }
    }

    fn liveness_stream(&self) -> LivenessStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().liveness.push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("fakenet-{}", state.next_id);
        state.networks.insert(
            id.clone(),
            FakeNetwork {
                name: name.to_string(),
                labels: labels.clone(),
            },
        );
        state.calls.push(format!("create_network {id}"));
        Ok(id)
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
    ) -> Result<(), EngineError> {
        self.record(format!("connect_network {network_id} {container_id}"));
        Ok(())
    }

    async fn disconnect_network(
        &self,
        network_id: &str,
        container_id: &str,
    ) -> Result<(), EngineError> {
        self.record(format!("disconnect_network {network_id} {container_id}"));
        Ok(())
    }

    async fn remove_network(&self, network_id: &str) -> Result<(), EngineError> {
        self.record(format!("remove_network {network_id}"));
        self.state.lock().unwrap().networks.remove(network_id);
        Ok(())
    }

    async fn list_containers(
        &self,
        label_filter: &str,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| Self::matches_filter(&c.labels, label_filter))
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                name: c.name.clone(),
                state: if c.started && !c.stopped {
                    "running".to_string()
                } else {
                    "exited".to_string()
                },
            })
            .collect())
    }

    async fn list_networks(&self, label_filter: &str) -> Result<Vec<NetworkSummary>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .iter()
            .filter(|(_, n)| Self::matches_filter(&n.labels, label_filter))
            .map(|(id, n)| NetworkSummary {
                id: id.clone(),
                name: n.name.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_label_filtering() {
        let daemon = FakeDaemon::new();
        let spec = ContainerSpec::new("redis", "latest").with_label("owner", "a");
        let id = daemon.create_container("tc-1", &spec).await.unwrap();

        let hits = daemon.list_containers("owner=a").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);

        assert!(daemon.list_containers("owner=b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exited_script_reflected_in_inspect() {
        let daemon = FakeDaemon::new();
        daemon.script_image(
            "busybox:latest",
            ImageScript {
                exits_with: Some(3),
                ..Default::default()
            },
        );

        let spec = ContainerSpec::new("busybox", "latest");
        let id = daemon.create_container("tc-1", &spec).await.unwrap();
        daemon.start_container(&id).await.unwrap();

        let details = daemon.inspect_container(&id).await.unwrap();
        assert!(details.exited);
        assert_eq!(details.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_liveness_ends_on_kill() {
        let daemon = FakeDaemon::new();
        let mut liveness = daemon.liveness_stream();
        daemon.kill_connection();
        assert!(liveness.next().await.is_none());
    }
}
