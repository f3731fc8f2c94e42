//! Bollard-backed daemon client
//!
//! Wraps the Docker Engine API with the engine's error classification and
//! retry policy:
//! - transport failures and daemon 5xx responses become `DaemonUnreachable`
//!   and are retried with bounded exponential backoff before surfacing
//! - 4xx responses become `SpecRejected` with the daemon's message
//! - removal-type calls treat 404 as success
//! Every request is bounded by the configured per-call deadline; dropping a
//! returned future cancels the request without poisoning the pool.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::EndpointSettings;
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, ListNetworksOptions,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::stream::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tracing::{debug, info, warn};

use tc_common::EngineError;

use super::api::{
    ContainerDetails, ContainerSummary, DaemonApi, ExecOutput, LivenessStream, LogChunk,
    LogSource, LogStream, NetworkSummary,
};
use super::config_builder::build_create_config;
use crate::config::DaemonConfig;
use crate::spec::{ContainerPort, ContainerSpec, Protocol};

/// Production `DaemonApi` implementation over bollard
#[derive(Debug, Clone)]
pub struct DockerDaemon {
    docker: Docker,
    config: DaemonConfig,
}

impl DockerDaemon {
    /// Connect to the daemon and verify it responds.
    pub async fn connect(config: DaemonConfig) -> Result<Self, EngineError> {
        info!("Connecting to container daemon at {}", config.socket_path);

        let docker = if config.socket_path.starts_with("unix://") {
            Docker::connect_with_unix(
                &config.socket_path,
                config.connect_timeout_secs,
                bollard::API_DEFAULT_VERSION,
            )
        } else if config.socket_path.starts_with("tcp://")
            || config.socket_path.starts_with("http://")
        {
            Docker::connect_with_http(
                &config.socket_path,
                config.connect_timeout_secs,
                bollard::API_DEFAULT_VERSION,
            )
        } else {
            Docker::connect_with_socket_defaults()
        }
        .map_err(|e| EngineError::daemon_unreachable(&config.socket_path, 1, e))?;

        let client = Self { docker, config };

        let version = client.version().await?;
        info!("Connected to container daemon version {version}");

        Ok(client)
    }

    fn endpoint(&self) -> &str {
        &self.config.socket_path
    }

    /// Classify a daemon error. 4xx means the daemon understood and refused;
    /// everything else is a transport-class failure worth retrying.
    fn classify(&self, error: BollardError, attempts: u32) -> EngineError {
        match error {
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } if status_code < 500 => EngineError::SpecRejected {
                status: status_code,
                message,
            },
            other => EngineError::daemon_unreachable(self.endpoint(), attempts, other),
        }
    }

    /// Run a daemon call under the per-request deadline, retrying
    /// transport-class failures with bounded exponential backoff.
    async fn with_retry<T, Fut>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> Fut,
    ) -> Result<T, EngineError>
    where
        Fut: Future<Output = Result<T, BollardError>>,
    {
        let retry = &self.config.retry;
        let mut backoff = retry.initial_backoff;
        let mut attempt: u32 = 1;

        loop {
            let outcome = tokio::time::timeout(self.config.api_timeout, call()).await;

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => self.classify(e, attempt),
                Err(elapsed) => {
                    EngineError::daemon_unreachable(self.endpoint(), attempt, elapsed)
                }
            };

            if error.is_retryable() && attempt < retry.max_attempts {
                debug!(
                    operation = %operation,
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Transient daemon failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, retry.max_backoff);
                attempt += 1;
                continue;
            }

            return Err(error);
        }
    }
}

/// Treat 404 as success for removal-type operations
fn tolerate_not_found(result: Result<(), EngineError>) -> Result<(), EngineError> {
    match result {
        Err(EngineError::SpecRejected { status: 404, .. }) => Ok(()),
        other => other,
    }
}

fn parse_timestamp(value: Option<&String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        // the daemon reports the zero value for "never"
        .filter(|ts| ts.timestamp() > 0)
}

/// Parse the daemon's `<port>/<proto>` port-map key
fn parse_port_key(key: &str) -> Option<ContainerPort> {
    let (port, proto) = key.split_once('/')?;
    let port = port.parse::<u16>().ok()?;
    let protocol = match proto {
        "tcp" => Protocol::Tcp,
        "udp" => Protocol::Udp,
        "sctp" => Protocol::Sctp,
        _ => return None,
    };
    Some(ContainerPort { port, protocol })
}

#[async_trait]
impl DaemonApi for DockerDaemon {
    async fn ping(&self) -> Result<(), EngineError> {
        self.with_retry("ping", || self.docker.ping())
            .await
            .map(|_| ())
    }

    async fn version(&self) -> Result<String, EngineError> {
        let version = self.with_retry("version", || self.docker.version()).await?;
        Ok(version.version.unwrap_or_default())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!("Image {image} already available locally");
            return Ok(());
        }

        info!("Image {image} not found locally, pulling");

        let options = CreateImageOptions::<String> {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull_stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {status}");
                    }
                }
                Err(e) => return Err(self.classify(e, 1)),
            }
        }

        info!("Pulled image {image}");
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<String, EngineError> {
        let config: Config<String> = build_create_config(spec);
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        let response = self
            .with_retry("create_container", || {
                self.docker
                    .create_container(Some(options.clone()), config.clone())
            })
            .await?;

        for warning in &response.warnings {
            warn!(container = %name, "Daemon create warning: {warning}");
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.with_retry("start_container", || {
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>)
        })
        .await
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: Option<i64>,
    ) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: timeout_secs.unwrap_or(10),
        };

        tolerate_not_found(
            self.with_retry("stop_container", || {
                self.docker.stop_container(id, Some(options))
            })
            .await,
        )
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            link: false,
        };

        tolerate_not_found(
            self.with_retry("remove_container", || {
                self.docker.remove_container(id, Some(options))
            })
            .await,
        )
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError> {
        let response = self
            .with_retry("inspect_container", || {
                self.docker
                    .inspect_container(id, None::<InspectContainerOptions>)
            })
            .await?;

        let state = response.state.unwrap_or_default();
        let status = state
            .status
            .map(|s| s.to_string().to_lowercase())
            .unwrap_or_default();
        let exited = matches!(status.as_str(), "exited" | "dead");

        let mut port_bindings = HashMap::new();
        if let Some(ports) = response.network_settings.and_then(|s| s.ports) {
            for (key, bindings) in ports {
                let Some(container_port) = parse_port_key(&key) else {
                    continue;
                };
                let host_port = bindings
                    .iter()
                    .flatten()
                    .find_map(|b| b.host_port.as_deref()?.parse::<u16>().ok());
                if let Some(host_port) = host_port {
                    port_bindings.insert(container_port, host_port);
                }
            }
        }

        Ok(ContainerDetails {
            id: response.id.unwrap_or_else(|| id.to_string()),
            running: state.running.unwrap_or(false),
            exited,
            exit_code: if exited { state.exit_code } else { None },
            started_at: parse_timestamp(state.started_at.as_ref()),
            finished_at: parse_timestamp(state.finished_at.as_ref()),
            port_bindings,
        })
    }

    async fn exec(&self, id: &str, argv: &[String]) -> Result<ExecOutput, EngineError> {
        let started = std::time::Instant::now();

        let exec_options = CreateExecOptions::<String> {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .with_retry("create_exec", || {
                self.docker.create_exec(id, exec_options.clone())
            })
            .await?;

        let start_options = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let results = self
            .docker
            .start_exec(&exec.id, Some(start_options))
            .await
            .map_err(|e| self.classify(e, 1))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = results {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(self.classify(e, 1)),
                }
            }
        }

        let inspect = self
            .with_retry("inspect_exec", || self.docker.inspect_exec(&exec.id))
            .await?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code,
            stdout,
            stderr,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn log_stream(&self, id: &str, follow: bool) -> LogStream {
        let options = LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let endpoint = self.endpoint().to_string();
        let stream = self.docker.logs(id, Some(options)).map(move |chunk| {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    Ok(LogChunk {
                        source: LogSource::Stdout,
                        message: message.to_vec(),
                    })
                }
                Ok(LogOutput::StdErr { message }) => Ok(LogChunk {
                    source: LogSource::Stderr,
                    message: message.to_vec(),
                }),
                Ok(LogOutput::StdIn { .. }) => Ok(LogChunk {
                    source: LogSource::Stdout,
                    message: Vec::new(),
                }),
                Err(e) => Err(EngineError::daemon_unreachable(&endpoint, 1, e)),
            }
        });

        Box::pin(stream)
    }

    fn liveness_stream(&self) -> LivenessStream {
        let stream = self
            .docker
            .events(None::<EventsOptions<String>>)
            // any event proves the connection is alive; an error means it is not
            .take_while(|event| futures_util::future::ready(event.is_ok()))
            .map(|_| ());

        Box::pin(stream)
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, EngineError> {
        let options = CreateNetworkOptions::<String> {
            name: name.to_string(),
            check_duplicate: true,
            labels: labels.clone().into_iter().collect(),
            ..Default::default()
        };

        let response = self
            .with_retry("create_network", || {
                self.docker.create_network(options.clone())
            })
            .await?;

        Ok(response.id.unwrap_or_default())
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
    ) -> Result<(), EngineError> {
        let options = ConnectNetworkOptions::<String> {
            container: container_id.to_string(),
            endpoint_config: EndpointSettings::default(),
        };

        self.with_retry("connect_network", || {
            self.docker.connect_network(network_id, options.clone())
        })
        .await
    }

    async fn disconnect_network(
        &self,
        network_id: &str,
        container_id: &str,
    ) -> Result<(), EngineError> {
        let options = DisconnectNetworkOptions::<String> {
            container: container_id.to_string(),
            force: false,
        };

        tolerate_not_found(
            self.with_retry("disconnect_network", || {
                self.docker.disconnect_network(network_id, options.clone())
            })
            .await,
        )
    }

    async fn remove_network(&self, network_id: &str) -> Result<(), EngineError> {
        tolerate_not_found(
            self.with_retry("remove_network", || self.docker.remove_network(network_id))
                .await,
        )
    }

    async fn list_containers(
        &self,
        label_filter: &str,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label_filter.to_string()]);

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .with_retry("list_containers", || {
                self.docker.list_containers(Some(options.clone()))
            })
            .await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    name: c
                        .names
                        .and_then(|names| names.into_iter().next())
                        .unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn list_networks(&self, label_filter: &str) -> Result<Vec<NetworkSummary>, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label_filter.to_string()]);

        let options = ListNetworksOptions::<String> { filters };

        let networks = self
            .with_retry("list_networks", || {
                self.docker.list_networks(Some(options.clone()))
            })
            .await?;

        Ok(networks
            .into_iter()
            .filter_map(|n| {
                Some(NetworkSummary {
                    id: n.id?,
                    name: n.name.unwrap_or_default(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_key() {
        assert_eq!(parse_port_key("80/tcp"), Some(ContainerPort::tcp(80)));
        assert_eq!(parse_port_key("53/udp"), Some(ContainerPort::udp(53)));
        assert_eq!(parse_port_key("garbage"), None);
        assert_eq!(parse_port_key("80/quic"), None);
    }

    #[test]
    fn test_parse_timestamp_zero_value_is_none() {
        let zero = "0001-01-01T00:00:00Z".to_string();
        assert_eq!(parse_timestamp(Some(&zero)), None);

        let real = "2024-06-01T10:00:00Z".to_string();
        assert!(parse_timestamp(Some(&real)).is_some());
    }

    #[test]
    fn test_tolerate_not_found() {
        assert!(tolerate_not_found(Err(EngineError::spec_rejected(404, "no such container")))
            .is_ok());
        assert!(tolerate_not_found(Err(EngineError::spec_rejected(409, "conflict"))).is_err());
        assert!(tolerate_not_found(Ok(())).is_ok());
    }
}
