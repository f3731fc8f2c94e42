//! Container specification
//!
//! A `ContainerSpec` describes everything the engine needs to provision one
//! container: image, environment, ports, mounts, network attachments, wait
//! conditions, and labels. Specs are built with consuming `with_*` methods
//! and are immutable once submitted: `provision` takes the spec by value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tc_common::EngineError;

use crate::wait::WaitCondition;

/// Transport protocol of an exposed container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

/// A container-side port plus protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerPort {
    pub port: u16,
    pub protocol: Protocol,
}

impl ContainerPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    pub fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }

    pub fn sctp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Sctp,
        }
    }
}

impl fmt::Display for ContainerPort {
    /// Renders in the daemon's `<port>/<proto>` key format
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol.as_str())
    }
}

/// A filesystem mount attached to the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mount {
    Bind {
        host_path: String,
        container_path: String,
        read_only: bool,
    },
    Volume {
        name: String,
        container_path: String,
        read_only: bool,
    },
    Tmpfs {
        container_path: String,
        size_bytes: Option<i64>,
    },
}

impl Mount {
    pub fn bind(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self::Bind {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    pub fn volume(name: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self::Volume {
            name: name.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    pub fn tmpfs(container_path: impl Into<String>) -> Self {
        Self::Tmpfs {
            container_path: container_path.into(),
            size_bytes: None,
        }
    }

    pub fn read_only(self) -> Self {
        match self {
            Self::Bind {
                host_path,
                container_path,
                ..
            } => Self::Bind {
                host_path,
                container_path,
                read_only: true,
            },
            Self::Volume {
                name,
                container_path,
                ..
            } => Self::Volume {
                name,
                container_path,
                read_only: true,
            },
            tmpfs => tmpfs,
        }
    }
}

/// Immutable description of a container to provision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub(crate) image: String,
    pub(crate) tag: String,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) cmd: Option<Vec<String>>,
    pub(crate) entrypoint: Option<Vec<String>>,
    pub(crate) exposed_ports: Vec<ContainerPort>,
    pub(crate) fixed_ports: Vec<(u16, ContainerPort)>,
    pub(crate) mounts: Vec<Mount>,
    pub(crate) networks: Vec<String>,
    pub(crate) wait_conditions: Vec<WaitCondition>,
    pub(crate) labels: BTreeMap<String, String>,
    pub(crate) container_name: Option<String>,
    pub(crate) hostname: Option<String>,
    pub(crate) working_dir: Option<String>,
    pub(crate) user: Option<String>,
    pub(crate) privileged: bool,
    pub(crate) cap_add: Vec<String>,
    pub(crate) cap_drop: Vec<String>,
    pub(crate) shm_size: Option<i64>,
    pub(crate) startup_timeout: Option<Duration>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
            env: BTreeMap::new(),
            cmd: None,
            entrypoint: None,
            exposed_ports: Vec::new(),
            fixed_ports: Vec::new(),
            mounts: Vec::new(),
            networks: Vec::new(),
            wait_conditions: Vec::new(),
            labels: BTreeMap::new(),
            container_name: None,
            hostname: None,
            working_dir: None,
            user: None,
            privileged: false,
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            shm_size: None,
            startup_timeout: None,
        }
    }

    /// Full image reference, `<name>:<tag>`
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn wait_conditions(&self) -> &[WaitCondition] {
        &self.wait_conditions
    }

    /// Environment keys are unique by construction; a later value for the
    /// same key replaces the earlier one.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cmd(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_entrypoint(
        mut self,
        entrypoint: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.entrypoint = Some(entrypoint.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exposed_port(mut self, port: ContainerPort) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    /// Pin a container port to a fixed host port instead of an ephemeral one
    pub fn with_mapped_port(mut self, host_port: u16, port: ContainerPort) -> Self {
        self.fixed_ports.push((host_port, port));
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.push(network.into());
        self
    }

    pub fn with_wait(mut self, condition: WaitCondition) -> Self {
        self.wait_conditions.push(condition);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_cap_add(mut self, capability: impl Into<String>) -> Self {
        self.cap_add.push(capability.into());
        self
    }

    pub fn with_cap_drop(mut self, capability: impl Into<String>) -> Self {
        self.cap_drop.push(capability.into());
        self
    }

    pub fn with_shm_size(mut self, bytes: i64) -> Self {
        self.shm_size = Some(bytes);
        self
    }

    /// Override the default per-condition readiness timeout for this spec
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Validate before submission. Rejections carry the daemon-rejection
    /// kind: they are definitive and not retryable.
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.image.is_empty() {
            return Err(EngineError::spec_rejected(400, "image must not be empty"));
        }

        if self.tag.is_empty() {
            return Err(EngineError::spec_rejected(400, "image tag must not be empty"));
        }

        for (host_port, port) in &self.fixed_ports {
            if *host_port == 0 {
                return Err(EngineError::spec_rejected(
                    400,
                    format!("fixed host port for {port} must be nonzero"),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref() {
        let spec = ContainerSpec::new("redis", "7-alpine");
        assert_eq!(spec.image_ref(), "redis:7-alpine");
    }

    #[test]
    fn test_env_keys_unique() {
        let spec = ContainerSpec::new("redis", "latest")
            .with_env_var("A", "1")
            .with_env_var("A", "2");
        assert_eq!(spec.env.get("A").map(String::as_str), Some("2"));
        assert_eq!(spec.env.len(), 1);
    }

    #[test]
    fn test_exposed_port_dedup() {
        let spec = ContainerSpec::new("nginx", "latest")
            .with_exposed_port(ContainerPort::tcp(80))
            .with_exposed_port(ContainerPort::tcp(80));
        assert_eq!(spec.exposed_ports.len(), 1);
    }

    #[test]
    fn test_port_display() {
        assert_eq!(ContainerPort::tcp(80).to_string(), "80/tcp");
        assert_eq!(ContainerPort::udp(53).to_string(), "53/udp");
        assert_eq!(ContainerPort::sctp(132).to_string(), "132/sctp");
    }

    #[test]
    fn test_empty_image_rejected() {
        let spec = ContainerSpec::new("", "latest");
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, EngineError::SpecRejected { status: 400, .. }));
    }

    #[test]
    fn test_zero_fixed_host_port_rejected() {
        let spec =
            ContainerSpec::new("nginx", "latest").with_mapped_port(0, ContainerPort::tcp(80));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_mount_read_only() {
        let mount = Mount::bind("/tmp/data", "/data").read_only();
        assert!(matches!(mount, Mount::Bind { read_only: true, .. }));

        // tmpfs has no read-only switch
        let tmpfs = Mount::tmpfs("/scratch").read_only();
        assert!(matches!(tmpfs, Mount::Tmpfs { .. }));
    }
}
