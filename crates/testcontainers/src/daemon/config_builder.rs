//! Translation from a `ContainerSpec` to the daemon's create-request body

use bollard::container::Config;
use bollard::models::{HostConfig, Mount as DaemonMount, MountTypeEnum, MountTmpfsOptions, PortBinding};
use std::collections::HashMap;

use crate::spec::{ContainerSpec, Mount};

/// Build the daemon create request for a validated spec.
///
/// Exposed ports without a fixed mapping are published to ephemeral host
/// ports; fixed mappings get explicit bindings on all interfaces.
pub(crate) fn build_create_config(spec: &ContainerSpec) -> Config<String> {
    let env: Vec<String> = spec
        .env
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    for port in &spec.exposed_ports {
        exposed_ports.insert(port.to_string(), HashMap::new());
    }
    for (_, port) in &spec.fixed_ports {
        exposed_ports.insert(port.to_string(), HashMap::new());
    }

    let host_config = build_host_config(spec);

    Config {
        image: Some(spec.image_ref()),
        cmd: spec.cmd.clone(),
        entrypoint: spec.entrypoint.clone(),
        env: if env.is_empty() { None } else { Some(env) },
        exposed_ports: if exposed_ports.is_empty() {
            None
        } else {
            Some(exposed_ports)
        },
        labels: Some(spec.labels.clone().into_iter().collect()),
        hostname: spec.hostname.clone(),
        user: spec.user.clone(),
        working_dir: spec.working_dir.clone(),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn build_host_config(spec: &ContainerSpec) -> HostConfig {
    HostConfig {
        publish_all_ports: Some(!spec.exposed_ports.is_empty()),
        port_bindings: build_port_bindings(spec),
        mounts: build_mounts(spec),
        privileged: Some(spec.privileged),
        cap_add: option_vec(&spec.cap_add),
        cap_drop: option_vec(&spec.cap_drop),
        shm_size: spec.shm_size,
        // Additional networks are connected after create, before start
        network_mode: spec.networks.first().cloned(),
        ..Default::default()
    }
}

fn build_port_bindings(spec: &ContainerSpec) -> Option<HashMap<String, Option<Vec<PortBinding>>>> {
    if spec.fixed_ports.is_empty() {
        return None;
    }

    let mut bindings = HashMap::new();
    for (host_port, container_port) in &spec.fixed_ports {
        bindings.insert(
            container_port.to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );
    }
    Some(bindings)
}

fn build_mounts(spec: &ContainerSpec) -> Option<Vec<DaemonMount>> {
    if spec.mounts.is_empty() {
        return None;
    }

    let mounts = spec
        .mounts
        .iter()
        .map(|mount| match mount {
            Mount::Bind {
                host_path,
                container_path,
                read_only,
            } => DaemonMount {
                target: Some(container_path.clone()),
                source: Some(host_path.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(*read_only),
                ..Default::default()
            },
            Mount::Volume {
                name,
                container_path,
                read_only,
            } => DaemonMount {
                target: Some(container_path.clone()),
                source: Some(name.clone()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(*read_only),
                ..Default::default()
            },
            Mount::Tmpfs {
                container_path,
                size_bytes,
            } => DaemonMount {
                target: Some(container_path.clone()),
                source: None,
                typ: Some(MountTypeEnum::TMPFS),
                read_only: Some(false),
                tmpfs_options: size_bytes.map(|size| MountTmpfsOptions {
                    size_bytes: Some(size),
                    mode: None,
                }),
                ..Default::default()
            },
        })
        .collect();

    Some(mounts)
}

fn option_vec(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ContainerPort;

    #[test]
    fn test_env_rendered_as_key_value() {
        let spec = ContainerSpec::new("redis", "latest").with_env_var("A", "1");
        let config = build_create_config(&spec);
        assert_eq!(config.env, Some(vec!["A=1".to_string()]));
    }

    #[test]
    fn test_exposed_ports_publish_all() {
        let spec =
            ContainerSpec::new("redis", "latest").with_exposed_port(ContainerPort::tcp(6379));
        let config = build_create_config(&spec);

        let exposed = config.exposed_ports.unwrap();
        assert!(exposed.contains_key("6379/tcp"));

        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.publish_all_ports, Some(true));
        assert!(host_config.port_bindings.is_none());
    }

    #[test]
    fn test_fixed_port_binding() {
        let spec =
            ContainerSpec::new("nginx", "latest").with_mapped_port(8080, ContainerPort::tcp(80));
        let config = build_create_config(&spec);

        let host_config = config.host_config.unwrap();
        let bindings = host_config.port_bindings.unwrap();
        let binding = bindings["80/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("8080"));
    }

    #[test]
    fn test_first_network_is_network_mode() {
        let spec = ContainerSpec::new("redis", "latest")
            .with_network("tc-net-a")
            .with_network("tc-net-b");
        let config = build_create_config(&spec);
        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.network_mode.as_deref(), Some("tc-net-a"));
    }

    #[test]
    fn test_labels_forwarded() {
        let spec = ContainerSpec::new("redis", "latest").with_label("owner", "it");
        let config = build_create_config(&spec);
        assert_eq!(
            config.labels.unwrap().get("owner").map(String::as_str),
            Some("it")
        );
    }
}
