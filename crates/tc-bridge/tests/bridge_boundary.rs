//! Blocking boundary flows against the in-memory daemon
//!
//! These run without a tokio runtime of their own: the bridge owns one,
//! which is exactly what a calling-language facade sees.

use std::sync::Arc;
use std::time::Duration;

use tc_bridge::{Bridge, ContainerPort, ContainerSpec};
use tc_common::EngineError;
use testcontainers::test_utils::{FakeDaemon, ImageScript};
use testcontainers::{EngineConfig, ExecOutput};

fn fast_bridge(daemon: Arc<FakeDaemon>) -> Bridge {
    let mut config = EngineConfig::default();
    config.wait.poll_interval = Duration::from_millis(10);
    config.wait.backoff_ceiling = Duration::from_millis(50);
    Bridge::with_daemon(config, daemon).unwrap()
}

#[test]
fn blocking_round_trip() -> anyhow::Result<()> {
    let daemon = Arc::new(FakeDaemon::new());
    daemon.script_image(
        "redis:7-alpine",
        ImageScript {
            exec_output: Some(ExecOutput {
                exit_code: Some(0),
                stdout: "PONG\n".to_string(),
                stderr: String::new(),
                duration_ms: 1,
            }),
            ..Default::default()
        },
    );
    let bridge = fast_bridge(daemon.clone());

    let session = bridge.begin_session();
    let spec = ContainerSpec::new("redis", "7-alpine").with_exposed_port(ContainerPort::tcp(6379));
    let container = bridge.provision(session, spec)?;

    assert!(bridge.ready(container));
    assert!(bridge
        .port_binding(container, ContainerPort::tcp(6379))
        .is_some());

    let output = bridge.exec_in(container, &["redis-cli".to_string(), "ping".to_string()])?;
    assert_eq!(output.stdout, "PONG\n");

    bridge.terminate(container)?;
    assert!(!bridge.ready(container));

    bridge.end_session(session)?;
    assert_eq!(daemon.container_count(), 0);
    Ok(())
}

#[test]
fn end_session_invalidates_container_tokens() {
    let daemon = Arc::new(FakeDaemon::new());
    let bridge = fast_bridge(daemon.clone());

    let session = bridge.begin_session();
    let container = bridge
        .provision(session, ContainerSpec::new("redis", "latest"))
        .unwrap();
    assert!(bridge.ready(container));

    bridge.end_session(session).unwrap();
    assert_eq!(daemon.container_count(), 0);

    // stale token: queries degrade cleanly, mutations fail or no-op
    assert!(!bridge.ready(container));
    assert_eq!(bridge.port_binding(container, ContainerPort::tcp(6379)), None);
    assert!(bridge.terminate(container).is_ok());

    let err = bridge.exec_in(container, &["true".to_string()]).unwrap_err();
    assert!(matches!(err, EngineError::StateConflict { .. }));
}

#[test]
fn end_session_is_idempotent() {
    let daemon = Arc::new(FakeDaemon::new());
    let bridge = fast_bridge(daemon);

    let session = bridge.begin_session();
    bridge
        .provision(session, ContainerSpec::new("redis", "latest"))
        .unwrap();

    bridge.end_session(session).unwrap();
    bridge.end_session(session).unwrap();
}

#[test]
fn provision_on_ended_session_is_state_conflict() {
    let daemon = Arc::new(FakeDaemon::new());
    let bridge = fast_bridge(daemon.clone());

    let session = bridge.begin_session();
    bridge.end_session(session).unwrap();

    let err = bridge
        .provision(session, ContainerSpec::new("redis", "latest"))
        .unwrap_err();
    assert!(matches!(err, EngineError::StateConflict { .. }));
    assert_eq!(daemon.container_count(), 0);
}

#[test]
fn sessions_do_not_share_tokens() {
    let daemon = Arc::new(FakeDaemon::new());
    let bridge = fast_bridge(daemon.clone());

    let session_a = bridge.begin_session();
    let session_b = bridge.begin_session();
    assert_ne!(session_a, session_b);

    let container_a = bridge
        .provision(session_a, ContainerSpec::new("redis", "latest"))
        .unwrap();
    let container_b = bridge
        .provision(session_b, ContainerSpec::new("redis", "latest"))
        .unwrap();
    assert_ne!(container_a, container_b);

    bridge.end_session(session_a).unwrap();

    // the other session's container survives and stays addressable
    assert!(!bridge.ready(container_a));
    assert!(bridge.ready(container_b));
    assert_eq!(daemon.container_count(), 1);

    bridge.end_session(session_b).unwrap();
    assert_eq!(daemon.container_count(), 0);
}

#[test]
fn provision_failure_surfaces_classified_error() {
    let daemon = Arc::new(FakeDaemon::new());
    daemon.script_image(
        "broken:latest",
        ImageScript {
            fail_start: Some("oci runtime error".to_string()),
            ..Default::default()
        },
    );
    let bridge = fast_bridge(daemon.clone());

    let session = bridge.begin_session();
    let err = bridge
        .provision(session, ContainerSpec::new("broken", "latest"))
        .unwrap_err();
    assert!(matches!(err, EngineError::SpecRejected { status: 409, .. }));

    // nothing leaked behind the boundary
    assert_eq!(daemon.container_count(), 0);
}
