//! Session scoping and reaper sweeps against the in-memory daemon

use std::sync::Arc;
use std::time::Duration;

use testcontainers::test_utils::FakeDaemon;
use testcontainers::{ContainerSpec, DaemonApi, Engine, EngineConfig};

fn fast_engine(daemon: Arc<FakeDaemon>) -> Engine {
    let mut config = EngineConfig::default();
    config.wait.poll_interval = Duration::from_millis(10);
    config.wait.backoff_ceiling = Duration::from_millis(50);
    Engine::with_daemon(config, daemon)
}

/// Poll until the fake daemon holds no containers, or fail after 2s
async fn wait_for_empty(daemon: &FakeDaemon) {
    for _ in 0..200 {
        if daemon.container_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "sweep did not run; {} containers remain",
        daemon.container_count()
    );
}

#[tokio::test]
async fn end_session_removes_every_labeled_resource() {
    let daemon = Arc::new(FakeDaemon::new());
    let engine = fast_engine(daemon.clone());
    let session = engine.begin_session();

    engine
        .provision(&session, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();
    engine
        .provision(&session, ContainerSpec::new("postgres", "16"))
        .await
        .unwrap();
    engine.create_network(&session, None).await.unwrap();

    assert_eq!(daemon.container_count(), 2);
    assert_eq!(daemon.network_count(), 1);

    engine.end_session(&session).await.unwrap();

    // daemon-side listing for the session label comes back empty
    assert_eq!(daemon.container_count(), 0);
    assert_eq!(daemon.network_count(), 0);
}

#[tokio::test]
async fn end_session_only_touches_its_own_label() {
    let daemon = Arc::new(FakeDaemon::new());
    let engine = fast_engine(daemon.clone());

    let session_a = engine.begin_session();
    let session_b = engine.begin_session();

    let id_a = engine
        .provision(&session_a, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();
    let id_b = engine
        .provision(&session_b, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();
    assert_ne!(id_a, id_b);

    engine.end_session(&session_a).await.unwrap();

    assert_eq!(daemon.container_count(), 1);
    assert!(engine.ready(&id_b));

    engine.end_session(&session_b).await.unwrap();
    assert_eq!(daemon.container_count(), 0);
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let daemon = Arc::new(FakeDaemon::new());
    let engine = fast_engine(daemon.clone());
    let session = engine.begin_session();

    engine
        .provision(&session, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();

    engine.end_session(&session).await.unwrap();
    // resources are already gone; a second end succeeds silently
    engine.end_session(&session).await.unwrap();
    assert_eq!(daemon.container_count(), 0);
}

#[tokio::test]
async fn connection_loss_triggers_sweep() {
    let daemon = Arc::new(FakeDaemon::new());
    let engine = fast_engine(daemon.clone());
    let session = engine.begin_session();

    engine
        .provision(&session, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();
    assert_eq!(daemon.container_count(), 1);

    daemon.kill_connection();

    wait_for_empty(&daemon).await;
}

#[tokio::test]
async fn dropped_session_triggers_sweep() {
    let daemon = Arc::new(FakeDaemon::new());
    let engine = fast_engine(daemon.clone());
    let session = engine.begin_session();

    engine
        .provision(&session, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();

    // abandon the session without ending it
    drop(session);

    wait_for_empty(&daemon).await;
}

#[tokio::test]
async fn disabled_reaper_still_sweeps_on_explicit_end() {
    let daemon = Arc::new(FakeDaemon::new());
    let mut config = EngineConfig::default();
    config.reaper.enabled = false;
    let engine = Engine::with_daemon(config, daemon.clone());
    let session = engine.begin_session();

    engine
        .provision(&session, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();

    engine.end_session(&session).await.unwrap();
    assert_eq!(daemon.container_count(), 0);
}

#[tokio::test]
async fn network_removed_only_when_attachments_empty() {
    let daemon = Arc::new(FakeDaemon::new());
    let engine = fast_engine(daemon.clone());
    let session = engine.begin_session();

    let network = engine.create_network(&session, None).await.unwrap();
    let networks = engine.networks();

    networks.attach(&network.id, "c1").await.unwrap();
    networks.attach(&network.id, "c2").await.unwrap();
    assert_eq!(networks.attachment_count(&network.id).await, Some(2));

    let removed = networks
        .detach_and_maybe_remove(&network.id, "c1")
        .await
        .unwrap();
    assert!(!removed);
    assert_eq!(daemon.network_count(), 1);

    let removed = networks
        .detach_and_maybe_remove(&network.id, "c2")
        .await
        .unwrap();
    assert!(removed);
    assert_eq!(daemon.network_count(), 0);

    // a third detach tolerates the network being gone
    let removed = networks
        .detach_and_maybe_remove(&network.id, "c3")
        .await
        .unwrap();
    assert!(!removed);
}

#[tokio::test]
async fn provisioned_containers_carry_session_labels() {
    let daemon = Arc::new(FakeDaemon::new());
    let engine = fast_engine(daemon.clone());
    let session = engine.begin_session();

    engine
        .provision(&session, ContainerSpec::new("redis", "latest"))
        .await
        .unwrap();

    let labeled = daemon
        .list_containers(&session.label_filter())
        .await
        .unwrap();
    assert_eq!(labeled.len(), 1);

    let managed = daemon
        .list_containers("org.testcontainers.managed=true")
        .await
        .unwrap();
    assert_eq!(managed.len(), 1);
}
