//! Test network management
//!
//! Networks are created with the owning session's labels and tracked with
//! their attachment sets. A network is removed from the daemon only when
//! its attachment set becomes empty, so concurrent container teardown can
//! detach in any order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use tc_common::journal::log_cleanup_failure;
use tc_common::EngineError;

use crate::daemon::DaemonApi;

/// A daemon-assigned test network
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
}

struct NetworkEntry {
    name: String,
    attached: HashSet<String>,
}

pub struct NetworkManager {
    daemon: Arc<dyn DaemonApi>,
    networks: Mutex<HashMap<String, NetworkEntry>>,
}

impl NetworkManager {
    pub fn new(daemon: Arc<dyn DaemonApi>) -> Self {
        Self {
            daemon,
            networks: Mutex::new(HashMap::new()),
        }
    }

    /// Create an isolated, labeled test network
    pub async fn create_network(
        &self,
        labels: &BTreeMap<String, String>,
        name: Option<String>,
    ) -> Result<NetworkHandle, EngineError> {
        let name = name.unwrap_or_else(|| {
            let uuid = uuid::Uuid::new_v4().to_string();
            format!("tc-net-{}", &uuid[..8])
        });

        let id = self.daemon.create_network(&name, labels).await?;
        info!(network_id = %id, name = %name, "Created network");

        self.networks.lock().await.insert(
            id.clone(),
            NetworkEntry {
                name: name.clone(),
                attached: HashSet::new(),
            },
        );

        Ok(NetworkHandle { id, name })
    }

    /// Attach a container to a managed network
    pub async fn attach(&self, network_id: &str, container_id: &str) -> Result<(), EngineError> {
        let mut networks = self.networks.lock().await;
        let entry = networks.get_mut(network_id).ok_or_else(|| {
            EngineError::state_conflict(container_id, "unknown network", "attach")
        })?;

        self.daemon.connect_network(network_id, container_id).await?;
        entry.attached.insert(container_id.to_string());
        debug!(network_id = %network_id, container_id = %container_id, "Attached to network");
        Ok(())
    }

    /// Detach a container; remove the network once nothing is attached.
    /// Returns whether the network was removed. Removal failures are
    /// recorded as cleanup failures, never escalated; the reaper sweeps
    /// labeled networks regardless.
    pub async fn detach_and_maybe_remove(
        &self,
        network_id: &str,
        container_id: &str,
    ) -> Result<bool, EngineError> {
        let mut networks = self.networks.lock().await;
        let Some(entry) = networks.get_mut(network_id) else {
            // concurrent teardown already removed it
            return Ok(false);
        };

        self.daemon
            .disconnect_network(network_id, container_id)
            .await?;
        entry.attached.remove(container_id);

        if !entry.attached.is_empty() {
            return Ok(false);
        }

        let name = entry.name.clone();
        match self.daemon.remove_network(network_id).await {
            Ok(()) => {
                networks.remove(network_id);
                info!(network_id = %network_id, name = %name, "Removed empty network");
                Ok(true)
            }
            Err(e) => {
                log_cleanup_failure("network", network_id, "-", &e.to_string());
                Ok(false)
            }
        }
    }

    /// Number of containers currently attached (for diagnostics)
    pub async fn attachment_count(&self, network_id: &str) -> Option<usize> {
        self.networks
            .lock()
            .await
            .get(network_id)
            .map(|entry| entry.attached.len())
    }
}
