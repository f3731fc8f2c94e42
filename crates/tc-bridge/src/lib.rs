//! # tc-bridge
//!
//! The boundary a calling-language facade consumes: flat, blocking
//! functions over the async engine, with sessions and containers exposed
//! as opaque, non-forgeable tokens.
//!
//! The bridge owns a multi-thread tokio runtime and the [`Engine`]; the
//! engine never calls back across the boundary. Tokens are `Copy` newtypes
//! over ids issued by the bridge itself; the facade can only receive
//! them, never construct them, and a stale or foreign token resolves to a
//! clean error rather than undefined behavior. Handles are not meant to be
//! used after the session that produced them ends; the bridge invalidates
//! their tokens at that point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use tc_common::EngineError;
use testcontainers::{DaemonApi, Engine, EngineConfig, ReaperSession};

pub use tc_common::error::{ConfigurationError, CoreError};
pub use testcontainers::{
    ContainerPort, ContainerSpec, ExecOutput, MatchSource, Mount, Protocol, WaitCondition,
};

/// Opaque session token. Only the bridge can mint one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionRef(u64);

/// Opaque container token. Only the bridge can mint one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerRef(u64);

struct ContainerEntry {
    container_id: String,
    session_token: u64,
}

/// Blocking facade boundary over the engine
pub struct Bridge {
    runtime: tokio::runtime::Runtime,
    engine: Engine,
    sessions: Mutex<HashMap<u64, Arc<ReaperSession>>>,
    containers: Mutex<HashMap<u64, ContainerEntry>>,
    next_token: AtomicU64,
}

impl Bridge {
    /// Build the runtime and connect the engine to the configured daemon.
    pub fn connect(config: EngineConfig) -> Result<Self, EngineError> {
        let endpoint = config.daemon.socket_path.clone();
        let runtime = build_runtime(&endpoint)?;
        let engine = runtime.block_on(Engine::new(config))?;
        Ok(Self::assemble(runtime, engine))
    }

    /// Build the bridge over an existing daemon client. This is the seam
    /// tests and embedders use to substitute a daemon implementation.
    pub fn with_daemon(
        config: EngineConfig,
        daemon: Arc<dyn DaemonApi>,
    ) -> Result<Self, EngineError> {
        let endpoint = config.daemon.socket_path.clone();
        let runtime = build_runtime(&endpoint)?;
        let engine = Engine::with_daemon(config, daemon);
        Ok(Self::assemble(runtime, engine))
    }

    fn assemble(runtime: tokio::runtime::Runtime, engine: Engine) -> Self {
        Self {
            runtime,
            engine,
            sessions: Mutex::new(HashMap::new()),
            containers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    fn mint(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    fn session(&self, token: SessionRef) -> Option<Arc<ReaperSession>> {
        self.sessions.lock().unwrap().get(&token.0).cloned()
    }

    fn container_id(&self, token: ContainerRef) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .get(&token.0)
            .map(|entry| entry.container_id.clone())
    }

    /// Begin a cleanup session
    pub fn begin_session(&self) -> SessionRef {
        let session = {
            let _guard = self.runtime.enter();
            self.engine.begin_session()
        };
        let token = self.mint();
        self.sessions.lock().unwrap().insert(token, session);
        debug!(token = token, "Session token issued");
        SessionRef(token)
    }

    /// End a session: removes every resource it created and invalidates
    /// its container tokens. Idempotent: ending an unknown or
    /// already-ended session succeeds silently.
    pub fn end_session(&self, session: SessionRef) -> Result<(), EngineError> {
        let Some(entry) = self.sessions.lock().unwrap().remove(&session.0) else {
            return Ok(());
        };

        self.runtime.block_on(self.engine.end_session(&entry))?;

        self.containers
            .lock()
            .unwrap()
            .retain(|_, e| e.session_token != session.0);
        Ok(())
    }

    /// Provision a container under a session; blocks until it is `Ready`
    /// or a classified error is available.
    pub fn provision(
        &self,
        session: SessionRef,
        spec: ContainerSpec,
    ) -> Result<ContainerRef, EngineError> {
        let Some(entry) = self.session(session) else {
            return Err(EngineError::state_conflict(
                "-",
                "ended session",
                "provision",
            ));
        };

        let container_id = self.runtime.block_on(self.engine.provision(&entry, spec))?;

        let token = self.mint();
        self.containers.lock().unwrap().insert(
            token,
            ContainerEntry {
                container_id,
                session_token: session.0,
            },
        );
        Ok(ContainerRef(token))
    }

    /// Non-blocking readiness query; false for stale tokens
    pub fn ready(&self, container: ContainerRef) -> bool {
        match self.container_id(container) {
            Some(id) => self.engine.ready(&id),
            None => false,
        }
    }

    /// Stop and remove a container. Idempotent; a stale token is a no-op
    /// success, matching double-cleanup from explicit code and the reaper.
    pub fn terminate(&self, container: ContainerRef) -> Result<(), EngineError> {
        let Some(id) = self.container_id(container) else {
            return Ok(());
        };
        self.runtime.block_on(self.engine.terminate(&id))
    }

    /// Resolved host port for an exposed container port; None for stale
    /// tokens or unmapped ports
    pub fn port_binding(&self, container: ContainerRef, port: ContainerPort) -> Option<u16> {
        let id = self.container_id(container)?;
        self.engine.port_binding(&id, port)
    }

    /// Run a command inside a `Running`/`Ready` container
    pub fn exec_in(
        &self,
        container: ContainerRef,
        argv: &[String],
    ) -> Result<ExecOutput, EngineError> {
        let Some(id) = self.container_id(container) else {
            return Err(EngineError::state_conflict(
                "-",
                "stale container token",
                "exec_in",
            ));
        };
        self.runtime.block_on(self.engine.exec_in(&id, argv))
    }
}

fn build_runtime(endpoint: &str) -> Result<tokio::runtime::Runtime, EngineError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tc-bridge")
        .build()
        .map_err(|e| EngineError::daemon_unreachable(endpoint, 1, e))
}
