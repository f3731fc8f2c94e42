//! Wait strategy engine
//!
//! Readiness is an all-of set of `WaitCondition`s evaluated concurrently,
//! each bounded by its own timeout. The first elapsed timeout fails the
//! whole wait naming every condition still unsatisfied; a container that
//! exits before readiness is a distinct `ContainerDied` failure, never a
//! timeout.

mod exit;
mod http;
mod log;
mod port;

pub(crate) use log::capture_log_tail;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use tc_common::EngineError;

use crate::config::WaitConfig;
use crate::daemon::{DaemonApi, LogSource};
use crate::spec::ContainerPort;

/// Which output stream a log condition scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchSource {
    Stdout,
    Stderr,
    Any,
}

impl MatchSource {
    fn accepts(&self, actual: LogSource) -> bool {
        match self {
            MatchSource::Stdout => actual == LogSource::Stdout,
            MatchSource::Stderr => actual == LogSource::Stderr,
            MatchSource::Any => true,
        }
    }
}

/// A single readiness signal with its own timeout and polling knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WaitCondition {
    /// Substring appears in the log stream `times` times. Streaming:
    /// matches incrementally, never re-reads from the start.
    LogPattern {
        pattern: String,
        source: MatchSource,
        times: usize,
        timeout: Option<Duration>,
    },
    /// A TCP connect to the resolved host port succeeds
    PortOpen {
        port: ContainerPort,
        timeout: Option<Duration>,
    },
    /// An HTTP GET against the resolved host port returns the expected status
    HttpHealth {
        port: ContainerPort,
        path: String,
        expected_status: u16,
        timeout: Option<Duration>,
    },
    /// The container exits with the expected code
    ExitCode {
        expected: i64,
        timeout: Option<Duration>,
    },
}

impl WaitCondition {
    pub fn log_pattern(pattern: impl Into<String>) -> Self {
        Self::LogPattern {
            pattern: pattern.into(),
            source: MatchSource::Any,
            times: 1,
            timeout: None,
        }
    }

    pub fn log_pattern_on(pattern: impl Into<String>, source: MatchSource) -> Self {
        Self::LogPattern {
            pattern: pattern.into(),
            source,
            times: 1,
            timeout: None,
        }
    }

    pub fn port_open(port: ContainerPort) -> Self {
        Self::PortOpen {
            port,
            timeout: None,
        }
    }

    pub fn http_health(port: ContainerPort, path: impl Into<String>, expected_status: u16) -> Self {
        Self::HttpHealth {
            port,
            path: path.into(),
            expected_status,
            timeout: None,
        }
    }

    pub fn exit_code(expected: i64) -> Self {
        Self::ExitCode {
            expected,
            timeout: None,
        }
    }

    /// Number of times a log pattern must appear. No effect on other kinds.
    pub fn with_times(self, times: usize) -> Self {
        match self {
            Self::LogPattern {
                pattern,
                source,
                timeout,
                ..
            } => Self::LogPattern {
                pattern,
                source,
                times,
                timeout,
            },
            other => other,
        }
    }

    pub fn with_timeout(self, value: Duration) -> Self {
        match self {
            Self::LogPattern {
                pattern,
                source,
                times,
                ..
            } => Self::LogPattern {
                pattern,
                source,
                times,
                timeout: Some(value),
            },
            Self::PortOpen { port, .. } => Self::PortOpen {
                port,
                timeout: Some(value),
            },
            Self::HttpHealth {
                port,
                path,
                expected_status,
                ..
            } => Self::HttpHealth {
                port,
                path,
                expected_status,
                timeout: Some(value),
            },
            Self::ExitCode { expected, .. } => Self::ExitCode {
                expected,
                timeout: Some(value),
            },
        }
    }

    fn timeout(&self) -> Option<Duration> {
        match self {
            Self::LogPattern { timeout, .. }
            | Self::PortOpen { timeout, .. }
            | Self::HttpHealth { timeout, .. }
            | Self::ExitCode { timeout, .. } => *timeout,
        }
    }

    /// Short name used in `WaitTimeout` reports
    pub fn describe(&self) -> String {
        match self {
            Self::LogPattern { pattern, times, .. } => {
                if *times == 1 {
                    format!("log_pattern({pattern:?})")
                } else {
                    format!("log_pattern({pattern:?} x{times})")
                }
            }
            Self::PortOpen { port, .. } => format!("port_open({port})"),
            Self::HttpHealth {
                port,
                path,
                expected_status,
                ..
            } => format!("http_health({port} {path} {expected_status})"),
            Self::ExitCode { expected, .. } => format!("exit_code({expected})"),
        }
    }
}

/// Everything a probe needs to evaluate one container
pub(crate) struct WaitContext {
    pub daemon: Arc<dyn DaemonApi>,
    pub container_id: String,
    pub host: String,
    pub ports: HashMap<ContainerPort, u16>,
    pub config: WaitConfig,
    /// Per-condition timeout when a condition does not carry its own
    pub default_timeout: Duration,
}

/// How a single condition failed
pub(crate) enum WaitFailure {
    TimedOut,
    Died { exit_code: Option<i64> },
    Fatal(EngineError),
}

/// Evaluate all conditions concurrently; success only when every one is
/// satisfied.
pub(crate) async fn await_ready(
    ctx: &WaitContext,
    conditions: &[WaitCondition],
) -> Result<(), EngineError> {
    if conditions.is_empty() {
        return Ok(());
    }

    let mut satisfied = vec![false; conditions.len()];
    let mut pending = FuturesUnordered::new();
    for (index, condition) in conditions.iter().enumerate() {
        pending.push(async move { (index, run_condition(ctx, condition).await) });
    }

    // With an ExitCode condition, exiting is the expected readiness signal;
    // otherwise an exit before readiness is a failure in its own right.
    let expects_exit = conditions
        .iter()
        .any(|c| matches!(c, WaitCondition::ExitCode { .. }));

    let death = death_watch(ctx);
    tokio::pin!(death);

    loop {
        tokio::select! {
            biased;

            died = &mut death, if !expects_exit => {
                return match died {
                    Ok(exit_code) => Err(container_died(ctx, exit_code).await),
                    Err(e) => Err(e),
                };
            }

            completed = pending.next() => {
                let Some((index, result)) = completed else {
                    return Ok(());
                };
                match result {
                    Ok(()) => {
                        debug!(
                            container_id = %ctx.container_id,
                            condition = %conditions[index].describe(),
                            "Wait condition satisfied"
                        );
                        satisfied[index] = true;
                        if satisfied.iter().all(|s| *s) {
                            return Ok(());
                        }
                    }
                    Err(WaitFailure::TimedOut) => {
                        let unmet = conditions
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| !satisfied[*i])
                            .map(|(_, c)| c.describe())
                            .collect();
                        return Err(EngineError::WaitTimeout {
                            container_id: ctx.container_id.clone(),
                            unmet,
                        });
                    }
                    Err(WaitFailure::Died { exit_code }) => {
                        return Err(container_died(ctx, exit_code).await);
                    }
                    Err(WaitFailure::Fatal(e)) => return Err(e),
                }
            }
        }
    }
}

async fn run_condition(ctx: &WaitContext, condition: &WaitCondition) -> Result<(), WaitFailure> {
    let deadline = condition.timeout().unwrap_or(ctx.default_timeout);

    let probe = async {
        match condition {
            WaitCondition::LogPattern {
                pattern,
                source,
                times,
                ..
            } => log::probe(ctx, pattern, *source, *times).await,
            WaitCondition::PortOpen { port, .. } => port::probe(ctx, *port).await,
            WaitCondition::HttpHealth {
                port,
                path,
                expected_status,
                ..
            } => http::probe(ctx, *port, path, *expected_status).await,
            WaitCondition::ExitCode { expected, .. } => exit::probe(ctx, *expected).await,
        }
    };

    match tokio::time::timeout(deadline, probe).await {
        Ok(result) => result,
        Err(_) => Err(WaitFailure::TimedOut),
    }
}

/// Poll until the container exits; resolves with its exit code.
async fn death_watch(ctx: &WaitContext) -> Result<Option<i64>, EngineError> {
    loop {
        let details = ctx.daemon.inspect_container(&ctx.container_id).await?;
        if details.exited {
            return Ok(details.exit_code);
        }
        tokio::time::sleep(ctx.config.poll_interval).await;
    }
}

async fn container_died(ctx: &WaitContext, exit_code: Option<i64>) -> EngineError {
    let logs =
        capture_log_tail(&ctx.daemon, &ctx.container_id, ctx.config.death_log_tail).await;
    EngineError::ContainerDied {
        container_id: ctx.container_id.clone(),
        exit_code,
        logs,
    }
}

/// Exponential probe backoff bounded by the configured ceiling
pub(crate) struct Backoff {
    current: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            current: initial,
            ceiling,
        }
    }

    fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.ceiling);
        delay
    }

    pub(crate) async fn wait(&mut self) {
        tokio::time::sleep(self.advance()).await;
    }
}

/// Resolve the host port a condition should probe
fn resolve_host_port(ctx: &WaitContext, port: ContainerPort) -> Result<u16, WaitFailure> {
    ctx.ports.get(&port).copied().ok_or_else(|| {
        WaitFailure::Fatal(EngineError::spec_rejected(
            400,
            format!("wait condition references unexposed port {port}"),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.advance(), Duration::from_millis(100));
        assert_eq!(backoff.advance(), Duration::from_millis(200));
        assert_eq!(backoff.advance(), Duration::from_millis(350));
        assert_eq!(backoff.advance(), Duration::from_millis(350));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            WaitCondition::port_open(ContainerPort::tcp(80)).describe(),
            "port_open(80/tcp)"
        );
        assert_eq!(
            WaitCondition::log_pattern("ready").with_times(3).describe(),
            "log_pattern(\"ready\" x3)"
        );
        assert_eq!(WaitCondition::exit_code(0).describe(), "exit_code(0)");
    }

    #[test]
    fn test_with_timeout_applies_to_any_variant() {
        let cond = WaitCondition::exit_code(0).with_timeout(Duration::from_secs(5));
        assert_eq!(cond.timeout(), Some(Duration::from_secs(5)));

        let cond = WaitCondition::log_pattern("up").with_timeout(Duration::from_secs(9));
        assert_eq!(cond.timeout(), Some(Duration::from_secs(9)));
    }

    #[test]
    fn test_match_source() {
        assert!(MatchSource::Any.accepts(LogSource::Stdout));
        assert!(MatchSource::Any.accepts(LogSource::Stderr));
        assert!(MatchSource::Stdout.accepts(LogSource::Stdout));
        assert!(!MatchSource::Stdout.accepts(LogSource::Stderr));
    }
}
