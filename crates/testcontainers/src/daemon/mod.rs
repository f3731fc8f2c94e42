//! Daemon client module
//!
//! `api` defines the typed daemon contract the rest of the engine is
//! written against; `client` implements it over bollard with error
//! classification and bounded retry.

pub mod api;
pub mod client;
pub(crate) mod config_builder;

pub use api::{
    ContainerDetails, ContainerSummary, DaemonApi, ExecOutput, LivenessStream, LogChunk,
    LogSource, LogStream, NetworkSummary,
};
pub use client::DockerDaemon;
