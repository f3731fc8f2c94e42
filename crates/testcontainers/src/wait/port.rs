//! TCP port-open condition

use tokio::net::TcpStream;
use tracing::trace;

use super::{resolve_host_port, Backoff, WaitContext, WaitFailure};
use crate::spec::{ContainerPort, Protocol};
use tc_common::EngineError;

pub(crate) async fn probe(ctx: &WaitContext, port: ContainerPort) -> Result<(), WaitFailure> {
    if port.protocol != Protocol::Tcp {
        return Err(WaitFailure::Fatal(EngineError::spec_rejected(
            400,
            format!("port_open wait supports tcp ports only, got {port}"),
        )));
    }

    let host_port = resolve_host_port(ctx, port)?;
    let mut backoff = Backoff::new(ctx.config.poll_interval, ctx.config.backoff_ceiling);

    loop {
        match TcpStream::connect((ctx.host.as_str(), host_port)).await {
            Ok(_) => {
                trace!(
                    container_id = %ctx.container_id,
                    %port,
                    host_port = host_port,
                    "Port is accepting connections"
                );
                return Ok(());
            }
            Err(_) => backoff.wait().await,
        }
    }
}
