//! HTTP health-check condition

use tracing::trace;

use super::{resolve_host_port, Backoff, WaitContext, WaitFailure};
use crate::spec::ContainerPort;

pub(crate) async fn probe(
    ctx: &WaitContext,
    port: ContainerPort,
    path: &str,
    expected_status: u16,
) -> Result<(), WaitFailure> {
    let host_port = resolve_host_port(ctx, port)?;

    let client = reqwest::Client::new();
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let url = format!("http://{}:{}{}", ctx.host, host_port, path);

    let mut backoff = Backoff::new(ctx.config.poll_interval, ctx.config.backoff_ceiling);

    loop {
        match client.get(&url).send().await {
            Ok(response) if response.status().as_u16() == expected_status => {
                trace!(container_id = %ctx.container_id, url = %url, "Health endpoint ready");
                return Ok(());
            }
            _ => backoff.wait().await,
        }
    }
}
