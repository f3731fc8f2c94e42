//! Exit-code condition
//!
//! Polls inspect until the container has exited. An exit with the wrong
//! code is a death, not a pending wait.

use super::{Backoff, WaitContext, WaitFailure};

pub(crate) async fn probe(ctx: &WaitContext, expected: i64) -> Result<(), WaitFailure> {
    let mut backoff = Backoff::new(ctx.config.poll_interval, ctx.config.backoff_ceiling);

    loop {
        let details = ctx
            .daemon
            .inspect_container(&ctx.container_id)
            .await
            .map_err(WaitFailure::Fatal)?;

        if details.exited {
            return if details.exit_code == Some(expected) {
                Ok(())
            } else {
                Err(WaitFailure::Died {
                    exit_code: details.exit_code,
                })
            };
        }

        backoff.wait().await;
    }
}
