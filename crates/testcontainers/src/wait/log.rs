//! Streaming log-pattern condition
//!
//! Subscribes to the container's log stream once and matches incrementally.
//! Chunk boundaries are arbitrary, so a rolling carry of the last
//! `pattern.len() - 1` bytes bridges matches that span chunks.

use futures_util::stream::StreamExt;
use tracing::trace;

use super::{MatchSource, WaitContext, WaitFailure};
use crate::daemon::DaemonApi;
use std::sync::Arc;

pub(crate) async fn probe(
    ctx: &WaitContext,
    pattern: &str,
    source: MatchSource,
    times: usize,
) -> Result<(), WaitFailure> {
    let mut matcher = LogMatcher::new(pattern.as_bytes(), times);
    if matcher.is_satisfied() {
        return Ok(());
    }

    let mut stream = ctx.daemon.log_stream(&ctx.container_id, true);

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                if !source.accepts(chunk.source) {
                    continue;
                }
                if matcher.feed(&chunk.message) {
                    trace!(container_id = %ctx.container_id, "Log pattern matched");
                    return Ok(());
                }
            }
            Err(e) => return Err(WaitFailure::Fatal(e)),
        }
    }

    // Stream ended before the pattern appeared: the container stopped
    // producing output, which with a follow stream means it exited.
    let exit_code = match ctx.daemon.inspect_container(&ctx.container_id).await {
        Ok(details) => details.exit_code,
        Err(e) => return Err(WaitFailure::Fatal(e)),
    };
    Err(WaitFailure::Died { exit_code })
}

/// Capture the trailing `max_lines` lines of a container's output,
/// best-effort. Used to enrich `ContainerDied` reports.
pub(crate) async fn capture_log_tail(
    daemon: &Arc<dyn DaemonApi>,
    container_id: &str,
    max_lines: u32,
) -> String {
    let mut stream = daemon.log_stream(container_id, false);
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => buffer.extend_from_slice(&chunk.message),
            Err(_) => break,
        }
    }

    let text = String::from_utf8_lossy(&buffer);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines as usize);
    lines[start..].join("\n")
}

/// Incremental substring counter over a byte stream
struct LogMatcher {
    pattern: Vec<u8>,
    needed: usize,
    seen: usize,
    carry: Vec<u8>,
}

impl LogMatcher {
    fn new(pattern: &[u8], times: usize) -> Self {
        let mut matcher = Self {
            pattern: pattern.to_vec(),
            needed: times,
            seen: 0,
            carry: Vec::new(),
        };
        // an empty pattern or zero count is trivially satisfied
        if matcher.pattern.is_empty() || matcher.needed == 0 {
            matcher.seen = matcher.needed;
        }
        matcher
    }

    fn is_satisfied(&self) -> bool {
        self.seen >= self.needed
    }

    /// Feed one chunk; returns true once the pattern has appeared the
    /// required number of times. Occurrences are counted non-overlapping.
    fn feed(&mut self, data: &[u8]) -> bool {
        if self.is_satisfied() {
            return true;
        }

        self.carry.extend_from_slice(data);
        let plen = self.pattern.len();

        let mut i = 0;
        while !self.is_satisfied() && i + plen <= self.carry.len() {
            if self.carry[i..i + plen] == self.pattern[..] {
                self.seen += 1;
                i += plen;
            } else {
                i += 1;
            }
        }

        if self.is_satisfied() {
            self.carry.clear();
            return true;
        }

        // keep only the bytes that could still prefix a spanning match
        let keep = std::cmp::min(self.carry.len(), plen - 1);
        let start = self.carry.len() - keep;
        self.carry.drain(..start);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_match() {
        let mut matcher = LogMatcher::new(b"ready to accept connections", 1);
        assert!(!matcher.feed(b"starting up...\n"));
        assert!(matcher.feed(b"ready to accept connections\n"));
    }

    #[test]
    fn test_match_spanning_chunks() {
        let mut matcher = LogMatcher::new(b"ready", 1);
        assert!(!matcher.feed(b"...rea"));
        assert!(matcher.feed(b"dy..."));
    }

    #[test]
    fn test_times_counted_across_chunks() {
        let mut matcher = LogMatcher::new(b"ok", 3);
        assert!(!matcher.feed(b"ok ok"));
        assert!(!matcher.feed(b" o"));
        assert!(matcher.feed(b"k"));
    }

    #[test]
    fn test_no_double_count_from_carry() {
        let mut matcher = LogMatcher::new(b"abc", 2);
        assert!(!matcher.feed(b"abc"));
        // the carry holds at most 2 bytes, which cannot re-form "abc"
        assert!(!matcher.feed(b"xx"));
        assert!(matcher.feed(b"abc"));
    }

    #[test]
    fn test_empty_pattern_trivially_satisfied() {
        let matcher = LogMatcher::new(b"", 1);
        assert!(matcher.is_satisfied());
    }
}
