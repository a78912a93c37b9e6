//! Connected phase of the upstream (decoder feed) session.

use std::sync::Arc;

use feedlink_core::{Envelope, LineFramer};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::error::SessionError;
use super::liveness::LivenessCounter;
use super::queue::PushOutcome;
use super::session::{READ_BUF_SIZE, SessionContext, torn_down};
use super::types::SessionEnd;

/// Read lines from the decoder and enqueue an envelope for each non-empty one.
pub(super) async fn run(
    mut stream: TcpStream,
    ctx: &SessionContext,
    liveness: &LivenessCounter,
    teardown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, SessionError> {
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        tokio::select! {
            biased;
            () = torn_down(teardown) => return Ok(SessionEnd::TornDown),
            read = stream.read(&mut buf) => {
                let n = read.map_err(SessionError::Read)?;
                if n == 0 {
                    info!(addr = %ctx.config.upstream, "Decoder closed the connection");
                    if framer.pending() > 0 {
                        debug!(bytes = framer.pending(), "Discarding unterminated line");
                    }
                    return Ok(SessionEnd::ClosedByPeer);
                }
                for line in framer.feed(&buf[..n]) {
                    // Any line, even an empty one, proves the decoder is alive.
                    liveness.reset();
                    if !line.is_empty() {
                        enqueue(ctx, line);
                    }
                }
            }
        }
    }
}

fn enqueue(ctx: &SessionContext, line: String) {
    trace!(data = %line, "Enqueue frame");
    let envelope = Envelope::new(Arc::clone(&ctx.config.src_name), line);
    let outcome = ctx.queue.push(envelope);
    if outcome != PushOutcome::DroppedNewest {
        ctx.stats.record_enqueued();
    }
    if outcome.lost_envelope() {
        ctx.stats.record_dropped();
        let dropped = match outcome {
            PushOutcome::EvictedOldest => "oldest",
            PushOutcome::DroppedNewest | PushOutcome::Queued => "newest",
        };
        warn!(
            capacity = ctx.queue.capacity(),
            dropped, "Outbound queue full, dropping frame"
        );
    }
}
