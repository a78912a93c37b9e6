//! Connected phase of the downstream (aggregator) session.

use feedlink_core::control::keepalive_line;
use feedlink_core::{ControlMessage, LineFramer, decode_control};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::error::SessionError;
use super::liveness::LivenessCounter;
use super::session::{READ_BUF_SIZE, SessionContext, torn_down};
use super::types::SessionEnd;

enum WriteOutcome {
    Written,
    TornDown,
}

/// Drain the outbound queue into the aggregator, answer its control traffic
/// and send the periodic keepalive sentence.
pub(super) async fn run(
    stream: TcpStream,
    ctx: &SessionContext,
    liveness: &LivenessCounter,
    teardown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, SessionError> {
    let (mut reader, mut writer) = stream.into_split();
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let keepalive_sentence = keepalive_line();

    let mut keepalive = tokio::time::interval(ctx.config.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            biased;
            () = torn_down(teardown) => return Ok(SessionEnd::TornDown),
            read = reader.read(&mut buf) => {
                let n = read.map_err(SessionError::Read)?;
                if n == 0 {
                    info!(addr = %ctx.config.downstream, "Aggregator closed the connection");
                    return Ok(SessionEnd::ClosedByPeer);
                }
                for line in framer.feed(&buf[..n]) {
                    handle_control(ctx, liveness, &line);
                }
            }
            _ = keepalive.tick() => {
                trace!("Send keepalive");
                let written = write_line(&mut writer, &keepalive_sentence, teardown).await?;
                if let WriteOutcome::TornDown = written {
                    return Ok(SessionEnd::TornDown);
                }
            }
            head = ctx.queue.next() => {
                let line = head.envelope.to_json_line()?;
                if let WriteOutcome::TornDown = write_line(&mut writer, &line, teardown).await? {
                    return Ok(SessionEnd::TornDown);
                }
                // Only a completed write advances the queue.
                if !ctx.queue.ack(head.seq) {
                    trace!(seq = head.seq, "Written frame was evicted during the write");
                }
                ctx.stats.record_written();
                trace!(seq = head.seq, "Frame written");
            }
        }
    }
}

/// Write one line, abandoning it if teardown is requested mid-write.
async fn write_line(
    writer: &mut OwnedWriteHalf,
    line: &str,
    teardown: &mut watch::Receiver<bool>,
) -> Result<WriteOutcome, SessionError> {
    tokio::select! {
        written = writer.write_all(line.as_bytes()) => {
            written.map_err(SessionError::Write)?;
            Ok(WriteOutcome::Written)
        }
        () = torn_down(teardown) => Ok(WriteOutcome::TornDown),
    }
}

fn handle_control(ctx: &SessionContext, liveness: &LivenessCounter, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match decode_control(line) {
        ControlMessage::Ping => {
            liveness.reset();
            ctx.stats.record_ping();
            trace!("Received keepalive");
        }
        ControlMessage::Unrecognized(value) => {
            debug!(message = %value, "Ignoring unrecognized control message");
        }
        ControlMessage::Malformed(error) => {
            warn!(error = %error, line = %line, "Ignoring malformed control message");
        }
    }
}
