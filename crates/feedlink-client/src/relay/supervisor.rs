//! Relay supervisor: owns both sessions and the watchdog.
//!
//! Each role is driven by its own loop: build a fresh [`Session`], run it
//! until it ends, wait the fixed reconnect delay, repeat. Stall reports from
//! the watchdog tear down exactly the session they name.

use std::sync::Arc;

use feedlink_core::config::StallPolicy;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::config::RelayConfig;
use super::session::{Session, SessionContext};
use super::stats::StatsSnapshot;
use super::types::{RelayExit, Role, SessionEnd, SessionState, StallReport};
use super::watchdog::Watchdog;

/// Capacity of the per-role stall report channels.
const STALL_CHANNEL_CAPACITY: usize = 4;

/// Top-level orchestrator of the relay.
pub struct Supervisor {
    ctx: SessionContext,
    states: [Arc<watch::Sender<SessionState>>; 2],
}

impl Supervisor {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            ctx: SessionContext::new(config),
            states: [
                Arc::new(watch::channel(SessionState::Disconnected).0),
                Arc::new(watch::channel(SessionState::Disconnected).0),
            ],
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.ctx.config
    }

    /// Observe the state of the current session of `role`.
    pub fn subscribe_state(&self, role: Role) -> watch::Receiver<SessionState> {
        self.states[role.index()].subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Number of envelopes waiting for the aggregator.
    pub fn queued(&self) -> usize {
        self.ctx.queue.len()
    }

    /// Run the relay until `shutdown` turns `true` (or its sender is dropped),
    /// or until a stall under the `exit` stall policy.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RelayExit {
        let config = &self.ctx.config;
        if !config.enabled {
            info!("Relay not enabled in configuration, not starting");
            return RelayExit::Disabled;
        }

        info!(
            src = %config.src_name,
            upstream = %config.upstream,
            downstream = %config.downstream,
            delay_ms = config.reconnect.delay.as_millis(),
            stall_policy = %config.stall_policy,
            "Starting relay"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let (upstream_tx, upstream_rx) = mpsc::channel(STALL_CHANNEL_CAPACITY);
        let (downstream_tx, downstream_rx) = mpsc::channel(STALL_CHANNEL_CAPACITY);
        let (report_tx, mut report_rx) = mpsc::channel::<StallReport>(STALL_CHANNEL_CAPACITY);

        let watchdog = Watchdog::new(Arc::clone(&self.ctx.board), config)
            .spawn(report_tx, stop_rx);

        // Route watchdog reports to the loop owning the named role.
        let route = async {
            while let Some(report) = report_rx.recv().await {
                let target = match report.role {
                    Role::Upstream => &upstream_tx,
                    Role::Downstream => &downstream_tx,
                };
                if target.send(report).await.is_err() {
                    break;
                }
            }
        };

        let forward_shutdown = async {
            let mut stop = stop_tx.subscribe();
            tokio::select! {
                _ = shutdown.wait_for(|s| *s) => {
                    info!("Relay shutdown requested");
                    stop_tx.send_replace(true);
                }
                _ = stop.wait_for(|s| *s) => {}
            }
        };

        // The router ends once the watchdog has stopped and dropped its sender,
        // which only happens after `stop` is set; joining it is safe.
        let (upstream_exit, downstream_exit, (), ()) = tokio::join!(
            self.supervise(Role::Upstream, upstream_rx, &stop_tx),
            self.supervise(Role::Downstream, downstream_rx, &stop_tx),
            forward_shutdown,
            route,
        );

        if let Err(e) = watchdog.await {
            warn!(error = %e, "Watchdog task failed");
        }

        let stats = self.stats();
        info!(
            frames_enqueued = stats.frames_enqueued,
            frames_dropped = stats.frames_dropped,
            frames_written = stats.frames_written,
            pings_received = stats.pings_received,
            upstream_reconnects = stats.upstream_reconnects,
            downstream_reconnects = stats.downstream_reconnects,
            upstream_stalls = stats.upstream_stalls,
            downstream_stalls = stats.downstream_stalls,
            "Relay stopped"
        );
        if !self.ctx.queue.is_empty() {
            warn!(
                queued = self.ctx.queue.len(),
                "Discarding undelivered envelopes"
            );
        }

        upstream_exit
            .or(downstream_exit)
            .map_or(RelayExit::Shutdown, RelayExit::Stalled)
    }

    /// Lifecycle loop for one role. Returns `Some(role)` when the relay must
    /// stop because this role stalled under the `exit` stall policy.
    async fn supervise(
        &self,
        role: Role,
        mut stalls: mpsc::Receiver<StallReport>,
        stop_tx: &watch::Sender<bool>,
    ) -> Option<Role> {
        let policy = self.ctx.config.reconnect;
        let state = &self.states[role.index()];
        let mut stop = stop_tx.subscribe();
        let mut generation: u64 = 0;

        loop {
            if *stop.borrow() {
                return None;
            }

            generation += 1;
            let (teardown_tx, teardown_rx) = watch::channel(false);
            let session = Session::new(role, generation, self.ctx.clone(), Arc::clone(state));
            let mut handle = tokio::spawn(session.start(teardown_rx));
            let mut stalled = false;
            let mut stopping = false;

            // Wait for the session to end, acting on stalls and shutdown.
            let joined = loop {
                tokio::select! {
                    joined = &mut handle => break joined,
                    Some(report) = stalls.recv() => {
                        if report.generation != generation {
                            debug!(role = %role, stale = report.generation, "Ignoring stall report for retired session");
                            continue;
                        }
                        warn!(
                            role = %role,
                            generation,
                            silent_ms = report.silent_for.as_millis(),
                            "Liveness check failed, forcing reconnect"
                        );
                        self.ctx.stats.record_stall(role);
                        stalled = true;
                        teardown_tx.send_replace(true);
                    }
                    _ = stop.wait_for(|s| *s), if !stopping => {
                        stopping = true;
                        teardown_tx.send_replace(true);
                    }
                }
            };

            // The session task has fully ended here; its socket is gone.
            self.ctx.board.retire(role, generation);
            state.send_replace(SessionState::Disconnected);

            match joined {
                Ok(Ok(SessionEnd::TornDown)) => {
                    info!(role = %role, generation, "Session torn down");
                }
                Ok(Ok(SessionEnd::ClosedByPeer)) => {
                    info!(role = %role, generation, "Session closed by peer");
                }
                Ok(Err(e)) if e.is_connect_failure() => {
                    warn!(role = %role, error = %e, "Connect failed");
                }
                Ok(Err(e)) => {
                    warn!(role = %role, generation, error = %e, "Session failed");
                }
                Err(e) => {
                    error!(role = %role, generation, error = %e, "Session task aborted");
                }
            }

            if stopping || *stop.borrow() {
                return None;
            }

            if stalled && self.ctx.config.stall_policy == StallPolicy::Exit {
                error!(role = %role, "Stall policy is exit, stopping relay");
                stop_tx.send_replace(true);
                return Some(role);
            }

            let delay = policy.delay;
            info!(
                role = %role,
                delay_ms = delay.as_millis(),
                "Reconnecting after delay"
            );
            tokio::select! {
                () = sleep(delay) => {}
                _ = stop.wait_for(|s| *s) => return None,
            }
            self.ctx.stats.record_reconnect(role);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::relay::config::Endpoint;

    #[tokio::test]
    async fn disabled_relay_returns_immediately() {
        let mut config = RelayConfig::new(
            "test",
            Endpoint::new("127.0.0.1", 1),
            Endpoint::new("127.0.0.1", 2),
        );
        config.enabled = false;
        let supervisor = Supervisor::new(config);
        let (_tx, rx) = watch::channel(false);

        assert_eq!(supervisor.run(rx).await, RelayExit::Disabled);
        assert_eq!(supervisor.stats(), StatsSnapshot::default());
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_relay() {
        let mut config = RelayConfig::new(
            "test",
            Endpoint::new("127.0.0.1", 1),
            Endpoint::new("127.0.0.1", 2),
        );
        config.reconnect.delay = std::time::Duration::from_millis(10);
        let supervisor = Supervisor::new(config);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let exit = tokio::time::timeout(std::time::Duration::from_secs(5), supervisor.run(rx))
            .await
            .unwrap();
        assert_eq!(exit, RelayExit::Shutdown);
    }
}
