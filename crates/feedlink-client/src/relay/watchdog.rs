//! Liveness watchdog.
//!
//! Runs on its own timer, independent of socket readiness, and reports
//! connected sessions whose liveness counter has gone stale. It never touches
//! sockets or payloads; acting on a report is up to the supervisor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::RelayConfig;
use super::liveness::LivenessBoard;
use super::types::{Role, StallReport};

pub struct Watchdog {
    board: Arc<LivenessBoard>,
    tick: Duration,
    upstream_timeout: Duration,
    downstream_timeout: Duration,
}

impl Watchdog {
    pub fn new(board: Arc<LivenessBoard>, config: &RelayConfig) -> Self {
        Self {
            board,
            tick: config.watchdog_tick,
            upstream_timeout: config.timeout_for(Role::Upstream),
            downstream_timeout: config.timeout_for(Role::Downstream),
        }
    }

    const fn timeout(&self, role: Role) -> Duration {
        match role {
            Role::Upstream => self.upstream_timeout,
            Role::Downstream => self.downstream_timeout,
        }
    }

    /// One watchdog pass over both roles.
    pub fn inspect(&self) -> Vec<StallReport> {
        Role::ALL
            .into_iter()
            .filter_map(|role| self.board.check(role, self.timeout(role)))
            .collect()
    }

    /// Spawn the periodic watchdog task.
    ///
    /// Reports are handed to `reports` without waiting; the board reports
    /// each session instance at most once.
    pub fn spawn(
        self,
        reports: mpsc::Sender<StallReport>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.tick);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await; // Skip first immediate tick
            debug!(tick_ms = self.tick.as_millis(), "Watchdog running");

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        for report in self.inspect() {
                            warn!(
                                role = %report.role,
                                generation = report.generation,
                                silent_ms = report.silent_for.as_millis(),
                                timeout_ms = self.timeout(report.role).as_millis(),
                                "Watchdog: no traffic within timeout"
                            );
                            if let Err(e) = reports.try_send(report) {
                                warn!(error = %e, "Watchdog could not deliver stall report");
                            }
                        }
                    }
                    _ = shutdown.wait_for(|stop| *stop) => {
                        info!("Watchdog shutting down");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::relay::config::Endpoint;
    use tokio::time::advance;

    fn config() -> RelayConfig {
        let mut config = RelayConfig::new(
            "test",
            Endpoint::new("127.0.0.1", 1),
            Endpoint::new("127.0.0.1", 2),
        );
        config.watchdog_tick = Duration::from_secs(1);
        config.upstream_timeout = Duration::from_secs(5);
        config.downstream_timeout = Duration::from_secs(60);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn inspect_uses_per_role_timeouts() {
        let board = Arc::new(LivenessBoard::new());
        let watchdog = Watchdog::new(Arc::clone(&board), &config());
        board.arm(Role::Upstream, 1);
        board.arm(Role::Downstream, 1);

        advance(Duration::from_secs(5)).await;
        let reports = watchdog.inspect();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].role, Role::Upstream);
    }

    #[tokio::test(start_paused = true)]
    async fn stall_reported_within_one_tick_of_timeout() {
        let board = Arc::new(LivenessBoard::new());
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        board.arm(Role::Upstream, 9);
        let started = tokio::time::Instant::now();

        let handle = Watchdog::new(Arc::clone(&board), &config()).spawn(tx, stop_rx);

        let report = rx.recv().await.unwrap();
        let elapsed = started.elapsed();
        assert_eq!(report.generation, 9);
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed <= Duration::from_secs(6));

        // Only once per session instance.
        advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());

        stop_tx.send_replace(true);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_sessions_are_not_reported() {
        let board = Arc::new(LivenessBoard::new());
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        let counter = board.arm(Role::Upstream, 1);

        let handle = Watchdog::new(Arc::clone(&board), &config()).spawn(tx, stop_rx);
        for _ in 0..20 {
            advance(Duration::from_secs(2)).await;
            counter.reset();
        }
        assert!(rx.try_recv().is_err());

        stop_tx.send_replace(true);
        handle.await.unwrap();
    }
}
