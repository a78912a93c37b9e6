//! Per-session liveness tracking.
//!
//! Each connected session instance gets a fresh [`LivenessCounter`] from the
//! supervisor-owned [`LivenessBoard`]. Sessions reset their counter when they
//! observe real traffic; the watchdog only reads the board.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::types::{Role, StallReport};

/// Timestamp of the last traffic a session observed.
#[derive(Debug)]
pub struct LivenessCounter {
    last_seen: Mutex<Instant>,
}

impl Default for LivenessCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessCounter {
    /// A counter that is fresh as of now.
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Mark the session as fresh.
    pub fn reset(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last reset. Grows monotonically between resets.
    pub fn age(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

#[derive(Debug)]
struct ArmedSlot {
    generation: u64,
    counter: Arc<LivenessCounter>,
    /// A stall was already reported for this generation.
    reported: bool,
}

/// Liveness counters of the currently connected session of each role.
#[derive(Debug, Default)]
pub struct LivenessBoard {
    slots: [Mutex<Option<ArmedSlot>>; 2],
}

impl LivenessBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh counter for a session instance that just connected.
    ///
    /// Replaces whatever an earlier generation left behind.
    pub fn arm(&self, role: Role, generation: u64) -> Arc<LivenessCounter> {
        let counter = Arc::new(LivenessCounter::new());
        *self.slots[role.index()].lock() = Some(ArmedSlot {
            generation,
            counter: Arc::clone(&counter),
            reported: false,
        });
        counter
    }

    /// Remove the counter of `generation`, if it is still the armed one.
    pub fn retire(&self, role: Role, generation: u64) {
        let mut slot = self.slots[role.index()].lock();
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            *slot = None;
        }
    }

    /// Age of the armed counter for `role`, if a session is connected.
    pub fn age(&self, role: Role) -> Option<Duration> {
        self.slots[role.index()]
            .lock()
            .as_ref()
            .map(|s| s.counter.age())
    }

    /// Check the armed session of `role` against `timeout`.
    ///
    /// Returns a report the first time the session is found stale; later
    /// checks of the same generation return `None`.
    pub fn check(&self, role: Role, timeout: Duration) -> Option<StallReport> {
        let mut guard = self.slots[role.index()].lock();
        let slot = guard.as_mut()?;
        if slot.reported {
            return None;
        }
        let silent_for = slot.counter.age();
        if silent_for < timeout {
            return None;
        }
        slot.reported = true;
        Some(StallReport {
            role,
            generation: slot.generation,
            silent_for,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn counter_ages_until_reset() {
        let counter = LivenessCounter::new();
        advance(Duration::from_secs(3)).await;
        assert!(counter.age() >= Duration::from_secs(3));

        counter.reset();
        assert_eq!(counter.age(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_role_never_stalls() {
        let board = LivenessBoard::new();
        advance(TIMEOUT * 2).await;
        assert!(board.check(Role::Upstream, TIMEOUT).is_none());
        assert!(board.age(Role::Upstream).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_is_reported_once() {
        let board = LivenessBoard::new();
        board.arm(Role::Upstream, 3);

        advance(TIMEOUT - Duration::from_millis(1)).await;
        assert!(board.check(Role::Upstream, TIMEOUT).is_none());

        advance(Duration::from_millis(1)).await;
        let report = board.check(Role::Upstream, TIMEOUT).unwrap();
        assert_eq!(report.role, Role::Upstream);
        assert_eq!(report.generation, 3);
        assert!(report.silent_for >= TIMEOUT);

        advance(TIMEOUT).await;
        assert!(board.check(Role::Upstream, TIMEOUT).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_keeps_session_alive() {
        let board = LivenessBoard::new();
        let counter = board.arm(Role::Downstream, 1);

        for _ in 0..10 {
            advance(TIMEOUT / 2).await;
            counter.reset();
            assert!(board.check(Role::Downstream, TIMEOUT).is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn roles_are_independent() {
        let board = LivenessBoard::new();
        board.arm(Role::Upstream, 1);
        let downstream = board.arm(Role::Downstream, 1);

        advance(TIMEOUT).await;
        downstream.reset();

        assert!(board.check(Role::Upstream, TIMEOUT).is_some());
        assert!(board.check(Role::Downstream, TIMEOUT).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retire_ignores_newer_generation() {
        let board = LivenessBoard::new();
        board.arm(Role::Upstream, 1);
        board.arm(Role::Upstream, 2);

        board.retire(Role::Upstream, 1);
        assert!(board.age(Role::Upstream).is_some());

        board.retire(Role::Upstream, 2);
        assert!(board.age(Role::Upstream).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_starts_fresh() {
        let board = LivenessBoard::new();
        board.arm(Role::Upstream, 1);
        advance(TIMEOUT).await;
        assert!(board.check(Role::Upstream, TIMEOUT).is_some());

        board.arm(Role::Upstream, 2);
        assert!(board.check(Role::Upstream, TIMEOUT).is_none());
        assert_eq!(board.age(Role::Upstream), Some(Duration::ZERO));
    }
}
