//! Relay counters, logged at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

use super::types::Role;

#[derive(Debug, Default)]
pub struct RelayStats {
    frames_enqueued: AtomicU64,
    frames_dropped: AtomicU64,
    frames_written: AtomicU64,
    pings_received: AtomicU64,
    reconnects: [AtomicU64; 2],
    stalls: [AtomicU64; 2],
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_enqueued: u64,
    pub frames_dropped: u64,
    pub frames_written: u64,
    pub pings_received: u64,
    pub upstream_reconnects: u64,
    pub downstream_reconnects: u64,
    pub upstream_stalls: u64,
    pub downstream_stalls: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.frames_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ping(&self) {
        self.pings_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self, role: Role) {
        self.reconnects[role.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stall(&self, role: Role) {
        self.stalls[role.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_enqueued: load(&self.frames_enqueued),
            frames_dropped: load(&self.frames_dropped),
            frames_written: load(&self.frames_written),
            pings_received: load(&self.pings_received),
            upstream_reconnects: load(&self.reconnects[Role::Upstream.index()]),
            downstream_reconnects: load(&self.reconnects[Role::Downstream.index()]),
            upstream_stalls: load(&self.stalls[Role::Upstream.index()]),
            downstream_stalls: load(&self.stalls[Role::Downstream.index()]),
        }
    }
}

impl StatsSnapshot {
    pub const fn reconnects(&self, role: Role) -> u64 {
        match role {
            Role::Upstream => self.upstream_reconnects,
            Role::Downstream => self.downstream_reconnects,
        }
    }

    pub const fn stalls(&self, role: Role) -> u64 {
        match role {
            Role::Upstream => self.upstream_stalls,
            Role::Downstream => self.downstream_stalls,
        }
    }
}
