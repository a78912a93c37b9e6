//! Relay module types.

use std::fmt;
use std::time::Duration;

/// Exit code used when the relay stops itself after a stall, so a process
/// manager can tell an intentional restart request from a crash.
pub const STALL_EXIT_CODE: u8 = 75;

/// Which of the two connections a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Connection to the local decoder feed.
    Upstream,
    /// Connection to the aggregation service.
    Downstream,
}

impl Role {
    pub const ALL: [Self; 2] = [Self::Upstream, Self::Downstream];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Upstream => 0,
            Self::Downstream => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of one session instance.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`; an instance
/// never leaves the final `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// How a session ended when no transport error was involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The remote end closed the connection.
    ClosedByPeer,
    /// The supervisor tore the session down (stall or shutdown).
    TornDown,
}

/// Raised by the watchdog when a connected session stopped seeing traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallReport {
    pub role: Role,
    /// Generation of the session instance that stalled.
    pub generation: u64,
    /// Time since the session last observed traffic.
    pub silent_for: Duration,
}

/// Why [`Supervisor::run`](super::Supervisor::run) returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The relay is disabled in configuration and never started.
    Disabled,
    /// A shutdown was requested.
    Shutdown,
    /// A session stalled under the `exit` stall policy.
    Stalled(Role),
}

impl RelayExit {
    /// Process exit code for this outcome.
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Disabled | Self::Shutdown => 0,
            Self::Stalled(_) => STALL_EXIT_CODE,
        }
    }
}
