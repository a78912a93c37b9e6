//! One connection lifetime for either role.
//!
//! A [`Session`] is started once, runs until its socket fails, closes or is
//! torn down, and is then discarded. The supervisor builds a new instance
//! (with a new generation number) for every reconnect.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info};

use super::config::{Endpoint, RelayConfig};
use super::error::SessionError;
use super::liveness::LivenessBoard;
use super::queue::OutboundQueue;
use super::stats::RelayStats;
use super::types::{Role, SessionEnd, SessionState};
use super::{downstream, upstream};

/// Read buffer size for both sockets.
pub(super) const READ_BUF_SIZE: usize = 4096;

/// Shared pieces every session needs; cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub config: Arc<RelayConfig>,
    pub queue: Arc<OutboundQueue>,
    pub board: Arc<LivenessBoard>,
    pub stats: Arc<RelayStats>,
}

impl SessionContext {
    pub fn new(config: RelayConfig) -> Self {
        let queue = OutboundQueue::new(config.queue_capacity, config.overflow_policy);
        Self {
            config: Arc::new(config),
            queue: Arc::new(queue),
            board: Arc::new(LivenessBoard::new()),
            stats: Arc::new(RelayStats::new()),
        }
    }
}

/// A single TCP connection lifecycle.
pub struct Session {
    role: Role,
    generation: u64,
    endpoint: Endpoint,
    ctx: SessionContext,
    state: Arc<watch::Sender<SessionState>>,
}

impl Session {
    pub fn new(
        role: Role,
        generation: u64,
        ctx: SessionContext,
        state: Arc<watch::Sender<SessionState>>,
    ) -> Self {
        let endpoint = ctx.config.endpoint(role).clone();
        state.send_replace(SessionState::Disconnected);
        Self {
            role,
            generation,
            endpoint,
            ctx,
            state,
        }
    }

    /// Connect and serve until the connection ends.
    ///
    /// Setting `teardown` to `true` ends the session promptly, dropping the
    /// socket. The session is `Disconnected` when this returns.
    pub async fn start(
        self,
        mut teardown: watch::Receiver<bool>,
    ) -> Result<SessionEnd, SessionError> {
        self.transition(SessionState::Connecting);
        let result = self.connect_and_run(&mut teardown).await;
        self.transition(SessionState::Disconnected);
        result
    }

    async fn connect_and_run(
        &self,
        teardown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, SessionError> {
        let stream = tokio::select! {
            stream = self.connect() => stream?,
            () = torn_down(teardown) => return Ok(SessionEnd::TornDown),
        };

        info!(
            role = %self.role,
            addr = %self.endpoint,
            generation = self.generation,
            "Connected"
        );
        self.transition(SessionState::Connected);
        let liveness = self.ctx.board.arm(self.role, self.generation);

        match self.role {
            Role::Upstream => upstream::run(stream, &self.ctx, &liveness, teardown).await,
            Role::Downstream => downstream::run(stream, &self.ctx, &liveness, teardown).await,
        }
    }

    async fn connect(&self) -> Result<TcpStream, SessionError> {
        let addr = self.endpoint.to_string();
        let timeout = self.ctx.config.connect_timeout;
        debug!(role = %self.role, addr = %addr, generation = self.generation, "Connecting");

        match tokio::time::timeout(
            timeout,
            TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port)),
        )
        .await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(SessionError::Connect { addr, source }),
            Err(_) => Err(SessionError::ConnectTimeout { addr, timeout }),
        }
    }

    fn transition(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        debug!(
            role = %self.role,
            generation = self.generation,
            from = ?prev,
            to = ?next,
            "Session state change"
        );
    }
}

/// Resolves once teardown is requested, or the supervisor side went away.
pub(super) async fn torn_down(teardown: &mut watch::Receiver<bool>) {
    let _ = teardown.wait_for(|down| *down).await;
}
