//! Relay module: keeps the decoder and aggregator connections alive.
//!
//! This is the "glue" that connects:
//! - `Session` instances (one per connection lifetime, per role)
//! - `OutboundQueue` (decoder frames waiting for the aggregator)
//! - `Watchdog` (silent-stall detection through the `LivenessBoard`)
//! - `Supervisor` (reconnect policy and relay lifecycle)

pub mod config;
mod downstream;
pub mod error;
pub mod liveness;
pub mod queue;
pub mod session;
pub mod stats;
pub mod supervisor;
mod types;
mod upstream;
pub mod watchdog;

pub use config::{Endpoint, ReconnectPolicy, RelayConfig};
pub use error::{ConfigError, SessionError};
pub use liveness::{LivenessBoard, LivenessCounter};
pub use queue::{OutboundQueue, PushOutcome, Queued};
pub use session::{Session, SessionContext};
pub use stats::{RelayStats, StatsSnapshot};
pub use supervisor::Supervisor;
pub use types::*;
pub use watchdog::Watchdog;
