//! feedlink Client Library
//!
//! Core functionality for the feedlink relay client:
//! - Upstream session reading the decoder line feed
//! - Downstream session writing JSON lines to the aggregator
//! - Bounded outbound queue between the two
//! - Liveness watchdog and fixed-delay reconnect supervisor

pub mod relay;
