//! `feedlink` Core Library
//!
//! Shared functionality for the feedlink relay:
//! - Line framing for newline-delimited socket feeds
//! - Envelope construction and JSON-line serialization
//! - Decoding of aggregator control messages
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod control;
pub mod envelope;
pub mod error;
pub mod framer;
pub mod tracing_init;

pub use config::Config;
pub use control::{ControlMessage, decode_control};
pub use envelope::{Envelope, ORIGIN_TAG};
pub use error::{Error, Result};
pub use framer::LineFramer;
