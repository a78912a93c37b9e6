//! Tagged wrapper around one raw line of decoder output.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Origin tag identifying the decoder ingest pathway.
pub const ORIGIN_TAG: &str = "dump1090";

/// Timestamp layout for the `dts` field: space separated, millisecond
/// precision, no trailing `Z`.
pub const DTS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A timestamped, source-tagged frame ready for downstream serialization.
///
/// Immutable once built; the source name is shared between all envelopes of
/// one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    capture_time: NaiveDateTime,
    source_name: Arc<str>,
    origin_tag: &'static str,
    payload: String,
}

/// Wire shape of one envelope line.
#[derive(Serialize)]
struct WireEnvelope<'a> {
    dts: String,
    src: &'a str,
    #[serde(rename = "dataOrigin")]
    data_origin: &'a str,
    data: &'a str,
}

impl Envelope {
    /// Wrap `payload`, stamping it with the current UTC time.
    pub fn new(source_name: Arc<str>, payload: impl Into<String>) -> Self {
        Self::with_capture_time(Utc::now().naive_utc(), source_name, payload)
    }

    /// Wrap `payload` with an explicit capture time.
    pub fn with_capture_time(
        capture_time: NaiveDateTime,
        source_name: Arc<str>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            capture_time,
            source_name,
            origin_tag: ORIGIN_TAG,
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Serialize to a single JSON object terminated by `\n`.
    pub fn to_json_line(&self) -> Result<String> {
        let wire = WireEnvelope {
            dts: self.capture_time.format(DTS_FORMAT).to_string(),
            src: &self.source_name,
            data_origin: self.origin_tag,
            data: &self.payload,
        };
        let mut line = serde_json::to_string(&wire)?;
        line.push('\n');
        Ok(line)
    }
}
