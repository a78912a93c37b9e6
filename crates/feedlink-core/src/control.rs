//! Decoder for control messages sent by the aggregator.
//!
//! Implements an explicit tagged decode: a line is either a liveness ping,
//! well-formed JSON we do not recognize, or malformed. Only the first kind
//! may be treated as proof that the peer is healthy.

use serde_json::Value;

/// Field carrying the boolean liveness flag, e.g. `{"ping": true}`.
pub const PING_FIELD: &str = "ping";

/// Field of the keepalive sentence, e.g. `{"keepalive": "abcdef"}`.
pub const KEEPALIVE_FIELD: &str = "keepalive";

/// Token carried by the keepalive sentence the relay sends.
pub const KEEPALIVE_TOKEN: &str = "abcdef";

/// Outcome of decoding one inbound line from the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// A recognized liveness ping.
    Ping,
    /// Valid JSON with a shape we do not act on.
    Unrecognized(Value),
    /// Not JSON at all.
    Malformed(String),
}

/// Decode a single line received from the aggregator.
pub fn decode_control(line: &str) -> ControlMessage {
    match serde_json::from_str::<Value>(line) {
        Ok(value) if is_ping(&value) => ControlMessage::Ping,
        Ok(value) => ControlMessage::Unrecognized(value),
        Err(e) => ControlMessage::Malformed(e.to_string()),
    }
}

fn is_ping(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    matches!(obj.get(PING_FIELD), Some(Value::Bool(true)))
        || matches!(obj.get(KEEPALIVE_FIELD), Some(Value::String(_)))
}

/// Keepalive sentence sent to the aggregator, newline-terminated.
///
/// Aggregators compare the stripped line against this exact text, so the
/// spacing matters.
pub fn keepalive_line() -> String {
    format!("{{\"{KEEPALIVE_FIELD}\": \"{KEEPALIVE_TOKEN}\"}}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_is_recognized() {
        assert_eq!(decode_control(r#"{"ping": true}"#), ControlMessage::Ping);
        assert_eq!(decode_control(r#"{"ping":true,"seq":4}"#), ControlMessage::Ping);
    }

    #[test]
    fn legacy_keepalive_is_recognized() {
        assert_eq!(decode_control(r#"{"keepalive": "abcdef"}"#), ControlMessage::Ping);
    }

    #[test]
    fn false_or_non_boolean_ping_is_unrecognized() {
        assert!(matches!(
            decode_control(r#"{"ping": false}"#),
            ControlMessage::Unrecognized(_)
        ));
        assert!(matches!(
            decode_control(r#"{"ping": "true"}"#),
            ControlMessage::Unrecognized(_)
        ));
        assert!(matches!(
            decode_control(r#"{"keepalive": 1}"#),
            ControlMessage::Unrecognized(_)
        ));
    }

    #[test]
    fn other_shapes_are_unrecognized() {
        assert!(matches!(
            decode_control(r#"{"foo": 1}"#),
            ControlMessage::Unrecognized(_)
        ));
        assert!(matches!(
            decode_control("[true]"),
            ControlMessage::Unrecognized(_)
        ));
        assert!(matches!(decode_control("true"), ControlMessage::Unrecognized(_)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode_control("{ping"), ControlMessage::Malformed(_)));
        assert!(matches!(decode_control(""), ControlMessage::Malformed(_)));
    }

    #[test]
    fn keepalive_line_is_exact_sentence() {
        let line = keepalive_line();
        assert_eq!(line, "{\"keepalive\": \"abcdef\"}\n");
        assert_eq!(decode_control(line.trim_end()), ControlMessage::Ping);
    }
}
