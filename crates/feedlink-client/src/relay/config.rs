//! Relay client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use feedlink_core::config::{OverflowPolicy, RelaySettings, StallPolicy};

use super::error::ConfigError;
use super::types::Role;

/// A TCP endpoint as configured (host names are resolved on every connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Runtime configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Even if the process starts, should the relay run?
    pub enabled: bool,

    /// Source identity stamped on every envelope.
    pub src_name: Arc<str>,

    /// Decoder feed.
    pub upstream: Endpoint,

    /// Aggregation service.
    pub downstream: Endpoint,

    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,

    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,

    /// Watchdog period.
    pub watchdog_tick: Duration,

    /// Upstream liveness timeout (expected feed cadence).
    pub upstream_timeout: Duration,

    /// Downstream liveness timeout (ping cadence times a margin).
    pub downstream_timeout: Duration,

    /// Interval between outbound pings to the aggregator.
    pub keepalive_interval: Duration,

    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub stall_policy: StallPolicy,
}

/// Fixed-delay reconnection policy.
///
/// Every attempt waits the same delay; there is no backoff growth and no
/// attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before every reconnect attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl ReconnectPolicy {
    pub const fn fixed(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RelayConfig {
    /// Create a relay config with required fields and defaults.
    pub fn new(src_name: &str, upstream: Endpoint, downstream: Endpoint) -> Self {
        let keepalive_interval = Duration::from_secs(30);
        Self {
            enabled: true,
            src_name: Arc::from(src_name),
            upstream,
            downstream,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            watchdog_tick: Duration::from_secs(1),
            upstream_timeout: Duration::from_secs(30),
            downstream_timeout: keepalive_interval * 2,
            keepalive_interval,
            queue_capacity: 1024,
            overflow_policy: OverflowPolicy::default(),
            stall_policy: StallPolicy::default(),
        }
    }

    /// Build and validate a runtime config from file/CLI settings.
    pub fn from_settings(settings: &RelaySettings) -> Result<Self, ConfigError> {
        let keepalive_interval = Duration::from_millis(settings.keepalive_interval_ms);
        let downstream_timeout = settings
            .downstream_timeout_ms
            .map_or(keepalive_interval * 2, Duration::from_millis);

        let config = Self {
            enabled: settings.enabled,
            src_name: Arc::from(settings.src_name.as_str()),
            upstream: Endpoint::new(&settings.upstream_host, settings.upstream_port),
            downstream: Endpoint::new(&settings.downstream_host, settings.downstream_port),
            reconnect: ReconnectPolicy::fixed(Duration::from_millis(settings.connect_delay_ms)),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            watchdog_tick: Duration::from_millis(settings.watchdog_tick_ms),
            upstream_timeout: Duration::from_millis(settings.upstream_timeout_ms),
            downstream_timeout,
            keepalive_interval,
            queue_capacity: settings.queue_capacity,
            overflow_policy: settings.overflow_policy,
            stall_policy: settings.stall_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.src_name.is_empty() {
            return Err(ConfigError::Empty { field: "src_name" });
        }
        if self.upstream.host.is_empty() {
            return Err(ConfigError::Empty {
                field: "upstream_host",
            });
        }
        if self.downstream.host.is_empty() {
            return Err(ConfigError::Empty {
                field: "downstream_host",
            });
        }

        let non_zero = [
            ("upstream_port", u64::from(self.upstream.port)),
            ("downstream_port", u64::from(self.downstream.port)),
            ("queue_capacity", self.queue_capacity as u64),
        ];
        let durations = [
            ("connect_timeout", self.connect_timeout),
            ("watchdog_tick", self.watchdog_tick),
            ("upstream_timeout", self.upstream_timeout),
            ("downstream_timeout", self.downstream_timeout),
            ("keepalive_interval", self.keepalive_interval),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero { field: *field });
        }
        if let Some((field, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Zero { field: *field });
        }
        Ok(())
    }

    pub const fn endpoint(&self, role: Role) -> &Endpoint {
        match role {
            Role::Upstream => &self.upstream,
            Role::Downstream => &self.downstream,
        }
    }

    /// Liveness timeout the watchdog applies to sessions of `role`.
    pub const fn timeout_for(&self, role: Role) -> Duration {
        match role {
            Role::Upstream => self.upstream_timeout,
            Role::Downstream => self.downstream_timeout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn connect_delay_setting_becomes_fixed_delay() {
        let settings = RelaySettings {
            connect_delay_ms: 250,
            ..RelaySettings::default()
        };
        let config = RelayConfig::from_settings(&settings).unwrap();
        assert_eq!(config.reconnect, ReconnectPolicy::fixed(Duration::from_millis(250)));
    }

    #[test]
    fn relay_config_new() {
        let config = RelayConfig::new(
            "tallear",
            Endpoint::new("127.0.0.1", 30002),
            Endpoint::new("collector.example.com", 9999),
        );

        assert_eq!(&*config.src_name, "tallear");
        assert_eq!(config.downstream.to_string(), "collector.example.com:9999");
        assert_eq!(config.downstream_timeout, 2 * config.keepalive_interval);
        assert_eq!(config.timeout_for(Role::Upstream), config.upstream_timeout);
        assert_eq!(config.endpoint(Role::Upstream).port, 30002);
        config.validate().unwrap();
    }

    #[test]
    fn from_settings_derives_downstream_timeout() {
        let settings = RelaySettings {
            keepalive_interval_ms: 10_000,
            ..RelaySettings::default()
        };
        let config = RelayConfig::from_settings(&settings).unwrap();
        assert_eq!(config.downstream_timeout, Duration::from_secs(20));
        assert_eq!(config.reconnect.delay, Duration::from_secs(5));

        let settings = RelaySettings {
            downstream_timeout_ms: Some(7_500),
            ..RelaySettings::default()
        };
        let config = RelayConfig::from_settings(&settings).unwrap();
        assert_eq!(config.downstream_timeout, Duration::from_millis(7_500));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let settings = RelaySettings {
            queue_capacity: 0,
            ..RelaySettings::default()
        };
        let err = RelayConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Zero {
                field: "queue_capacity"
            }
        ));
    }

    #[test]
    fn zero_tick_and_empty_name_are_rejected() {
        let settings = RelaySettings {
            watchdog_tick_ms: 0,
            ..RelaySettings::default()
        };
        assert!(RelayConfig::from_settings(&settings).is_err());

        let settings = RelaySettings {
            src_name: String::new(),
            ..RelaySettings::default()
        };
        assert!(matches!(
            RelayConfig::from_settings(&settings).unwrap_err(),
            ConfigError::Empty { field: "src_name" }
        ));
    }
}
