use std::time::Duration;

/// Rate-limit policy applied per (caller, operation) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// When false the throttle stage admits every call.
    pub enabled: bool,
    /// Calls admitted per window before throttling starts.
    pub max_calls_per_window: u32,
    /// Length of the window in which `max_calls_per_window` calls are allowed.
    pub window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_calls_per_window: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Server-level configuration for the dispatch pipeline.
///
/// Controls operation timeouts, throttling, and background task intervals.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Default timeout applied to operation bodies in milliseconds.
    /// `0` disables the default; contexts may still carry their own timeout.
    pub default_operation_timeout_ms: u64,
    pub throttle: ThrottleConfig,
    /// Interval between sweeps that drop idle throttle buckets, in milliseconds.
    pub throttle_gc_interval_ms: u64,
}

impl ServerConfig {
    /// Default operation timeout, if one is configured.
    #[must_use]
    pub fn default_operation_timeout(&self) -> Option<Duration> {
        (self.default_operation_timeout_ms > 0)
            .then(|| Duration::from_millis(self.default_operation_timeout_ms))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_operation_timeout_ms: 30_000,
            throttle: ThrottleConfig::default(),
            throttle_gc_interval_ms: 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.default_operation_timeout_ms, 30_000);
        assert_eq!(
            config.default_operation_timeout(),
            Some(Duration::from_secs(30))
        );
        assert!(config.throttle.enabled);
        assert_eq!(config.throttle.max_calls_per_window, 30);
        assert_eq!(config.throttle.window, Duration::from_secs(60));
    }

    #[test]
    fn zero_timeout_disables_default() {
        let config = ServerConfig {
            default_operation_timeout_ms: 0,
            ..ServerConfig::default()
        };
        assert!(config.default_operation_timeout().is_none());
    }
}
