//! # Gateway Configuration
//!
//! Runtime tunables for the Modbus master and the session engine.
//!
//! ## Timing model
//!
//! All waits are timestamp deltas evaluated on each scheduler tick, so every
//! duration here is in milliseconds against the monotonic [`Clock`](crate::clock::Clock).
//!
//! - **Serial**: UART init delay before a request, response timeout measured
//!   from the last received byte, attempts per catalogue entry
//! - **Sessions**: idle window, heartbeat period, minimum send interval
//! - **Restart**: reset command delay, Ethernet link-down grace
//!
//! A partial JSON file only overrides the fields it names; everything else
//! keeps its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CHAR_DELAY_MS, DEFAULT_FRAME_DELAY_MS, DEFAULT_HEARTBEAT_PERIOD_MS,
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_LINK_DOWN_GRACE_MS, DEFAULT_MAX_READ_ATTEMPTS,
    DEFAULT_MAX_SESSIONS, DEFAULT_READ_INTERVAL_MS, DEFAULT_REPORT_CAPACITY,
    DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_RESTART_DELAY_MS, DEFAULT_SEND_INTERVAL_MS,
    DEFAULT_SIMULTANEOUS_ADMINS, DEFAULT_UART_INIT_DELAY_MS, MIN_REPORT_CAPACITY,
};
use crate::error::{GatewayError, GatewayResult};

/// Gateway tunables.
///
/// # Example
///
/// ```rust
/// use fpm_gateway::GatewayConfig;
///
/// let config = GatewayConfig::new()
///     .with_response_timeout_ms(300)
///     .with_max_sessions(4);
///
/// assert_eq!(config.response_timeout_ms, 300);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Serial line speed.
    pub baud_rate: u32,
    /// Gap enforced before each transmitted byte.
    pub char_delay_ms: u64,
    /// Gap enforced before each transmitted frame.
    pub frame_delay_ms: u64,
    /// Settle time between opening the link and sending.
    pub uart_init_delay_ms: u64,
    /// Silence after the last received byte that ends a response.
    pub response_timeout_ms: u64,
    /// Attempts per catalogue entry, first try included.
    pub max_read_attempts: u8,
    /// Pause between electrical sweeps.
    pub read_interval_ms: u64,
    /// Session table capacity.
    pub max_sessions: usize,
    /// Live administrators allowed before supervisor logins are refused.
    pub simultaneous_admins: usize,
    /// Reclaim a session after this long without traffic in either direction.
    pub idle_timeout_ms: u64,
    pub heartbeat_period_ms: u64,
    /// Minimum gap between two outbound sends.
    pub send_interval_ms: u64,
    pub restart_delay_ms: u64,
    pub link_down_grace_ms: u64,
    /// Upper bound for a rendered report.
    pub report_capacity: usize,
}

impl GatewayConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_uart_init_delay_ms(mut self, delay_ms: u64) -> Self {
        self.uart_init_delay_ms = delay_ms;
        self
    }

    pub fn with_response_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.response_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_read_attempts(mut self, attempts: u8) -> Self {
        self.max_read_attempts = attempts;
        self
    }

    pub fn with_read_interval_ms(mut self, interval_ms: u64) -> Self {
        self.read_interval_ms = interval_ms;
        self
    }

    pub fn with_max_sessions(mut self, sessions: usize) -> Self {
        self.max_sessions = sessions;
        self
    }

    pub fn with_simultaneous_admins(mut self, admins: usize) -> Self {
        self.simultaneous_admins = admins;
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_send_interval_ms(mut self, interval_ms: u64) -> Self {
        self.send_interval_ms = interval_ms;
        self
    }

    pub fn with_report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self
    }

    pub fn with_heartbeat_period_ms(mut self, period_ms: u64) -> Self {
        self.heartbeat_period_ms = period_ms;
        self
    }

    pub fn with_link_down_grace_ms(mut self, grace_ms: u64) -> Self {
        self.link_down_grace_ms = grace_ms;
        self
    }

    /// Reject values the engines cannot work with.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.baud_rate == 0 {
            return Err(GatewayError::configuration("baud_rate must be nonzero"));
        }
        if self.max_read_attempts == 0 {
            return Err(GatewayError::configuration(
                "max_read_attempts must be at least 1",
            ));
        }
        if self.max_sessions == 0 {
            return Err(GatewayError::configuration(
                "max_sessions must be at least 1",
            ));
        }
        if self.response_timeout_ms == 0 || self.idle_timeout_ms == 0 {
            return Err(GatewayError::configuration("timeouts must be nonzero"));
        }
        if self.report_capacity < MIN_REPORT_CAPACITY {
            return Err(GatewayError::configuration(format!(
                "report_capacity must be at least {} bytes",
                MIN_REPORT_CAPACITY
            )));
        }
        Ok(())
    }

    /// Both directions silent for longer than the idle window.
    #[inline]
    pub fn is_idle(&self, since_inbound_ms: u64, since_outbound_ms: u64) -> bool {
        since_inbound_ms > self.idle_timeout_ms && since_outbound_ms > self.idle_timeout_ms
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            char_delay_ms: DEFAULT_CHAR_DELAY_MS,
            frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            uart_init_delay_ms: DEFAULT_UART_INIT_DELAY_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            max_read_attempts: DEFAULT_MAX_READ_ATTEMPTS,
            read_interval_ms: DEFAULT_READ_INTERVAL_MS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            simultaneous_admins: DEFAULT_SIMULTANEOUS_ADMINS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            heartbeat_period_ms: DEFAULT_HEARTBEAT_PERIOD_MS,
            send_interval_ms: DEFAULT_SEND_INTERVAL_MS,
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
            link_down_grace_ms: DEFAULT_LINK_DOWN_GRACE_MS,
            report_capacity: DEFAULT_REPORT_CAPACITY,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.response_timeout_ms, 150);
        assert_eq!(config.max_read_attempts, 5);
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.idle_timeout_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = GatewayConfig::new()
            .with_max_sessions(5)
            .with_send_interval_ms(50)
            .with_max_read_attempts(2);

        assert_eq!(config.max_sessions, 5);
        assert_eq!(config.send_interval_ms, 50);
        assert_eq!(config.max_read_attempts, 2);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(GatewayConfig::new().with_max_sessions(0).validate().is_err());
        assert!(GatewayConfig::new()
            .with_max_read_attempts(0)
            .validate()
            .is_err());
        assert!(GatewayConfig::new().with_baud_rate(0).validate().is_err());
    }

    #[test]
    fn test_validate_report_capacity_floor() {
        assert!(GatewayConfig::new().with_report_capacity(10).validate().is_err());
        assert!(GatewayConfig::new()
            .with_report_capacity(MIN_REPORT_CAPACITY)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"response_timeout_ms": 400, "max_sessions": 2}"#).unwrap();
        assert_eq!(config.response_timeout_ms, 400);
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.heartbeat_period_ms, DEFAULT_HEARTBEAT_PERIOD_MS);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        std::fs::write(&path, r#"{"idle_timeout_ms": 8000}"#).unwrap();

        let config = GatewayConfig::from_json_file(&path).unwrap();
        assert_eq!(config.idle_timeout_ms, 8000);

        std::fs::write(&path, r#"{"max_sessions": 0}"#).unwrap();
        assert!(GatewayConfig::from_json_file(&path).is_err());
    }

    #[test]
    fn test_is_idle_needs_both_directions() {
        let config = GatewayConfig::default();
        assert!(config.is_idle(5001, 5001));
        assert!(!config.is_idle(5001, 100));
        assert!(!config.is_idle(100, 5001));
        assert!(!config.is_idle(5000, 5000));
    }
}
