//! # Error Types
//!
//! Two layers of failure exist in the gateway:
//!
//! - [`GatewayError`]: operational errors returned through [`GatewayResult`]
//!   (bad input, full queues, storage and transport failures).
//! - [`ReadFault`]: per-reading classification recorded by the Modbus master
//!   for one catalogue entry. These are never fatal; they surface as
//!   `Error(<code>)` in the report slot of the failed entry.

use std::fmt;

use thiserror::Error;

use crate::constants::{
    CRC_MISMATCH_CODE, EXCEPTION_GATEWAY_TARGET_FAILED, NO_RESPONSE_CODE, SERIAL_MALFORMED_CODE,
};

/// Result alias used throughout the crate
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Input that could not be parsed or decoded
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Wire-level protocol violation
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Configuration value out of range
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serial or WebSocket transport failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Settings store failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Bounded message queue is full
    #[error("Queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// A Modbus write is already in flight
    #[error("Write already pending")]
    WriteBusy,

    /// Credentials matched no account
    #[error("Bad login")]
    BadLogin,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the error is worth retrying later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::QueueFull { .. } | Self::WriteBusy | Self::Io(_)
        )
    }
}

// ============================================================================
// Per-reading faults
// ============================================================================

/// Failure classification of one Modbus request/response cycle.
///
/// | Fault | Code |
/// |-------|------|
/// | `SerialMalformed` | 1 |
/// | `CrcMismatch` | 2 |
/// | `NoResponse` | 3 |
/// | `Exception(n)` | n |
///
/// Exception codes share the numeric space with the link faults, so
/// `Exception(1)` and `SerialMalformed` both render as `Error(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadFault {
    /// Bytes arrived but never formed a complete frame
    SerialMalformed,
    /// Frame completed with a CRC that does not match its contents
    CrcMismatch,
    /// Nothing arrived before the response timeout
    NoResponse,
    /// Slave answered with a Modbus exception
    Exception(u8),
}

impl ReadFault {
    /// Numeric code reported to clients
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Self::SerialMalformed => SERIAL_MALFORMED_CODE,
            Self::CrcMismatch => CRC_MISMATCH_CODE,
            Self::NoResponse => NO_RESPONSE_CODE,
            Self::Exception(code) => code,
        }
    }

    /// Whether the same request should be issued again.
    ///
    /// Only silence from the target is retried: either nothing arrived at
    /// all, or a gateway in the path reported that the target did not answer.
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::NoResponse | Self::Exception(EXCEPTION_GATEWAY_TARGET_FAILED)
        )
    }
}

impl fmt::Display for ReadFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error({})", self.code())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_codes() {
        assert_eq!(ReadFault::SerialMalformed.code(), 1);
        assert_eq!(ReadFault::CrcMismatch.code(), 2);
        assert_eq!(ReadFault::NoResponse.code(), 3);
        assert_eq!(ReadFault::Exception(0x02).code(), 2);
    }

    #[test]
    fn test_fault_display() {
        assert_eq!(ReadFault::NoResponse.to_string(), "Error(3)");
        assert_eq!(ReadFault::Exception(11).to_string(), "Error(11)");
    }

    #[test]
    fn test_retryable_faults() {
        assert!(ReadFault::NoResponse.is_retryable());
        assert!(ReadFault::Exception(0x0B).is_retryable());
        assert!(!ReadFault::Exception(0x02).is_retryable());
        assert!(!ReadFault::CrcMismatch.is_retryable());
        assert!(!ReadFault::SerialMalformed.is_retryable());
    }

    #[test]
    fn test_error_helpers() {
        let err = GatewayError::invalid_data("bad hex token");
        assert_eq!(err.to_string(), "Invalid data: bad hex token");
        assert!(!err.is_transient());

        let err = GatewayError::QueueFull { capacity: 18 };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Queue full (18 messages)");
    }
}
