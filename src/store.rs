//! # Meter Values
//!
//! Decoded readings, one slot per catalogue position.
//!
//! Payloads arrive in big-endian register order. The value type declared by
//! the descriptor selects the decode path:
//!
//! | Type | Bytes | Decoded as |
//! |------|-------|------------|
//! | U16 / Hex16 / Bin16 | 2 | `U16` |
//! | Hex32 / Bin32 | 4 | `U32` |
//! | U32 | 4 | `I32` (the meter reports these signed) |
//! | Float | 4 | `F32` |
//! | Ascii | 2 | `Ascii` (low byte) |

use std::fmt;

use crate::catalogue::ValueType;
use crate::error::{GatewayError, GatewayResult, ReadFault};

/// One decoded meter value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterValue {
    U16(u16),
    U32(u32),
    I32(i32),
    F32(f32),
    Ascii(u8),
}

impl MeterValue {
    /// Decode a response payload per the declared value type.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fpm_gateway::{MeterValue, ValueType};
    ///
    /// let value = MeterValue::decode(ValueType::Float, &[0x3F, 0x80, 0x00, 0x00]).unwrap();
    /// assert_eq!(value, MeterValue::F32(1.0));
    /// ```
    pub fn decode(value_type: ValueType, payload: &[u8]) -> GatewayResult<Self> {
        let needed = value_type.byte_size();
        if payload.len() < needed {
            return Err(GatewayError::invalid_data(format!(
                "{:?} needs {} payload bytes, got {}",
                value_type,
                needed,
                payload.len()
            )));
        }
        let word = [payload[0], payload[1]];
        let value = match value_type {
            ValueType::U16 | ValueType::Hex16 | ValueType::Bin16 => {
                Self::U16(u16::from_be_bytes(word))
            }
            ValueType::Ascii => Self::Ascii(payload[1]),
            ValueType::Hex32 | ValueType::Bin32 => Self::U32(u32::from_be_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ])),
            ValueType::U32 => Self::I32(i32::from_be_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ])),
            ValueType::Float => Self::F32(f32::from_be_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ])),
        };
        Ok(value)
    }

    /// First and second register of a two-register value
    #[inline]
    pub fn register_pair(&self) -> Option<(u16, u16)> {
        match self {
            Self::U32(v) => Some(((v >> 16) as u16, (v & 0xFFFF) as u16)),
            Self::I32(v) => {
                let raw = *v as u32;
                Some(((raw >> 16) as u16, (raw & 0xFFFF) as u16))
            }
            _ => None,
        }
    }

}

impl fmt::Display for MeterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U16(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{:.3}", v),
            Self::Ascii(0) => Ok(()),
            Self::Ascii(v) => write!(f, "{}", *v as char),
        }
    }
}

// ============================================================================
// Value store
// ============================================================================

/// State of one catalogue position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    /// Last decoded value; kept when a later read fails
    pub value: Option<MeterValue>,
    /// Outcome of the current sweep
    pub ok: bool,
    pub fault: Option<ReadFault>,
    /// Attempts in the current sweep
    pub attempts: u8,
}

/// Readings indexed by catalogue position
#[derive(Debug, Clone)]
pub struct ValueStore {
    readings: Vec<Reading>,
}

impl ValueStore {
    pub fn new(len: usize) -> Self {
        Self {
            readings: vec![Reading::default(); len],
        }
    }

    /// Clear per-sweep outcome and attempt counters; values are kept.
    pub fn reset_cycle(&mut self) {
        for reading in &mut self.readings {
            reading.ok = false;
            reading.fault = None;
            reading.attempts = 0;
        }
    }

    /// Count one more attempt at `index`; returns the new total
    pub fn begin_attempt(&mut self, index: usize) -> u8 {
        match self.readings.get_mut(index) {
            Some(reading) => {
                reading.attempts = reading.attempts.saturating_add(1);
                reading.attempts
            }
            None => 0,
        }
    }

    pub fn record_success(&mut self, index: usize, value: MeterValue) {
        if let Some(reading) = self.readings.get_mut(index) {
            reading.value = Some(value);
            reading.ok = true;
            reading.fault = None;
        }
    }

    pub fn record_failure(&mut self, index: usize, fault: ReadFault) {
        if let Some(reading) = self.readings.get_mut(index) {
            reading.ok = false;
            reading.fault = Some(fault);
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Reading> {
        self.readings.get(index)
    }

    /// Value at `index` if the current sweep read it successfully
    #[inline]
    pub fn current(&self, index: usize) -> Option<MeterValue> {
        self.readings
            .get(index)
            .filter(|reading| reading.ok)
            .and_then(|reading| reading.value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
