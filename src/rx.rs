//! # Byte-level Receive State Machines
//!
//! Responses are consumed one byte at a time as the serial link delivers
//! them. Two machines exist, selected by the request in flight:
//!
//! ```text
//! read:  Address → Function → Length → Data[0..len) → Crc[0..2) → Complete
//! write: Address → Function → Register[0..2) → Value[0..2) | Quantity[0..2) → Crc[0..2) → Complete
//! ```
//!
//! Both recognise exception responses (`function | 0x80`) and go
//! `Function → ExceptionCode → Crc`. The write machine parks unsupported
//! function codes in `WaitTimeout` until the response timer fires.
//!
//! Every byte leaves a provisional classification in [`ModbusFrame::fault`];
//! the final CRC check replaces it when the frame completes.

use tracing::debug;

use crate::constants::{
    EXCEPTION_FLAG, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_REGISTER, RX_DATA_CAPACITY,
};
use crate::crc::Crc16;
use crate::error::ReadFault;
use crate::frame::ModbusFrame;

/// Common interface of the receive machines
pub trait FrameReceiver {
    /// Advance by one received byte
    fn feed(&mut self, byte: u8);

    /// Start over for a new response
    fn reset(&mut self);

    fn is_complete(&self) -> bool;

    /// Whether any byte has been consumed since the last reset
    fn has_started(&self) -> bool;

    fn frame(&self) -> &ModbusFrame;

    /// Result of a completed frame
    fn outcome(&self) -> Result<&ModbusFrame, ReadFault> {
        let frame = self.frame();
        if let Some(fault) = frame.fault {
            return Err(fault);
        }
        if let Some(code) = frame.exception {
            return Err(ReadFault::Exception(code));
        }
        Ok(frame)
    }

    /// Classification when the response timer expires first
    fn timeout_fault(&self) -> ReadFault {
        if !self.has_started() {
            return ReadFault::NoResponse;
        }
        let frame = self.frame();
        match frame.exception {
            Some(code) => ReadFault::Exception(code),
            None => frame.fault.unwrap_or(ReadFault::SerialMalformed),
        }
    }
}

/// Shared frame buffer, CRC and byte counter
#[derive(Debug, Clone, Default)]
struct RxCore {
    frame: ModbusFrame,
    crc: Crc16,
    count: usize,
    started: bool,
}

impl RxCore {
    fn reset(&mut self) {
        self.frame.clear();
        self.crc.reset();
        self.count = 0;
        self.started = false;
    }

    fn take_address(&mut self, byte: u8) {
        self.started = true;
        self.frame.address = byte;
        self.crc.accumulate(byte);
        self.frame.fault = Some(ReadFault::SerialMalformed);
    }

    /// Returns true for an exception response
    fn take_function(&mut self, byte: u8) -> bool {
        self.frame.function = byte;
        self.crc.accumulate(byte);
        self.count = 0;
        byte & EXCEPTION_FLAG != 0
    }

    fn take_exception(&mut self, byte: u8) {
        self.frame.exception = Some(byte);
        self.crc.accumulate(byte);
        self.count = 0;
    }

    /// Returns true once both CRC bytes are in
    fn take_crc(&mut self, byte: u8) -> bool {
        self.frame.crc[self.count] = byte;
        self.count += 1;
        self.frame.fault = Some(ReadFault::SerialMalformed);
        if self.count < 2 {
            return false;
        }
        self.frame.fault = if self.crc.matches(self.frame.crc) {
            None
        } else {
            Some(ReadFault::CrcMismatch)
        };
        debug!(
            "RX frame complete: addr={:02X} fc={:02X} crc={:02X}{:02X} fault={:?}",
            self.frame.address,
            self.frame.function,
            self.frame.crc[0],
            self.frame.crc[1],
            self.frame.fault
        );
        true
    }

    fn trailing(&mut self) {
        self.frame.fault = Some(ReadFault::SerialMalformed);
    }
}

// ============================================================================
// Read responses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Address,
    Function,
    ExceptionCode,
    Length,
    Data,
    Crc,
    Complete,
}

/// Receiver for read-holding-registers responses
#[derive(Debug, Clone)]
pub struct ReadReceiver {
    state: ReadState,
    core: RxCore,
    early_crc: [u8; 2],
}

impl ReadReceiver {
    pub fn new() -> Self {
        Self {
            state: ReadState::Address,
            core: RxCore::default(),
            early_crc: [0; 2],
        }
    }

    #[inline]
    pub fn state(&self) -> ReadState {
        self.state
    }

    fn expected_len(&self) -> usize {
        (self.core.frame.byte_len as usize).min(RX_DATA_CAPACITY)
    }
}

impl Default for ReadReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver for ReadReceiver {
    fn feed(&mut self, byte: u8) {
        match self.state {
            ReadState::Address => {
                self.core.take_address(byte);
                self.state = ReadState::Function;
            }
            ReadState::Function => {
                self.state = if self.core.take_function(byte) {
                    ReadState::ExceptionCode
                } else {
                    ReadState::Length
                };
            }
            ReadState::ExceptionCode => {
                self.core.take_exception(byte);
                self.state = ReadState::Crc;
            }
            ReadState::Length => {
                self.core.frame.byte_len = byte;
                self.core.crc.accumulate(byte);
                self.early_crc = self.core.crc.finish();
                self.core.count = 0;
                self.state = if byte == 0 {
                    ReadState::Crc
                } else {
                    ReadState::Data
                };
            }
            ReadState::Data => {
                let core = &mut self.core;
                core.frame.data[core.count] = byte;
                core.count += 1;
                core.frame.data_len = core.count;
                core.crc.accumulate(byte);
                core.frame.fault = Some(ReadFault::SerialMalformed);

                // Vestigial early check: compares the first two payload bytes
                // with the CRC snapshot from the length byte. Only a
                // prematurely terminated frame can pass it, and the trailing
                // CRC check always overrides the result.
                if core.count == 2 {
                    core.frame.fault = if self.early_crc == [core.frame.data[0], core.frame.data[1]]
                    {
                        None
                    } else {
                        Some(ReadFault::CrcMismatch)
                    };
                }

                if self.core.count >= self.expected_len() {
                    self.core.count = 0;
                    self.state = ReadState::Crc;
                }
            }
            ReadState::Crc => {
                if self.core.take_crc(byte) {
                    self.state = ReadState::Complete;
                }
            }
            ReadState::Complete => self.core.trailing(),
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        self.early_crc = [0; 2];
        self.state = ReadState::Address;
    }

    #[inline]
    fn is_complete(&self) -> bool {
        self.state == ReadState::Complete
    }

    #[inline]
    fn has_started(&self) -> bool {
        self.core.started
    }

    #[inline]
    fn frame(&self) -> &ModbusFrame {
        &self.core.frame
    }
}

// ============================================================================
// Write responses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Address,
    Function,
    ExceptionCode,
    RegisterAddress,
    Value,
    Quantity,
    Crc,
    Complete,
    /// Unsupported function code; bytes are ignored until the timer fires
    WaitTimeout,
}

/// Receiver for FC06/FC16 write responses
#[derive(Debug, Clone)]
pub struct WriteReceiver {
    state: WriteState,
    core: RxCore,
}

impl WriteReceiver {
    pub fn new() -> Self {
        Self {
            state: WriteState::Address,
            core: RxCore::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> WriteState {
        self.state
    }

    /// Same vestigial early check as the read machine, run on the first
    /// value/quantity byte against the last register byte.
    fn early_check(&mut self, byte: u8) {
        let frame = &mut self.core.frame;
        frame.fault = if self.core.crc.finish() == [frame.register[1], byte] {
            None
        } else {
            Some(ReadFault::CrcMismatch)
        };
    }
}

impl Default for WriteReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver for WriteReceiver {
    fn feed(&mut self, byte: u8) {
        match self.state {
            WriteState::Address => {
                self.core.take_address(byte);
                self.state = WriteState::Function;
            }
            WriteState::Function => {
                self.state = if self.core.take_function(byte) {
                    WriteState::ExceptionCode
                } else {
                    WriteState::RegisterAddress
                };
            }
            WriteState::ExceptionCode => {
                self.core.take_exception(byte);
                self.state = WriteState::Crc;
            }
            WriteState::RegisterAddress => {
                let core = &mut self.core;
                core.frame.register[core.count] = byte;
                core.count += 1;
                core.crc.accumulate(byte);
                if core.count == 2 {
                    core.count = 0;
                    self.state = match core.frame.function {
                        FC_WRITE_SINGLE_REGISTER => WriteState::Value,
                        FC_WRITE_MULTIPLE_REGISTERS => WriteState::Quantity,
                        other => {
                            debug!("RX write response with unsupported FC={:02X}", other);
                            WriteState::WaitTimeout
                        }
                    };
                }
            }
            WriteState::Value | WriteState::Quantity => {
                let core = &mut self.core;
                if self.state == WriteState::Value {
                    core.frame.data[core.count] = byte;
                    core.frame.data_len = core.count + 1;
                } else {
                    core.frame.quantity[core.count] = byte;
                }
                core.count += 1;
                core.crc.accumulate(byte);
                if core.count == 1 {
                    self.early_check(byte);
                } else {
                    self.core.count = 0;
                    self.state = WriteState::Crc;
                }
            }
            WriteState::Crc => {
                if self.core.take_crc(byte) {
                    self.state = WriteState::Complete;
                }
            }
            WriteState::Complete => self.core.trailing(),
            WriteState::WaitTimeout => {}
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        self.state = WriteState::Address;
    }

    #[inline]
    fn is_complete(&self) -> bool {
        self.state == WriteState::Complete
    }

    #[inline]
    fn has_started(&self) -> bool {
        self.core.started
    }

    #[inline]
    fn frame(&self) -> &ModbusFrame {
        &self.core.frame
    }
}

// ============================================================================
// Tests
// ============================================================================
