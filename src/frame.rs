//! RTU frame assembly and the receive buffer
//!
//! [`FrameEncoder`] builds outgoing frames on a fixed stack array and folds
//! every emitted byte into the running CRC. [`ModbusFrame`] is the transient
//! buffer the receive state machines fill, reset at the start of every
//! request/response cycle.

use tracing::debug;

use crate::constants::{
    EXCEPTION_ACKNOWLEDGE, EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    EXCEPTION_GATEWAY_TARGET_FAILED, EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE,
    EXCEPTION_ILLEGAL_FUNCTION, EXCEPTION_MEMORY_PARITY_ERROR, EXCEPTION_SLAVE_DEVICE_BUSY,
    EXCEPTION_SLAVE_DEVICE_FAILURE, FC_READ_HOLDING_REGISTERS, MAX_ADU_SIZE,
    MAX_WRITE_COMMAND_BYTES, RX_DATA_CAPACITY,
};
use crate::crc::Crc16;
use crate::error::{GatewayError, GatewayResult, ReadFault};

// ============================================================================
// Outgoing frames
// ============================================================================

/// Outgoing RTU frame with a running CRC
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    data: [u8; MAX_ADU_SIZE],
    len: usize,
    crc: Crc16,
    sealed: bool,
}

impl FrameEncoder {
    /// Create an empty frame
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_ADU_SIZE],
            len: 0,
            crc: Crc16::new(),
            sealed: false,
        }
    }

    /// Drop all bytes and reseed the CRC
    #[inline]
    pub fn reset(&mut self) {
        self.len = 0;
        self.crc.reset();
        self.sealed = false;
    }

    /// Append one byte and accumulate its CRC
    #[inline]
    pub fn emit(&mut self, byte: u8) -> GatewayResult<()> {
        if self.sealed {
            return Err(GatewayError::protocol("frame already carries its CRC"));
        }
        // Two bytes stay reserved for the CRC
        if self.len + 2 >= MAX_ADU_SIZE {
            return Err(GatewayError::protocol("frame buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        self.crc.accumulate(byte);
        Ok(())
    }

    /// Append u16 in big-endian
    #[inline]
    pub fn emit_u16(&mut self, value: u16) -> GatewayResult<()> {
        let [hi, lo] = value.to_be_bytes();
        self.emit(hi)?;
        self.emit(lo)
    }

    /// Append a byte slice
    pub fn extend(&mut self, bytes: &[u8]) -> GatewayResult<()> {
        if self.len + bytes.len() + 2 > MAX_ADU_SIZE {
            return Err(GatewayError::protocol(format!(
                "frame would exceed max size: {} + {} > {}",
                self.len,
                bytes.len(),
                MAX_ADU_SIZE - 2
            )));
        }
        for &byte in bytes {
            self.emit(byte)?;
        }
        Ok(())
    }

    /// Append the CRC and seal the frame. Returns the CRC bytes in wire order.
    pub fn finish(&mut self) -> GatewayResult<[u8; 2]> {
        if self.sealed {
            return Err(GatewayError::protocol("frame already carries its CRC"));
        }
        let crc = self.crc.finish();
        self.data[self.len..self.len + 2].copy_from_slice(&crc);
        self.len += 2;
        self.sealed = true;
        Ok(crc)
    }

    /// Read-holding-registers request, sealed
    pub fn read_holding_registers(slave: u8, register: u16, quantity: u16) -> GatewayResult<Self> {
        let mut frame = Self::new();
        frame.emit(slave)?;
        frame.emit(FC_READ_HOLDING_REGISTERS)?;
        frame.emit_u16(register)?;
        frame.emit_u16(quantity)?;
        frame.finish()?;
        Ok(frame)
    }

    /// Raw command bytes from a client with the CRC appended
    pub fn raw_command(bytes: &[u8]) -> GatewayResult<Self> {
        if bytes.is_empty() || bytes.len() > MAX_WRITE_COMMAND_BYTES {
            return Err(GatewayError::invalid_data(format!(
                "write command must carry 1..={} bytes, got {}",
                MAX_WRITE_COMMAND_BYTES,
                bytes.len()
            )));
        }
        let mut frame = Self::new();
        frame.extend(bytes)?;
        frame.finish()?;
        Ok(frame)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a write command of space-separated hex byte tokens, e.g. `"01 06 40 10 00 01"`.
pub fn parse_hex_command(text: &str) -> GatewayResult<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        let byte = u8::from_str_radix(token, 16)
            .map_err(|_| GatewayError::invalid_data(format!("bad hex token '{token}'")))?;
        bytes.push(byte);
    }
    if bytes.is_empty() {
        return Err(GatewayError::invalid_data("empty write command"));
    }
    if bytes.len() > MAX_WRITE_COMMAND_BYTES {
        return Err(GatewayError::invalid_data(format!(
            "write command too long: {} bytes (max {})",
            bytes.len(),
            MAX_WRITE_COMMAND_BYTES
        )));
    }
    debug!("Parsed write command: {} bytes", bytes.len());
    Ok(bytes)
}

/// Get human-readable exception description
pub fn exception_description(code: u8) -> &'static str {
    match code {
        EXCEPTION_ILLEGAL_FUNCTION => "Illegal Function",
        EXCEPTION_ILLEGAL_DATA_ADDRESS => "Illegal Data Address",
        EXCEPTION_ILLEGAL_DATA_VALUE => "Illegal Data Value",
        EXCEPTION_SLAVE_DEVICE_FAILURE => "Slave Device Failure",
        EXCEPTION_ACKNOWLEDGE => "Acknowledge",
        EXCEPTION_SLAVE_DEVICE_BUSY => "Slave Device Busy",
        EXCEPTION_MEMORY_PARITY_ERROR => "Memory Parity Error",
        EXCEPTION_GATEWAY_PATH_UNAVAILABLE => "Gateway Path Unavailable",
        EXCEPTION_GATEWAY_TARGET_FAILED => "Gateway Target Failed To Respond",
        _ => "Unknown Exception",
    }
}

// ============================================================================
// Receive buffer
// ============================================================================

/// Transient response buffer filled by the receive state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusFrame {
    pub address: u8,
    pub function: u8,
    /// Byte count announced by a read response
    pub byte_len: u8,
    pub register: [u8; 2],
    pub quantity: [u8; 2],
    pub data: [u8; RX_DATA_CAPACITY],
    /// Payload bytes actually stored
    pub data_len: usize,
    pub crc: [u8; 2],
    /// Exception code of an exception response
    pub exception: Option<u8>,
    /// Link classification accumulated while receiving
    pub fault: Option<ReadFault>,
}

impl ModbusFrame {
    pub const fn new() -> Self {
        Self {
            address: 0,
            function: 0,
            byte_len: 0,
            register: [0; 2],
            quantity: [0; 2],
            data: [0; RX_DATA_CAPACITY],
            data_len: 0,
            crc: [0; 2],
            exception: None,
            fault: None,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Stored payload
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.data_len]
    }

    /// Register address echoed by a write response
    #[inline]
    pub fn register_address(&self) -> u16 {
        u16::from_be_bytes(self.register)
    }

    /// Quantity echoed by a write-multiple response
    #[inline]
    pub fn quantity_value(&self) -> u16 {
        u16::from_be_bytes(self.quantity)
    }

}

impl Default for ModbusFrame {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::READ_REQUEST_LEN;

    #[test]
    fn test_read_request_layout() {
        let frame = FrameEncoder::read_holding_registers(1, 0x4000, 2).unwrap();
        assert_eq!(
            frame.as_slice(),
            &[0x01, 0x03, 0x40, 0x00, 0x00, 0x02, 0xD1, 0xCB]
        );
        assert_eq!(frame.len(), READ_REQUEST_LEN);
        assert!(frame.is_sealed());
    }

    #[test]
    fn test_emit_after_finish_rejected() {
        let mut frame = FrameEncoder::new();
        frame.emit(0x01).unwrap();
        frame.finish().unwrap();
        assert!(frame.emit(0x02).is_err());
        assert!(frame.finish().is_err());

        frame.reset();
        assert!(frame.is_empty());
        assert!(frame.emit(0x02).is_ok());
    }

    #[test]
    fn test_raw_command_appends_crc() {
        let command = [0x01, 0x06, 0x40, 0x10, 0x00, 0x01];
        let frame = FrameEncoder::raw_command(&command).unwrap();
        assert_eq!(frame.len(), command.len() + 2);
        assert_eq!(&frame.as_slice()[..6], &command);
        assert_eq!(&frame.as_slice()[6..], &Crc16::checksum(&command));
    }

    #[test]
    fn test_raw_command_limits() {
        assert!(FrameEncoder::raw_command(&[]).is_err());
        assert!(FrameEncoder::raw_command(&[0u8; MAX_WRITE_COMMAND_BYTES]).is_ok());
        assert!(FrameEncoder::raw_command(&[0u8; MAX_WRITE_COMMAND_BYTES + 1]).is_err());
    }

    #[test]
    fn test_extend_overflow() {
        let mut frame = FrameEncoder::new();
        assert!(frame.extend(&[0u8; MAX_ADU_SIZE]).is_err());
        assert!(frame.is_empty());
        assert!(frame.extend(&[0u8; MAX_ADU_SIZE - 2]).is_ok());
    }

    #[test]
    fn test_parse_hex_command() {
        let bytes = parse_hex_command("01 06 40 10 00 1f").unwrap();
        assert_eq!(bytes, vec![0x01, 0x06, 0x40, 0x10, 0x00, 0x1F]);

        let bytes = parse_hex_command("  1 10  ").unwrap();
        assert_eq!(bytes, vec![0x01, 0x10]);
    }

    #[test]
    fn test_parse_hex_command_rejects_garbage() {
        assert!(parse_hex_command("").is_err());
        assert!(parse_hex_command("01 zz").is_err());
        assert!(parse_hex_command("100").is_err());
        let long = vec!["00"; MAX_WRITE_COMMAND_BYTES + 1].join(" ");
        assert!(parse_hex_command(&long).is_err());
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exception_description(0x0B), "Gateway Target Failed To Respond");
    }

    #[test]
    fn test_frame_accessors() {
        let mut frame = ModbusFrame::new();
        frame.register = [0x40, 0x10];
        frame.quantity = [0x00, 0x02];
        frame.function = 0x90;
        frame.data[..2].copy_from_slice(&[0xAB, 0xCD]);
        frame.data_len = 2;

        assert_eq!(frame.register_address(), 0x4010);
        assert_eq!(frame.quantity_value(), 2);
        assert_eq!(frame.payload(), &[0xAB, 0xCD]);

        frame.clear();
        assert_eq!(frame, ModbusFrame::default());
    }
}
