//! Gateway protocol constants
//!
//! Modbus values are taken from the Modbus application protocol specification;
//! timing defaults follow the RTU character times at 115200 baud. Session and
//! queue capacities are compile-time because the ring buffers are
//! stack-allocated.

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Holding Registers
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Single Register
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Registers
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Bit set in the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;
pub const EXCEPTION_SLAVE_DEVICE_FAILURE: u8 = 0x04;
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;
pub const EXCEPTION_SLAVE_DEVICE_BUSY: u8 = 0x06;
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway target device failed to respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// ============================================================================
// Link Fault Codes
// ============================================================================

/// Partial or garbled frame
pub const SERIAL_MALFORMED_CODE: u8 = 1;

/// Complete frame with a bad CRC
pub const CRC_MISMATCH_CODE: u8 = 2;

/// Silence until the response timeout
pub const NO_RESPONSE_CODE: u8 = 3;

// ============================================================================
// Frame Limits
// ============================================================================

/// Maximum RTU ADU size (address + PDU + CRC)
pub const MAX_ADU_SIZE: usize = 256;

/// Payload bytes kept from a read response.
///
/// The meter never returns more than two registers per catalogue entry, so
/// longer payloads are clamped and the CRC phase starts after this many bytes.
pub const RX_DATA_CAPACITY: usize = 20;

/// Maximum bytes in a raw write command, excluding the CRC
pub const MAX_WRITE_COMMAND_BYTES: usize = 100;

/// Length of a read-holding-registers request
/// Format: Slave(1) + FC(1) + Register(2) + Quantity(2) + CRC(2) = 8 bytes
pub const READ_REQUEST_LEN: usize = 8;

// ============================================================================
// Serial Timing
// ============================================================================

/// Serial line speed (8 data bits, even parity, 1 stop bit)
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Inter-character delay (T1.5 rounded up)
pub const DEFAULT_CHAR_DELAY_MS: u64 = 2;

/// Inter-frame delay (T3.5 rounded up)
pub const DEFAULT_FRAME_DELAY_MS: u64 = 4;

/// Settle time between opening the link and sending a request
pub const DEFAULT_UART_INIT_DELAY_MS: u64 = 10;

/// Silence after the last received byte that ends a response
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 150;

/// Attempts per catalogue entry, first try included
pub const DEFAULT_MAX_READ_ATTEMPTS: u8 = 5;

/// Pause between two electrical sweeps
pub const DEFAULT_READ_INTERVAL_MS: u64 = 1000;

// ============================================================================
// Sessions
// ============================================================================

/// WebSocket sessions tracked at once
pub const DEFAULT_MAX_SESSIONS: usize = 3;

/// Live administrator sessions allowed before supervisor logins are refused
pub const DEFAULT_SIMULTANEOUS_ADMINS: usize = 2;

/// Messages held by each inbound/outbound ring buffer
pub const QUEUE_DEPTH: usize = 18;

/// Longest text message accepted into a queue
pub const MAX_MESSAGE_LEN: usize = 450;

/// Plain HTTP sockets that may be associated with one session
pub const MAX_BYSTANDERS: usize = 10;

/// Dynamic endpoints in the key binding table
pub const ENDPOINT_SLOTS: usize = 6;

pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_HEARTBEAT_PERIOD_MS: u64 = 1000;

/// Minimum gap between two outbound sends
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 200;

/// Delay between a reset command and the restart request
pub const DEFAULT_RESTART_DELAY_MS: u64 = 1000;

/// Ethernet link-down time tolerated before a restart is requested
pub const DEFAULT_LINK_DOWN_GRACE_MS: u64 = 10_000;

// ============================================================================
// Reports & Messages
// ============================================================================

/// Upper bound for a rendered report, prefix included
pub const DEFAULT_REPORT_CAPACITY: usize = 12_200;

/// Smallest report capacity that still holds a prefix and an empty report
pub const MIN_REPORT_CAPACITY: usize = 64;

/// Gateway firmware version shown in the info view
pub const FIRMWARE_VERSION: &str = "V1.00";

/// Prefix shared by every console message in both directions
pub const CONSOLE_PREFIX: &str = "&console";

/// Prefix of the electrical snapshot report
pub const ELECTRICAL_REPORT_PREFIX: &str = "&console#rdmeter=";

/// Prefix of the device information report
pub const INFO_REPORT_PREFIX: &str = "&console#inform=";

// ============================================================================
// Tests
// ============================================================================
