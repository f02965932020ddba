//! # FPM Gateway - Power Meter Gateway Core
//!
//! Firmware core of a small power-meter gateway: a Modbus RTU master polls an
//! energy meter over a serial line, and browser clients follow the readings
//! over WebSocket sessions.
//!
//! ## Features
//!
//! - **Modbus RTU Master**: byte-wise receive state machines, CRC-16 checking,
//!   retry of silent requests, single queued raw write
//! - **Parameter Catalogue**: the WAGO 879-3040 register map with per-sweep
//!   enable sets
//! - **Session Engine**: bounded per-client queues, key-based authentication,
//!   send pacing, idle reclamation, eviction notice on overflow
//! - **Cooperative Scheduling**: every engine advances from a single
//!   non-blocking [`Gateway::tick`]
//!
//! ## Console Tags
//!
//! | Direction | Tag | Meaning |
//! |-----------|-----|---------|
//! | out | `#rdmeter=` | Electrical report |
//! | out | `#inform=` | Device info report |
//! | out | `#persistent=` | Heartbeat |
//! | in | `#new_ws=` | Session handshake |
//! | in | `#modbuswr?` | Raw Modbus write |
//! | in | `#setting=` | Settings change |
//!
//! ## Quick Start
//!
//! ```rust
//! use fpm_gateway::clock::ManualClock;
//! use fpm_gateway::serial::ScriptedLink;
//! use fpm_gateway::server::RecordingServer;
//! use fpm_gateway::settings::MemoryStore;
//! use fpm_gateway::{Catalogue, Gateway, GatewayConfig};
//!
//! let mut gateway = Gateway::new(
//!     GatewayConfig::default(),
//!     Catalogue::wago_879_3040(),
//!     ScriptedLink::new(),
//!     RecordingServer::new(),
//!     MemoryStore::new(),
//!     ManualClock::new(0),
//! )
//! .unwrap();
//!
//! gateway.on_handshake(7, &[]);
//! assert_eq!(gateway.tick(), None);
//! ```

// ============================================================================
// Modbus master
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Protocol, timing and capacity constants
pub mod constants;

/// Runtime configuration
pub mod config;

/// CRC-16/MODBUS
pub mod crc;

/// Request encoding and decoded response frames
pub mod frame;

/// Receive state machines for read and write responses
pub mod rx;

/// Meter parameter catalogue
pub mod catalogue;

/// Decoded readings
pub mod store;

/// JSON reports of the value store
pub mod report;

/// Serial byte transports
pub mod serial;

/// Monotonic and wall-clock time sources
pub mod clock;

/// Modbus RTU master engine
pub mod master;

// ============================================================================
// WebSocket sessions
// ============================================================================

/// Per-client session state and the session table
pub mod session;

/// Persistent settings
pub mod settings;

/// WebSocket server seams
pub mod server;

/// Login and key bindings
pub mod auth;

/// Network interface state
pub mod network;

/// Outbound console views
pub mod views;

/// Inbound console protocol
pub mod protocol;

/// Main-loop tick
pub mod scheduler;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime ===
#[cfg(feature = "std")]
pub use tokio;

// === Error handling ===
pub use error::{GatewayError, GatewayResult, ReadFault};

// === Core types ===
pub use catalogue::{Catalogue, Cid, EnableSet, ParameterDescriptor, ValueType};
pub use config::GatewayConfig;
pub use store::MeterValue;

// === Engines ===
pub use master::{ModbusMaster, ReadProgress, WriteProgress};
pub use scheduler::{Gateway, RestartReason};
pub use session::{AccessLevel, SessionTable, SocketId};

// === Seams ===
pub use clock::{Clock, SystemClock};
pub use serial::SerialLink;
pub use server::{EndpointRegistry, WsSink};
pub use settings::{JsonFileStore, SettingsStore};

#[cfg(feature = "rtu")]
pub use serial::RtuLink;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "FPM Gateway v{} - Modbus RTU meter gateway with WebSocket sessions",
        VERSION
    )
}
