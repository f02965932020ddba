//! # Register Catalogue
//!
//! Static metadata describing how to request and decode each meter value.
//! Readings are stored by catalogue position, so a descriptor is looked up
//! either by its position or by its [`Cid`].
//!
//! ## WAGO 879-3040 map
//!
//! | Block | Registers | Content |
//! |-------|-----------|---------|
//! | Device info | 0x4000-0x4033 | serial, versions, CT ratio, pulse and bus settings |
//! | Instantaneous | 0x5000-0x5036 | voltages, currents, powers, power factors |
//! | Energy | 0x6000-0x608F | tariff, forward/reverse and quadrant energies |

use std::collections::HashSet;
use std::fmt;

use crate::error::{GatewayError, GatewayResult};

/// Slave address of the meter on the field bus
pub const METER_SLAVE_ADDRESS: u8 = 1;

/// Catalogue entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid(pub u16);

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Secondary CT ratio, rendered `"primary/secondary"`
pub const CID_CT_RATIO_2: Cid = Cid(0x401F);

/// Pulse width setting, rendered `"low~high"`
pub const CID_PULSE_WIDTH: Cid = Cid(0x4021);

/// Protocol, software and hardware versions, rendered `"V<major>.<minor>"`
pub const VERSION_CIDS: [Cid; 3] = [Cid(0x4005), Cid(0x4007), Cid(0x4009)];

/// Tariff register that belongs with the device info
const CID_TARIFF: Cid = Cid(0x6048);

/// Modbus register block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Holding,
    Input,
    Coil,
    Discrete,
}

/// Declared value type of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    U16,
    /// Two registers, rendered signed
    U32,
    Float,
    Hex16,
    Hex32,
    Bin16,
    Bin32,
    /// Single character in the low byte of the register
    Ascii,
}

impl ValueType {
    /// Decoded size in bytes
    #[inline]
    pub fn byte_size(self) -> usize {
        match self {
            Self::U16 | Self::Hex16 | Self::Bin16 | Self::Ascii => 2,
            Self::U32 | Self::Float | Self::Hex32 | Self::Bin32 => 4,
        }
    }

    /// Registers needed to hold the value
    #[inline]
    pub fn register_count(self) -> u16 {
        (self.byte_size() / 2) as u16
    }
}

/// Access rights of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    WriteMultiple,
}

/// Immutable catalogue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub cid: Cid,
    pub name: &'static str,
    pub unit: &'static str,
    pub slave: u8,
    pub block: BlockKind,
    pub register: u16,
    /// Size in registers
    pub size: u16,
    pub value_type: ValueType,
    pub access: Access,
}

impl ParameterDescriptor {
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.access == Access::Read
    }
}

/// Read-only holding register on the meter, identified by its address
const fn holding(
    register: u16,
    name: &'static str,
    unit: &'static str,
    size: u16,
    value_type: ValueType,
) -> ParameterDescriptor {
    ParameterDescriptor {
        cid: Cid(register),
        name,
        unit,
        slave: METER_SLAVE_ADDRESS,
        block: BlockKind::Holding,
        register,
        size,
        value_type,
        access: Access::Read,
    }
}

/// Subset of the catalogue read in one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableSet {
    /// Device information, read once at boot
    Info,
    /// Everything else, read periodically
    Electrical,
    All,
}

impl EnableSet {
    pub fn contains(self, descriptor: &ParameterDescriptor) -> bool {
        let info = (0x4000..=0x4033).contains(&descriptor.register) || descriptor.cid == CID_TARIFF;
        match self {
            Self::Info => info,
            Self::Electrical => !info,
            Self::All => true,
        }
    }
}

/// Ordered parameter table
#[derive(Debug, Clone)]
pub struct Catalogue {
    entries: Vec<ParameterDescriptor>,
}

impl Catalogue {
    /// Full WAGO 879-3040 register map
    pub fn wago_879_3040() -> Self {
        Self {
            entries: WAGO_879_3040.to_vec(),
        }
    }

    /// Build from custom entries. Ids must be unique and sizes must match
    /// the declared value types.
    pub fn from_entries(entries: Vec<ParameterDescriptor>) -> GatewayResult<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.cid) {
                return Err(GatewayError::configuration(format!(
                    "duplicate catalogue id {}",
                    entry.cid
                )));
            }
            if entry.size != entry.value_type.register_count() {
                return Err(GatewayError::configuration(format!(
                    "catalogue id {}: size {} does not fit {:?}",
                    entry.cid, entry.size, entry.value_type
                )));
            }
        }
        Ok(Self { entries })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&ParameterDescriptor> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.entries.iter()
    }

    pub fn position(&self, cid: Cid) -> Option<usize> {
        self.entries.iter().position(|entry| entry.cid == cid)
    }

    pub fn find(&self, cid: Cid) -> Option<&ParameterDescriptor> {
        self.entries.iter().find(|entry| entry.cid == cid)
    }

    /// Per-position enable flags for a sweep
    pub fn enable_mask(&self, set: EnableSet) -> Vec<bool> {
        self.entries.iter().map(|entry| set.contains(entry)).collect()
    }
}

static WAGO_879_3040: [ParameterDescriptor; 131] = [
    holding(0x4000, "Serial number", "", 2, ValueType::Hex32),
    holding(0x4002, "Meter code", "", 1, ValueType::Hex16),
    holding(0x4003, "Modbus ID", "", 1, ValueType::U16),
    holding(0x4004, "Baud rate", "", 1, ValueType::U16),
    holding(0x4005, "Protocol version", "", 2, ValueType::Float),
    holding(0x4007, "Software version", "", 2, ValueType::Float),
    holding(0x4009, "Hardware version", "", 2, ValueType::Float),
    holding(0x400B, "Meter amps", "A", 1, ValueType::U16),
    holding(0x400C, "CT ratio", "A", 1, ValueType::Hex16),
    holding(0x400D, "S0 output rate", "pulse/kWh", 2, ValueType::Float),
    holding(0x400F, "Combination code", "", 1, ValueType::U16),
    holding(0x4010, "LCD cycle time", "s", 1, ValueType::Hex16),
    holding(0x4011, "Parity setting", "", 1, ValueType::U16),
    holding(0x4012, "Current direction", "", 1, ValueType::Ascii),
    holding(0x4013, "L2 Current direction", "", 1, ValueType::Ascii),
    holding(0x4014, "L3 Current direction", "", 1, ValueType::Ascii),
    holding(0x4016, "Power down counter", "", 1, ValueType::U16),
    holding(0x4017, "Present quadrant", "", 1, ValueType::U16),
    holding(0x4018, "L1 quadrant", "", 1, ValueType::U16),
    holding(0x4019, "L2 quadrant", "", 1, ValueType::U16),
    holding(0x401A, "L3 quadrant", "", 1, ValueType::U16),
    holding(0x401B, "Checksum", "", 2, ValueType::Hex32),
    holding(0x401D, "Active status word", "", 2, ValueType::Hex32),
    holding(0x401F, "CT ratio 2", "A", 2, ValueType::Bin32),
    holding(0x4021, "Pulse width", "ms", 2, ValueType::Bin32),
    holding(0x4022, "Pulse type", "", 1, ValueType::Hex16),
    holding(0x4023, "Checksum 2", "", 2, ValueType::Hex32),
    holding(0x4026, "Data type setting", "", 1, ValueType::U16),
    holding(0x4032, "Screen direction", "", 1, ValueType::U16),
    holding(0x4033, "OBIS code", "", 1, ValueType::U16),
    holding(0x5000, "Voltage", "V", 2, ValueType::Float),
    holding(0x5002, "L1 Voltage", "V", 2, ValueType::Float),
    holding(0x5004, "L2 Voltage", "V", 2, ValueType::Float),
    holding(0x5006, "L3 Voltage", "V", 2, ValueType::Float),
    holding(0x5008, "Grid frequency", "Hz", 2, ValueType::Float),
    holding(0x500A, "Current", "A", 2, ValueType::Float),
    holding(0x500C, "L1 Current", "A", 2, ValueType::Float),
    holding(0x500E, "L2 Current", "A", 2, ValueType::Float),
    holding(0x5010, "L3 Current", "A", 2, ValueType::Float),
    holding(0x5012, "Total active power", "kW", 2, ValueType::Float),
    holding(0x5014, "L1 Active power", "kW", 2, ValueType::Float),
    holding(0x5016, "L2 Active power", "kW", 2, ValueType::Float),
    holding(0x5018, "L3 Active power", "kW", 2, ValueType::Float),
    holding(0x501A, "Total reactive power", "kvar", 2, ValueType::Float),
    holding(0x501C, "L1 reactive power", "kvar", 2, ValueType::Float),
    holding(0x501E, "L2 reactive power", "kvar", 2, ValueType::Float),
    holding(0x5020, "L3 reactive power", "kvar", 2, ValueType::Float),
    holding(0x5022, "Total apparent power", "kVA", 2, ValueType::Float),
    holding(0x5024, "L1 apparent power", "kVA", 2, ValueType::Float),
    holding(0x5026, "L2 apparent power", "kVA", 2, ValueType::Float),
    holding(0x5028, "L3 apparent power", "kVA", 2, ValueType::Float),
    holding(0x502A, "Power factor", "", 2, ValueType::Float),
    holding(0x502C, "L1 Power factor", "", 2, ValueType::Float),
    holding(0x502E, "L2 Power factor", "", 2, ValueType::Float),
    holding(0x5030, "L3 Power factor", "", 2, ValueType::Float),
    holding(0x5032, "L1 L2 Voltage", "V", 2, ValueType::Float),
    holding(0x5034, "L1 L3 Voltage", "V", 2, ValueType::Float),
    holding(0x5036, "L2 L3 Voltage", "V", 2, ValueType::Float),
    holding(0x6000, "Total active energy", "kWh", 2, ValueType::Float),
    holding(0x6002, "T1 Total active energy", "kWh", 2, ValueType::Float),
    holding(0x6004, "T2 Total active energy", "kWh", 2, ValueType::Float),
    holding(0x6006, "L1 Total active energy", "kWh", 2, ValueType::Float),
    holding(0x6008, "L2 Total active energy", "kWh", 2, ValueType::Float),
    holding(0x600A, "L3 Total active energy", "kWh", 2, ValueType::Float),
    holding(0x600C, "Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x600E, "T1 Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x6010, "T2 Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x6012, "L1 Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x6014, "L2 Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x6016, "L3 Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x6018, "Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x601A, "T1 Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x601C, "T2 Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x601E, "L1 Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x6020, "L2 Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x6022, "L3 Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x6024, "Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6026, "T1 Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6028, "T2 Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x602A, "L1 Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x602C, "L2 Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x602E, "L3 Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6030, "Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6032, "T1 Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6034, "T2 Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6036, "L1 Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6038, "L2 Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x603A, "L3 Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x603C, "Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x603E, "T1 Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6040, "T2 Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6042, "L1 Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6044, "L2 Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6046, "L3 Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6048, "Tariff", "", 1, ValueType::U16),
    holding(0x6049, "Resettable day register", "kWh", 2, ValueType::Float),
    holding(0x604B, "T3 Total active energy", "kWh", 2, ValueType::Float),
    holding(0x604D, "T4 Total active energy", "kWh", 2, ValueType::Float),
    holding(0x604F, "T3 Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x6051, "T4 Forward active energy", "kWh", 2, ValueType::Float),
    holding(0x6053, "T3 Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x6055, "T4 Reverse active energy", "kWh", 2, ValueType::Float),
    holding(0x6057, "T3 Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6059, "T4 Total reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x605B, "T3 Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x605D, "T4 Forward reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x605F, "T3 Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6061, "T4 Reverse reactive energy", "kvarh", 2, ValueType::Float),
    holding(0x6063, "Imp. inductive reactive energy in Q1 (Total)", "kWh", 2, ValueType::Float),
    holding(0x6065, "Imp. inductive reactive energy in Q1 (T1)", "kWh", 2, ValueType::Float),
    holding(0x6067, "Imp. inductive reactive energy in Q1 (T2)", "kWh", 2, ValueType::Float),
    holding(0x6069, "Imp. inductive reactive energy in Q1 (T3)", "kWh", 2, ValueType::Float),
    holding(0x606B, "Imp. inductive reactive energy in Q1 (T4)", "kWh", 2, ValueType::Float),
    holding(0x606D, "Imp. capacitive reactive energy in Q2 (Total)", "kWh", 2, ValueType::Float),
    holding(0x606F, "Imp. capacitive reactive energy in Q2 (T1)", "kWh", 2, ValueType::Float),
    holding(0x6071, "Imp. capacitive reactive energy in Q2 (T2)", "kWh", 2, ValueType::Float),
    holding(0x6073, "Imp. capacitive reactive energy in Q2 (T3)", "kWh", 2, ValueType::Float),
    holding(0x6075, "Imp. capacitive reactive energy in Q2 (T4)", "kWh", 2, ValueType::Float),
    holding(0x6077, "Exp. Inductive reactive energy in Q3 (Total)", "kWh", 2, ValueType::Float),
    holding(0x6079, "Exp. Inductive reactive energy in Q3 (T1)", "kWh", 2, ValueType::Float),
    holding(0x607B, "Exp. Inductive reactive energy in Q3 (T2)", "kWh", 2, ValueType::Float),
    holding(0x607D, "Exp. Inductive reactive energy in Q3 (T3)", "kWh", 2, ValueType::Float),
    holding(0x607F, "Exp. Inductive reactive energy in Q3 (T4)", "kWh", 2, ValueType::Float),
    holding(0x6081, "Exp. capacitive reactive energy in Q4 (Total)", "kWh", 2, ValueType::Float),
    holding(0x6083, "Exp. capacitive reactive energy in Q4 (T1)", "kWh", 2, ValueType::Float),
    holding(0x6085, "Exp. capacitive reactive energy in Q4 (T2)", "kWh", 2, ValueType::Float),
    holding(0x6087, "Exp. capacitive reactive energy in Q4 (T3)", "kWh", 2, ValueType::Float),
    holding(0x6089, "Exp. capacitive reactive energy in Q4 (T4)", "kWh", 2, ValueType::Float),
    holding(0x608B, "Resettable day counter L1", "kWh", 2, ValueType::Float),
    holding(0x608D, "Resettable day counter L2", "kWh", 2, ValueType::Float),
    holding(0x608F, "Resettable day counter L3", "kWh", 2, ValueType::Float),
];

// ============================================================================
// Tests
// ============================================================================
