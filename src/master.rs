//! # Modbus Master Engine
//!
//! Issues one request at a time and never blocks. The scheduler calls
//! [`ModbusMaster::poll_serial`] to feed received bytes into the active
//! receive machine, then advances either the read sweep or the pending write.
//!
//! ## Read sweep
//!
//! ```text
//! Iterate ──(next enabled entry)──► UartInit ──(init delay)──► AwaitResponse
//!    ▲                                                              │
//!    └──── complete / timeout: record, retry or advance ◄───────────┘
//! ```
//!
//! Entries are visited in ascending catalogue order. A failed entry is
//! retried only for [`ReadFault::is_retryable`] faults, up to
//! `max_read_attempts` attempts in total. When the last entry is settled the
//! sweep reports [`ReadProgress::BatchReady`] and the store holds a complete
//! snapshot for the report renderer.
//!
//! ## Writes
//!
//! A single raw write command can be pending. It uses the same link and the
//! write receive machine, and is only started when the read sweep sits at a
//! request boundary, so the two never interleave mid-frame.

use tracing::{debug, info, warn};

use crate::catalogue::{Catalogue, EnableSet};
use crate::config::GatewayConfig;
use crate::constants::{FC_READ_HOLDING_REGISTERS, MAX_WRITE_COMMAND_BYTES};
use crate::error::{GatewayError, GatewayResult, ReadFault};
use crate::frame::{exception_description, FrameEncoder};
use crate::report::render_report;
use crate::rx::{FrameReceiver, ReadReceiver, WriteReceiver};
use crate::serial::SerialLink;
use crate::store::{MeterValue, ValueStore};

/// Outcome of one read sweep step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// A request is being prepared or awaits its response
    Pending,
    /// One entry settled; the link is free for a write
    RequestDone,
    /// Every enabled entry settled; the store holds a full snapshot
    BatchReady,
}

/// Outcome of one write step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    Idle,
    InFlight,
    Succeeded,
    Failed(ReadFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    Iterate,
    UartInit { since_ms: u64 },
    AwaitResponse,
}

/// Position of the read sweep in the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCursor {
    index: usize,
    phase: ReadPhase,
    cycle_open: bool,
}

impl ReadCursor {
    fn new() -> Self {
        Self {
            index: 0,
            phase: ReadPhase::Iterate,
            cycle_open: false,
        }
    }

    /// Catalogue position of the current or next request
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// No request prepared or in flight
    #[inline]
    pub fn at_boundary(&self) -> bool {
        self.phase == ReadPhase::Iterate
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WritePhase {
    Idle,
    Queued(Vec<u8>),
    UartInit { since_ms: u64, command: Vec<u8> },
    AwaitResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Read,
    Write,
}

/// Modbus RTU master over a [`SerialLink`]
pub struct ModbusMaster<L: SerialLink> {
    config: GatewayConfig,
    link: L,
    catalogue: Catalogue,
    store: ValueStore,
    enabled: Vec<bool>,
    cursor: ReadCursor,
    write: WritePhase,
    read_rx: ReadReceiver,
    write_rx: WriteReceiver,
    active: Option<Active>,
    last_rx_ms: u64,
}

impl<L: SerialLink> ModbusMaster<L> {
    /// Create a master with every catalogue entry enabled
    pub fn new(config: GatewayConfig, catalogue: Catalogue, link: L) -> Self {
        let store = ValueStore::new(catalogue.len());
        let enabled = catalogue.enable_mask(EnableSet::All);
        Self {
            config,
            link,
            catalogue,
            store,
            enabled,
            cursor: ReadCursor::new(),
            write: WritePhase::Idle,
            read_rx: ReadReceiver::new(),
            write_rx: WriteReceiver::new(),
            active: None,
            last_rx_ms: 0,
        }
    }

    // ========================================================================
    // Serial receive
    // ========================================================================

    /// Drain received bytes into the active receive machine
    pub fn poll_serial(&mut self, now_ms: u64) {
        let mut buf = [0u8; 64];
        loop {
            let count = self.link.poll_read(&mut buf);
            if count == 0 {
                break;
            }
            for &byte in &buf[..count] {
                match self.active {
                    Some(Active::Read) => self.read_rx.feed(byte),
                    Some(Active::Write) => self.write_rx.feed(byte),
                    None => {}
                }
            }
            self.last_rx_ms = now_ms;
        }
    }

    fn response_timed_out(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_rx_ms) > self.config.response_timeout_ms
    }

    fn release_link(&mut self) {
        self.link.close();
        self.active = None;
    }

    // ========================================================================
    // Read sweep
    // ========================================================================

    /// Advance the read sweep by one step
    pub fn step_read(&mut self, now_ms: u64) -> ReadProgress {
        match self.cursor.phase {
            ReadPhase::Iterate => {
                if !self.cursor.cycle_open {
                    self.store.reset_cycle();
                    self.cursor.cycle_open = true;
                }
                self.skip_disabled();
                if self.cursor.index >= self.catalogue.len() {
                    return self.finish_batch();
                }

                let attempt = self.store.begin_attempt(self.cursor.index);
                debug!(
                    "Read entry {} attempt {}",
                    self.cursor.index, attempt
                );
                if let Err(e) = self.link.open() {
                    warn!("Serial open failed: {}", e);
                    return self.settle_failure(ReadFault::NoResponse);
                }
                self.cursor.phase = ReadPhase::UartInit { since_ms: now_ms };
                ReadProgress::Pending
            }
            ReadPhase::UartInit { since_ms } => {
                if now_ms.saturating_sub(since_ms) <= self.config.uart_init_delay_ms {
                    return ReadProgress::Pending;
                }
                match self.send_read_request() {
                    Ok(()) => {
                        self.last_rx_ms = now_ms;
                        self.cursor.phase = ReadPhase::AwaitResponse;
                        ReadProgress::Pending
                    }
                    Err(e) => {
                        warn!("Read request not sent: {}", e);
                        self.release_link();
                        self.settle_failure(ReadFault::NoResponse)
                    }
                }
            }
            ReadPhase::AwaitResponse => {
                if self.read_rx.is_complete() {
                    let result = self.decode_response();
                    self.release_link();
                    match result {
                        Ok(value) => {
                            self.store.record_success(self.cursor.index, value);
                            self.advance()
                        }
                        Err(fault) => self.settle_failure(fault),
                    }
                } else if self.response_timed_out(now_ms) {
                    let fault = self.read_rx.timeout_fault();
                    self.release_link();
                    self.settle_failure(fault)
                } else {
                    ReadProgress::Pending
                }
            }
        }
    }

    fn skip_disabled(&mut self) {
        while let Some(descriptor) = self.catalogue.get(self.cursor.index) {
            if self.enabled[self.cursor.index] && descriptor.is_readable() {
                break;
            }
            self.cursor.index += 1;
        }
    }

    fn send_read_request(&mut self) -> GatewayResult<()> {
        let descriptor = self
            .catalogue
            .get(self.cursor.index)
            .ok_or_else(|| GatewayError::protocol("read cursor past catalogue end"))?;
        let frame =
            FrameEncoder::read_holding_registers(descriptor.slave, descriptor.register, descriptor.size)?;
        self.read_rx.reset();
        self.active = Some(Active::Read);
        debug!(
            "TX read {} ({}) reg={:04X} qty={}",
            descriptor.cid, descriptor.name, descriptor.register, descriptor.size
        );
        self.link.transmit(frame.as_slice())
    }

    fn decode_response(&self) -> Result<MeterValue, ReadFault> {
        let frame = self.read_rx.outcome().map_err(|fault| {
            if let ReadFault::Exception(code) = fault {
                debug!("Exception {:02X}: {}", code, exception_description(code));
            }
            fault
        })?;
        let descriptor = self
            .catalogue
            .get(self.cursor.index)
            .ok_or(ReadFault::SerialMalformed)?;
        if frame.address != descriptor.slave || frame.function != FC_READ_HOLDING_REGISTERS {
            return Err(ReadFault::SerialMalformed);
        }
        MeterValue::decode(descriptor.value_type, frame.payload())
            .map_err(|_| ReadFault::SerialMalformed)
    }

    fn settle_failure(&mut self, fault: ReadFault) -> ReadProgress {
        let index = self.cursor.index;
        self.store.record_failure(index, fault);
        let attempts = self.store.get(index).map(|r| r.attempts).unwrap_or(0);

        if fault.is_retryable() && attempts < self.config.max_read_attempts {
            debug!("Entry {} failed with {}, retrying", index, fault);
            self.cursor.phase = ReadPhase::Iterate;
            return ReadProgress::RequestDone;
        }
        if fault.is_retryable() {
            warn!(
                "Entry {} gave up after {} attempts: {}",
                index, attempts, fault
            );
        }
        self.advance()
    }

    fn advance(&mut self) -> ReadProgress {
        self.cursor.index += 1;
        self.cursor.phase = ReadPhase::Iterate;
        self.skip_disabled();
        if self.cursor.index >= self.catalogue.len() {
            self.finish_batch()
        } else {
            ReadProgress::RequestDone
        }
    }

    fn finish_batch(&mut self) -> ReadProgress {
        let settled = self.enabled.iter().filter(|&&on| on).count();
        let succeeded = (0..self.store.len())
            .filter(|&i| self.store.get(i).is_some_and(|r| r.ok))
            .count();
        info!("Read sweep complete: {}/{} entries ok", succeeded, settled);
        self.cursor = ReadCursor::new();
        ReadProgress::BatchReady
    }

    /// Start the read sweep again from the first entry
    pub fn restart_sweep(&mut self) {
        if self.active == Some(Active::Read) {
            self.release_link();
        }
        self.cursor = ReadCursor::new();
    }

    /// Select the entries read by the next sweep
    pub fn set_enable_set(&mut self, set: EnableSet) {
        self.enabled = self.catalogue.enable_mask(set);
        self.restart_sweep();
    }

    pub fn set_enabled(&mut self, mask: Vec<bool>) -> GatewayResult<()> {
        if mask.len() != self.catalogue.len() {
            return Err(GatewayError::configuration(format!(
                "enable mask has {} entries, catalogue has {}",
                mask.len(),
                self.catalogue.len()
            )));
        }
        self.enabled = mask;
        self.restart_sweep();
        Ok(())
    }

    /// Render the current snapshot of the enabled entries
    pub fn render_report(&self, prefix: &str) -> String {
        render_report(
            prefix,
            &self.catalogue,
            &self.enabled,
            &self.store,
            self.config.report_capacity,
        )
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Queue a raw write command (CRC excluded). Only one may be pending.
    pub fn submit_write(&mut self, command: Vec<u8>) -> GatewayResult<()> {
        if self.write != WritePhase::Idle {
            return Err(GatewayError::WriteBusy);
        }
        if command.is_empty() || command.len() > MAX_WRITE_COMMAND_BYTES {
            return Err(GatewayError::invalid_data(format!(
                "write command must carry 1..={} bytes, got {}",
                MAX_WRITE_COMMAND_BYTES,
                command.len()
            )));
        }
        debug!("Write queued: {} bytes", command.len());
        self.write = WritePhase::Queued(command);
        Ok(())
    }

    #[inline]
    pub fn has_pending_write(&self) -> bool {
        self.write != WritePhase::Idle
    }

    /// Advance the pending write by one step
    pub fn step_write(&mut self, now_ms: u64) -> WriteProgress {
        match std::mem::replace(&mut self.write, WritePhase::Idle) {
            WritePhase::Idle => WriteProgress::Idle,
            WritePhase::Queued(command) => {
                if let Err(e) = self.link.open() {
                    warn!("Serial open failed: {}", e);
                    return WriteProgress::Failed(ReadFault::NoResponse);
                }
                self.write = WritePhase::UartInit {
                    since_ms: now_ms,
                    command,
                };
                WriteProgress::InFlight
            }
            WritePhase::UartInit { since_ms, command } => {
                if now_ms.saturating_sub(since_ms) <= self.config.uart_init_delay_ms {
                    self.write = WritePhase::UartInit { since_ms, command };
                    return WriteProgress::InFlight;
                }
                match self.send_write_request(&command) {
                    Ok(()) => {
                        self.last_rx_ms = now_ms;
                        self.write = WritePhase::AwaitResponse;
                        WriteProgress::InFlight
                    }
                    Err(e) => {
                        warn!("Write request not sent: {}", e);
                        self.release_link();
                        WriteProgress::Failed(ReadFault::NoResponse)
                    }
                }
            }
            WritePhase::AwaitResponse => {
                if self.write_rx.is_complete() {
                    let outcome = self
                        .write_rx
                        .outcome()
                        .map(|frame| (frame.register_address(), frame.quantity_value()));
                    self.release_link();
                    match outcome {
                        Ok((register, echoed)) => {
                            info!("Write acknowledged at 0x{:04X} ({})", register, echoed);
                            WriteProgress::Succeeded
                        }
                        Err(fault) => {
                            warn!("Write rejected: {}", fault);
                            WriteProgress::Failed(fault)
                        }
                    }
                } else if self.response_timed_out(now_ms) {
                    let fault = self.write_rx.timeout_fault();
                    self.release_link();
                    warn!("Write timed out: {}", fault);
                    WriteProgress::Failed(fault)
                } else {
                    self.write = WritePhase::AwaitResponse;
                    WriteProgress::InFlight
                }
            }
        }
    }

    fn send_write_request(&mut self, command: &[u8]) -> GatewayResult<()> {
        let frame = FrameEncoder::raw_command(command)?;
        self.write_rx.reset();
        self.active = Some(Active::Write);
        debug!("TX write {:02X?}", frame.as_slice());
        self.link.transmit(frame.as_slice())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn cursor(&self) -> &ReadCursor {
        &self.cursor
    }

    /// Read sweep idle between requests and no frame in flight
    #[inline]
    pub fn at_request_boundary(&self) -> bool {
        self.cursor.at_boundary() && self.active.is_none()
    }

    #[inline]
    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    #[inline]
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    #[inline]
    pub fn enabled(&self) -> &[bool] {
        &self.enabled
    }

    #[inline]
    pub fn link(&self) -> &L {
        &self.link
    }

    #[inline]
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Cid, ParameterDescriptor, ValueType};
    use crate::crc::Crc16;
    use crate::serial::ScriptedLink;

    fn entry(register: u16, name: &'static str, size: u16, value_type: ValueType) -> ParameterDescriptor {
        ParameterDescriptor {
            cid: Cid(register),
            name,
            unit: "V",
            slave: 1,
            block: crate::catalogue::BlockKind::Holding,
            register,
            size,
            value_type,
            access: crate::catalogue::Access::Read,
        }
    }

    fn three_voltages() -> Catalogue {
        Catalogue::from_entries(vec![
            entry(0x5002, "L1 Voltage", 2, ValueType::Float),
            entry(0x5004, "L2 Voltage", 2, ValueType::Float),
            entry(0x5006, "L3 Voltage", 2, ValueType::Float),
        ])
        .unwrap()
    }

    fn read_reply(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0x01, 0x03, payload.len() as u8];
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&Crc16::checksum(&bytes));
        bytes
    }

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut bytes = body.to_vec();
        bytes.extend_from_slice(&Crc16::checksum(body));
        bytes
    }

    /// Drive the read sweep in 5 ms steps until the batch completes
    fn run_sweep(master: &mut ModbusMaster<ScriptedLink>, now: &mut u64) {
        for _ in 0..10_000 {
            *now += 5;
            master.poll_serial(*now);
            if master.step_read(*now) == ReadProgress::BatchReady {
                return;
            }
        }
        panic!("read sweep never completed");
    }

    fn run_write(master: &mut ModbusMaster<ScriptedLink>, now: &mut u64) -> WriteProgress {
        for _ in 0..10_000 {
            *now += 5;
            master.poll_serial(*now);
            match master.step_write(*now) {
                WriteProgress::InFlight => continue,
                other => return other,
            }
        }
        panic!("write never settled");
    }

    #[test]
    fn test_sweep_decodes_every_entry() {
        let mut link = ScriptedLink::new();
        link.push_reply(read_reply(&[0x43, 0x66, 0x80, 0x00]));
        link.push_reply(read_reply(&[0x3F, 0x80, 0x00, 0x00]));
        link.push_reply(read_reply(&[0x00, 0x00, 0x00, 0x00]));
        let mut master = ModbusMaster::new(GatewayConfig::default(), three_voltages(), link);

        let mut now = 0;
        run_sweep(&mut master, &mut now);

        assert_eq!(master.store().current(0), Some(MeterValue::F32(230.5)));
        assert_eq!(master.store().current(1), Some(MeterValue::F32(1.0)));
        assert_eq!(master.store().current(2), Some(MeterValue::F32(0.0)));

        let sent = master.link().sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], with_crc(&[0x01, 0x03, 0x50, 0x02, 0x00, 0x02]));
        assert_eq!(sent[2][2..4], [0x50, 0x06]);
        assert!(!master.link().is_open());
        assert!(master.at_request_boundary());
    }

    #[test]
    fn test_silent_entry_gives_up_after_five_attempts() {
        let catalogue =
            Catalogue::from_entries(vec![entry(0x4003, "Modbus ID", 1, ValueType::U16)]).unwrap();
        let mut master = ModbusMaster::new(GatewayConfig::default(), catalogue, ScriptedLink::new());

        let mut now = 0;
        run_sweep(&mut master, &mut now);

        let reading = master.store().get(0).unwrap();
        assert_eq!(reading.attempts, 5);
        assert_eq!(reading.fault, Some(ReadFault::NoResponse));
        assert!(!reading.ok);
        assert_eq!(master.link().sent().len(), 5);
    }

    #[test]
    fn test_retry_then_success() {
        let mut link = ScriptedLink::new();
        link.push_silence();
        link.push_reply(with_crc(&[0x01, 0x83, 0x0B]));
        link.push_reply(read_reply(&[0x01, 0x2C]));
        let catalogue =
            Catalogue::from_entries(vec![entry(0x4004, "Baud rate", 1, ValueType::U16)]).unwrap();
        let mut master = ModbusMaster::new(GatewayConfig::default(), catalogue, link);

        let mut now = 0;
        run_sweep(&mut master, &mut now);

        let reading = master.store().get(0).unwrap();
        assert_eq!(reading.attempts, 3);
        assert_eq!(master.store().current(0), Some(MeterValue::U16(300)));
    }

    #[test]
    fn test_exception_and_crc_faults_not_retried() {
        let mut link = ScriptedLink::new();
        link.push_reply(with_crc(&[0x01, 0x83, 0x02]));
        let mut bad_crc = read_reply(&[0x3F, 0x80, 0x00, 0x00]);
        let last = bad_crc.len() - 1;
        bad_crc[last] ^= 0x01;
        link.push_reply(bad_crc);
        link.push_reply(read_reply(&[0x3F, 0x80, 0x00, 0x00]));
        let mut master = ModbusMaster::new(GatewayConfig::default(), three_voltages(), link);

        let mut now = 0;
        run_sweep(&mut master, &mut now);

        assert_eq!(master.store().get(0).unwrap().fault, Some(ReadFault::Exception(2)));
        assert_eq!(master.store().get(1).unwrap().fault, Some(ReadFault::CrcMismatch));
        assert_eq!(master.store().get(1).unwrap().attempts, 1);
        assert!(master.store().get(2).unwrap().ok);
        assert_eq!(master.link().sent().len(), 3);
    }

    #[test]
    fn test_partial_frame_is_malformed() {
        let mut link = ScriptedLink::new();
        link.push_reply(vec![0x01, 0x03, 0x04, 0x3F]);
        let catalogue =
            Catalogue::from_entries(vec![entry(0x5000, "Voltage", 2, ValueType::Float)]).unwrap();
        let mut master = ModbusMaster::new(GatewayConfig::default(), catalogue, link);

        let mut now = 0;
        run_sweep(&mut master, &mut now);
        assert_eq!(
            master.store().get(0).unwrap().fault,
            Some(ReadFault::SerialMalformed)
        );
    }

    #[test]
    fn test_disabled_entries_skipped() {
        let mut link = ScriptedLink::new();
        link.push_reply(read_reply(&[0x3F, 0x80, 0x00, 0x00]));
        let mut master = ModbusMaster::new(GatewayConfig::default(), three_voltages(), link);
        master.set_enabled(vec![false, true, false]).unwrap();
        assert!(master.set_enabled(vec![true]).is_err());

        let mut now = 0;
        run_sweep(&mut master, &mut now);

        assert_eq!(master.link().sent().len(), 1);
        assert_eq!(master.link().sent()[0][2..4], [0x50, 0x04]);
        assert_eq!(master.store().current(1), Some(MeterValue::F32(1.0)));
    }

    #[test]
    fn test_end_to_end_report_keeps_catalogue_order() {
        let mut link = ScriptedLink::new();
        link.push_reply(read_reply(&[0x43, 0x66, 0x80, 0x00]));
        for _ in 0..5 {
            link.push_silence();
        }
        link.push_reply(read_reply(&[0x43, 0x67, 0x00, 0x00]));
        let mut master = ModbusMaster::new(GatewayConfig::default(), three_voltages(), link);

        let mut now = 0;
        run_sweep(&mut master, &mut now);
        let report = master.render_report("&console#rdmeter=");

        let json: serde_json::Value =
            serde_json::from_str(report.strip_prefix("&console#rdmeter=").unwrap()).unwrap();
        let entries = json["WAGO8793040"].as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["value"], "230.500");
        assert_eq!(entries[1]["value"], "Error(3)");
        assert_eq!(entries[2]["value"], "231.000");
        assert_eq!(entries[1]["parameter"], "L2 Voltage");
        assert_eq!(master.link().sent().len(), 7);
    }

    #[test]
    fn test_next_sweep_resets_outcomes() {
        let mut link = ScriptedLink::new();
        link.push_reply(read_reply(&[0x00, 0x07]));
        let catalogue =
            Catalogue::from_entries(vec![entry(0x4003, "Modbus ID", 1, ValueType::U16)]).unwrap();
        let mut master = ModbusMaster::new(GatewayConfig::default(), catalogue, link);

        let mut now = 0;
        run_sweep(&mut master, &mut now);
        assert!(master.store().get(0).unwrap().ok);

        run_sweep(&mut master, &mut now);
        let reading = master.store().get(0).unwrap();
        assert!(!reading.ok);
        assert_eq!(reading.value, Some(MeterValue::U16(7)));
        assert_eq!(reading.attempts, 5);
    }

    #[test]
    fn test_write_single_register_success() {
        let mut link = ScriptedLink::new();
        link.push_reply(with_crc(&[0x01, 0x06, 0x40, 0x10, 0x00, 0x05]));
        let mut master = ModbusMaster::new(GatewayConfig::default(), three_voltages(), link);

        master
            .submit_write(vec![0x01, 0x06, 0x40, 0x10, 0x00, 0x05])
            .unwrap();
        assert!(master.has_pending_write());
        assert!(matches!(
            master.submit_write(vec![0x01]),
            Err(GatewayError::WriteBusy)
        ));

        let mut now = 0;
        assert_eq!(run_write(&mut master, &mut now), WriteProgress::Succeeded);
        assert!(!master.has_pending_write());
        assert_eq!(
            master.link().sent()[0],
            with_crc(&[0x01, 0x06, 0x40, 0x10, 0x00, 0x05])
        );
        assert_eq!(master.step_write(now), WriteProgress::Idle);
    }

    #[test]
    fn test_write_failures() {
        let mut link = ScriptedLink::new();
        link.push_silence();
        link.push_reply(with_crc(&[0x01, 0x90, 0x02]));
        let mut master = ModbusMaster::new(GatewayConfig::default(), three_voltages(), link);
        let mut now = 0;

        master.submit_write(vec![0x01, 0x06, 0x00, 0x00, 0x00, 0x01]).unwrap();
        assert_eq!(
            run_write(&mut master, &mut now),
            WriteProgress::Failed(ReadFault::NoResponse)
        );

        master
            .submit_write(vec![0x01, 0x10, 0x40, 0x1F, 0x00, 0x01, 0x02, 0x00, 0x05])
            .unwrap();
        assert_eq!(
            run_write(&mut master, &mut now),
            WriteProgress::Failed(ReadFault::Exception(2))
        );
    }

    #[test]
    fn test_submit_write_validates_length() {
        let mut master =
            ModbusMaster::new(GatewayConfig::default(), three_voltages(), ScriptedLink::new());
        assert!(master.submit_write(Vec::new()).is_err());
        assert!(master
            .submit_write(vec![0; MAX_WRITE_COMMAND_BYTES + 1])
            .is_err());
        assert!(!master.has_pending_write());
    }

    #[test]
    fn test_uart_init_delay_respected() {
        let mut link = ScriptedLink::new();
        link.push_reply(read_reply(&[0x3F, 0x80, 0x00, 0x00]));
        let mut master = ModbusMaster::new(GatewayConfig::default(), three_voltages(), link);

        assert_eq!(master.step_read(100), ReadProgress::Pending);
        assert!(master.link().is_open());
        assert_eq!(master.step_read(105), ReadProgress::Pending);
        assert_eq!(master.step_read(110), ReadProgress::Pending);
        assert!(master.link().sent().is_empty());
        assert_eq!(master.step_read(111), ReadProgress::Pending);
        assert_eq!(master.link().sent().len(), 1);
        assert!(!master.at_request_boundary());

        master.poll_serial(112);
        assert_eq!(master.step_read(112), ReadProgress::RequestDone);
        assert_eq!(master.cursor().index(), 1);
    }
}
