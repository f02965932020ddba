//! # Scheduler Tick
//!
//! [`Gateway`] owns every engine and advances them from [`Gateway::tick`],
//! called once per main-loop iteration (about every 25 ms). A tick never
//! blocks; every wait is a timestamp delta against the [`Clock`].
//!
//! ## Tick order
//!
//! 1. Drain serial bytes into the Modbus receive machine
//! 2. Process one inbound message of one session, then complete any
//!    session startups that became ready
//! 3. Give one session its send opportunity (paced by `send_interval_ms`)
//! 4. Evict idle sessions
//! 5. Advance the Modbus read sweep or the pending write
//! 6. Report a pending restart
//!
//! ## Send priority
//!
//! For the session whose turn it is, at most one frame goes out:
//! eviction close notice, then heartbeat, then the next queued message,
//! then the electrical snapshot, then the info snapshot. A session that has
//! not answered its previous frame is skipped.

use tracing::{debug, info, warn};

use crate::auth::{check_credentials, parse_login, KeyBindingTable, LoginOutcome, LoginReply};
use crate::catalogue::{Catalogue, EnableSet};
use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::constants::{ELECTRICAL_REPORT_PREFIX, INFO_REPORT_PREFIX};
use crate::error::{GatewayError, GatewayResult};
use crate::master::{ModbusMaster, ReadProgress, WriteProgress};
use crate::network::{LinkWatch, NetworkInfo};
use crate::protocol::{
    handle_message, push_settings, write_failed, Action, ProtocolContext, CLOSE_NOTICE,
    VALIDATE, WRITE_NOT_SUCCESSFUL, WRITE_SUCCESSFUL,
};
use crate::serial::SerialLink;
use crate::server::{EndpointRegistry, WsSink};
use crate::session::{Audience, Registration, SessionTable, SocketId};
use crate::settings::{GatewaySettings, SettingsStore};
use crate::views::{heartbeat, info_view};

/// Why [`Gateway::tick`] asks for a restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// A client sent `#reset`
    ResetCommand,
    /// The Ethernet link stayed down past the grace window
    EthernetLinkLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Info,
    Electrical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusMode {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outgoing {
    Heartbeat,
    Queued,
    Electrical,
    InfoConfig,
}

/// The gateway: Modbus master, session table and their collaborators
pub struct Gateway<L, W, S, C>
where
    L: SerialLink,
    W: WsSink + EndpointRegistry,
    S: SettingsStore,
    C: Clock,
{
    config: GatewayConfig,
    master: ModbusMaster<L>,
    server: W,
    store: S,
    clock: C,
    sessions: SessionTable,
    keys: KeyBindingTable,
    settings: GatewaySettings,
    network: NetworkInfo,
    link: LinkWatch,
    sweep: Sweep,
    sweep_active: bool,
    bus: BusMode,
    write_requester: Option<SocketId>,
    last_batch_ms: Option<u64>,
    last_send_ms: u64,
    electrical_snapshot: String,
    info_snapshot: String,
    reset_requested_ms: Option<u64>,
}

impl<L, W, S, C> Gateway<L, W, S, C>
where
    L: SerialLink,
    W: WsSink + EndpointRegistry,
    S: SettingsStore,
    C: Clock,
{
    /// Load settings and key bindings, register the key endpoints and
    /// schedule the boot-time info sweep.
    pub fn new(
        config: GatewayConfig,
        catalogue: Catalogue,
        link: L,
        mut server: W,
        store: S,
        clock: C,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let settings = GatewaySettings::load(&store);
        let keys = KeyBindingTable::load(&store);
        keys.register_all(&mut server);

        let mut master = ModbusMaster::new(config, catalogue, link);
        master.set_enable_set(EnableSet::Info);
        let now = clock.now_ms();
        info!(
            "Gateway started: {} sessions, {} catalogue entries",
            config.max_sessions,
            master.catalogue().len()
        );

        Ok(Self {
            config,
            master,
            server,
            store,
            clock,
            sessions: SessionTable::new(config.max_sessions),
            keys,
            settings,
            network: NetworkInfo::default(),
            link: LinkWatch::new(),
            sweep: Sweep::Info,
            sweep_active: false,
            bus: BusMode::Read,
            write_requester: None,
            last_batch_ms: None,
            last_send_ms: now,
            electrical_snapshot: String::new(),
            info_snapshot: String::new(),
            reset_requested_ms: None,
        })
    }

    // ========================================================================
    // Server events
    // ========================================================================

    /// A WebSocket handshake completed on `fd`
    pub fn on_handshake(&mut self, fd: SocketId, bystanders: &[SocketId]) -> Registration {
        let now = self.clock.now_ms();
        self.sessions.register(fd, bystanders, now)
    }

    /// A text frame arrived on `fd`; it is processed on a later tick
    pub fn on_text(&mut self, fd: SocketId, text: &str) -> GatewayResult<()> {
        self.sessions.enqueue_inbound(fd, text).inspect_err(|e| {
            warn!("Session {}: inbound message dropped: {}", fd, e);
        })
    }

    /// The socket `fd` was closed by the peer
    pub fn on_close(&mut self, fd: SocketId) {
        if let Some(session) = self.sessions.remove(fd) {
            info!("Session {} closed", fd);
            for &bystander in &session.bystanders {
                self.server.close(bystander);
            }
        }
    }

    /// Check a login body and issue a key
    pub fn login(&mut self, body: &str) -> GatewayResult<LoginReply> {
        let request = parse_login(body)?;
        let outcome = check_credentials(
            &request,
            &self.settings,
            self.sessions.administrators(),
            self.config.simultaneous_admins,
            self.clock.wall_time(),
        );
        match outcome {
            LoginOutcome::Granted(access) => {
                let key = self.keys.issue(access, self.clock.now_ms(), &self.store, &mut self.server);
                Ok(LoginReply::granted(key, access))
            }
            LoginOutcome::AdminLimit => {
                info!("Supervisor login refused: administrator limit reached");
                Ok(LoginReply::admin_limit())
            }
            LoginOutcome::BadCredential => {
                warn!("Bad login for '{}'", request.username);
                Err(GatewayError::BadLogin)
            }
        }
    }

    /// New network state from the platform. A changed status text pushes the
    /// settings and info views to every session.
    pub fn set_network(&mut self, network: NetworkInfo) {
        let status_changed = network.ethernet_status != self.network.ethernet_status;
        self.network = network;
        if status_changed {
            info!("Ethernet status: {}", self.network.ethernet_status);
            self.push_settings(Audience::All);
            self.sessions.broadcast(Audience::All, &info_view(&self.network));
        }
    }

    pub fn link_down(&mut self) {
        let now = self.clock.now_ms();
        self.link.link_down(now);
    }

    pub fn link_up(&mut self) {
        self.link.link_up();
    }

    fn push_settings(&mut self, audience: Audience) {
        let mut ctx = ProtocolContext {
            sessions: &mut self.sessions,
            keys: &self.keys,
            settings: &mut self.settings,
            store: &self.store,
            network: &self.network,
        };
        push_settings(&mut ctx, audience);
    }

    /// Close a session and every socket tied to it
    fn drop_session(&mut self, fd: SocketId) {
        if let Some(session) = self.sessions.remove(fd) {
            self.server.close(fd);
            for &bystander in &session.bystanders {
                self.server.close(bystander);
            }
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance every engine by one bounded step
    pub fn tick(&mut self) -> Option<RestartReason> {
        let now = self.clock.now_ms();
        self.master.poll_serial(now);
        self.process_inbound(now);
        self.complete_startups();
        self.send_turn(now);
        self.evict_idle(now);
        self.step_bus(now);
        self.check_restart(now)
    }

    fn process_inbound(&mut self, now: u64) {
        let slot = self.sessions.next_inbound_slot();
        let Some(session) = self.sessions.slot_mut(slot) else {
            return;
        };
        let Some(text) = session.inbound.pop() else {
            return;
        };
        let fd = session.fd;
        session.last_inbound_ms = now;
        session.awaiting_response = false;

        let mut ctx = ProtocolContext {
            sessions: &mut self.sessions,
            keys: &self.keys,
            settings: &mut self.settings,
            store: &self.store,
            network: &self.network,
        };
        match handle_message(&mut ctx, fd, &text) {
            Some(Action::ScheduleRestart) => {
                self.reset_requested_ms.get_or_insert(now);
            }
            Some(Action::SubmitWrite { fd, command }) => match self.master.submit_write(command) {
                Ok(()) => self.write_requester = Some(fd),
                Err(e) => {
                    warn!("Session {}: write refused: {}", fd, e);
                    if let Some(session) = self.sessions.get_mut(fd) {
                        session.queue(WRITE_NOT_SUCCESSFUL);
                    }
                }
            },
            None => {}
        }
    }

    /// Authenticated sessions that acknowledged the meter view finish startup
    fn complete_startups(&mut self) {
        for session in self.sessions.iter_mut() {
            if session.authenticated && !session.startup_done && session.confirmed.rdmeter {
                info!("Session {} startup complete", session.fd);
                session.startup_done = true;
                session.queue(VALIDATE);
            }
        }
    }

    fn send_turn(&mut self, now: u64) {
        if now.saturating_sub(self.last_send_ms) < self.config.send_interval_ms {
            return;
        }

        if let Some(candidate) = self.sessions.evict_candidate() {
            match self.server.send_text(candidate, CLOSE_NOTICE) {
                Ok(()) => {
                    info!("Session {} sent close notice", candidate);
                    self.sessions.clear_evict_candidate();
                }
                Err(e) => warn!("Close notice to {} failed: {}", candidate, e),
            }
            self.sessions.next_outbound_slot();
            self.last_send_ms = now;
            return;
        }

        let Some(slot) = self.sessions.next_outbound_slot() else {
            return;
        };
        let Some(session) = self.sessions.slot_mut(slot) else {
            return;
        };
        if session.awaiting_response {
            return;
        }

        let heartbeat_due = session.startup_done
            && now.saturating_sub(session.last_heartbeat_ms) >= self.config.heartbeat_period_ms;
        let outgoing = if heartbeat_due {
            Outgoing::Heartbeat
        } else if !session.outbound.is_empty() {
            Outgoing::Queued
        } else if session.wants_electrical && !self.electrical_snapshot.is_empty() {
            Outgoing::Electrical
        } else if session.wants_infoconfig && !self.info_snapshot.is_empty() {
            Outgoing::InfoConfig
        } else {
            return;
        };

        let body = match outgoing {
            Outgoing::Heartbeat => {
                let elapsed_s = self
                    .last_batch_ms
                    .map_or(0, |at| now.saturating_sub(at) / 1000);
                heartbeat(self.clock.wall_time(), elapsed_s)
            }
            Outgoing::Queued => session.outbound.front().cloned().unwrap_or_default(),
            Outgoing::Electrical => self.electrical_snapshot.clone(),
            Outgoing::InfoConfig => self.info_snapshot.clone(),
        };
        let frame = format!("{}*{}", body, session.out_count);
        session.last_outbound_ms = now;

        match self.server.send_text(session.fd, &frame) {
            Ok(()) => {
                debug!("Session {} <- {:?} #{}", session.fd, outgoing, session.out_count);
                session.awaiting_response = true;
                session.out_count = session.out_count.wrapping_add(1);
                match outgoing {
                    Outgoing::Heartbeat => session.last_heartbeat_ms = now,
                    Outgoing::Queued => {
                        session.outbound.pop();
                    }
                    Outgoing::Electrical => session.wants_electrical = false,
                    Outgoing::InfoConfig => session.wants_infoconfig = false,
                }
            }
            Err(e) => warn!("Send to session {} failed: {}", session.fd, e),
        }
        self.last_send_ms = now;
    }

    fn evict_idle(&mut self, now: u64) {
        loop {
            let Some(fd) = self.sessions.idle_sessions(now, &self.config).next() else {
                break;
            };
            info!("Session {} idle, removing", fd);
            self.drop_session(fd);
            self.last_send_ms = now;
        }
    }

    fn step_bus(&mut self, now: u64) {
        match self.bus {
            BusMode::Read => {
                if self.master.has_pending_write() && self.master.at_request_boundary() {
                    debug!("Bus switched to write");
                    self.bus = BusMode::Write;
                    return;
                }
                let due = self.sweep_active
                    || self
                        .last_batch_ms
                        .is_none_or(|at| now.saturating_sub(at) > self.config.read_interval_ms);
                if !due {
                    return;
                }
                self.sweep_active = true;
                if self.master.step_read(now) == ReadProgress::BatchReady {
                    self.sweep_active = false;
                    self.finish_batch(now);
                }
            }
            BusMode::Write => {
                let reply = match self.master.step_write(now) {
                    WriteProgress::InFlight => return,
                    WriteProgress::Idle => None,
                    WriteProgress::Succeeded => {
                        self.master.restart_sweep();
                        Some(WRITE_SUCCESSFUL.to_string())
                    }
                    WriteProgress::Failed(fault) => Some(write_failed(fault.code())),
                };
                self.bus = BusMode::Read;
                let requester = self.write_requester.take();
                if let (Some(reply), Some(fd)) = (reply, requester) {
                    if let Some(session) = self.sessions.get_mut(fd) {
                        session.queue(reply);
                    }
                }
            }
        }
    }

    fn finish_batch(&mut self, now: u64) {
        match self.sweep {
            Sweep::Info => {
                self.info_snapshot = self.master.render_report(INFO_REPORT_PREFIX);
                self.master.set_enable_set(EnableSet::Electrical);
                self.sweep = Sweep::Electrical;
                info!("Info snapshot ready ({} bytes)", self.info_snapshot.len());
            }
            Sweep::Electrical => {
                self.electrical_snapshot = self.master.render_report(ELECTRICAL_REPORT_PREFIX);
                self.last_batch_ms = Some(now);
                for session in self.sessions.iter_mut() {
                    if session.startup_done {
                        session.wants_electrical = true;
                    }
                }
            }
        }
    }

    fn check_restart(&mut self, now: u64) -> Option<RestartReason> {
        if self
            .reset_requested_ms
            .is_some_and(|at| now.saturating_sub(at) > self.config.restart_delay_ms)
        {
            return Some(RestartReason::ResetCommand);
        }
        if self.link.expired(now, self.config.link_down_grace_ms) {
            self.network.clear_ethernet();
            return Some(RestartReason::EthernetLinkLost);
        }
        None
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[inline]
    pub fn server(&self) -> &W {
        &self.server
    }

    #[inline]
    pub fn server_mut(&mut self) -> &mut W {
        &mut self.server
    }

    #[inline]
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    #[inline]
    pub fn sessions_mut(&mut self) -> &mut SessionTable {
        &mut self.sessions
    }

    #[inline]
    pub fn master(&self) -> &ModbusMaster<L> {
        &self.master
    }

    #[inline]
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    #[inline]
    pub fn keys(&self) -> &KeyBindingTable {
        &self.keys
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn network(&self) -> &NetworkInfo {
        &self.network
    }

    /// Last electrical report, empty until the first electrical sweep
    #[inline]
    pub fn electrical_snapshot(&self) -> &str {
        &self.electrical_snapshot
    }

    /// Device info report from the boot sweep
    #[inline]
    pub fn info_snapshot(&self) -> &str {
        &self.info_snapshot
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::constants::FC_READ_HOLDING_REGISTERS;
    use crate::crc::Crc16;
    use crate::protocol::{LOAD_LOGON, START};
    use crate::serial::ScriptedLink;
    use crate::server::RecordingServer;
    use crate::settings::MemoryStore;

    type TestGateway = Gateway<ScriptedLink, RecordingServer, MemoryStore, ManualClock>;

    /// Meter answering every read with zeroed registers and echoing writes
    fn meter() -> ScriptedLink {
        ScriptedLink::with_responder(|frame| {
            let mut reply = match frame.get(1).copied() {
                Some(FC_READ_HOLDING_REGISTERS) => {
                    let quantity = u16::from_be_bytes([frame[4], frame[5]]) as usize;
                    let mut reply = vec![frame[0], frame[1], (quantity * 2) as u8];
                    reply.resize(3 + quantity * 2, 0);
                    reply
                }
                Some(_) => frame[..frame.len() - 2].to_vec(),
                None => return None,
            };
            let crc = Crc16::checksum(&reply);
            reply.extend_from_slice(&crc);
            Some(reply)
        })
    }

    fn gateway_with(config: GatewayConfig, link: ScriptedLink) -> TestGateway {
        Gateway::new(
            config,
            Catalogue::wago_879_3040(),
            link,
            RecordingServer::new(),
            MemoryStore::new(),
            ManualClock::new(0),
        )
        .unwrap()
    }

    fn gateway() -> TestGateway {
        gateway_with(GatewayConfig::default(), ScriptedLink::new())
    }

    fn login_key(gw: &mut TestGateway, username: &str, password: &str) -> u32 {
        let body = format!(r#"{{"username":"{username}","password":"{password}"}}"#);
        gw.login(&body).unwrap().key.parse().unwrap()
    }

    fn run_ticks(gw: &mut TestGateway, ticks: usize, step_ms: u64) {
        for _ in 0..ticks {
            gw.clock().advance(step_ms);
            gw.tick();
        }
    }

    #[test]
    fn test_outbound_fairness() {
        let mut gw = gateway_with(GatewayConfig::default().with_max_sessions(4), ScriptedLink::new());
        for fd in [11, 12, 13] {
            gw.on_handshake(fd, &[]);
            gw.sessions_mut().get_mut(fd).unwrap().queue(format!("hello{fd}"));
            gw.sessions_mut().get_mut(fd).unwrap().queue(format!("again{fd}"));
        }

        run_ticks(&mut gw, 3, 200);

        for fd in [11, 12, 13] {
            assert_eq!(gw.server().sent_to(fd), vec![format!("hello{fd}*0")]);
        }
    }

    #[test]
    fn test_outbound_fairness_with_freed_slot() {
        let mut gw = gateway_with(GatewayConfig::default().with_max_sessions(4), ScriptedLink::new());
        for fd in [11, 12, 13] {
            gw.on_handshake(fd, &[]);
        }
        gw.on_close(12);
        for fd in [11, 13] {
            gw.sessions_mut().get_mut(fd).unwrap().queue(format!("hello{fd}"));
        }

        run_ticks(&mut gw, 2, 200);

        for fd in [11, 13] {
            assert_eq!(gw.server().sent_to(fd), vec![format!("hello{fd}*0")]);
        }
        assert!(gw.server().sent_to(12).is_empty());
    }

    #[test]
    fn test_awaiting_response_blocks_second_frame() {
        let mut gw = gateway();
        gw.on_handshake(5, &[]);
        gw.sessions_mut().get_mut(5).unwrap().queue("one");
        gw.sessions_mut().get_mut(5).unwrap().queue("two");

        run_ticks(&mut gw, 6, 200);
        assert_eq!(gw.server().sent_to(5), vec!["one*0"]);

        gw.on_text(5, "&console#persistent*0*0").unwrap();
        run_ticks(&mut gw, 3, 200);
        assert_eq!(gw.server().sent_to(5), vec!["one*0", "two*1"]);
    }

    #[test]
    fn test_overflow_marks_oldest_for_close() {
        let mut gw = gateway();
        for fd in [1, 2, 3] {
            assert!(matches!(gw.on_handshake(fd, &[]), Registration::Accepted { .. }));
        }
        assert_eq!(gw.on_handshake(4, &[]), Registration::Overflow);

        run_ticks(&mut gw, 1, 200);
        assert_eq!(gw.server().sent_to(1), vec![CLOSE_NOTICE]);
        assert_eq!(gw.sessions().evict_candidate(), None);
    }

    #[test]
    fn test_idle_session_reclaimed() {
        let mut gw = gateway();
        gw.on_handshake(7, &[70, 71]);
        gw.on_handshake(8, &[]);
        gw.clock().advance(3000);
        gw.on_text(8, "&console#persistent*0*0").unwrap();
        run_ticks(&mut gw, 2, 1);

        run_ticks(&mut gw, 1, 2000);
        assert!(gw.sessions().get(7).is_none());
        assert!(gw.sessions().get(8).is_some());
        assert_eq!(gw.server().closed(), &[7, 70, 71]);
        assert_eq!(gw.on_handshake(9, &[]), Registration::Accepted { slot: 0 });
    }

    #[test]
    fn test_login_and_startup_handshake() {
        let mut gw = gateway();
        let key = login_key(&mut gw, "admin", "admin");
        assert!(gw.server().endpoints().contains(&format!("/ws{key}")));

        gw.on_handshake(3, &[]);
        gw.on_text(3, &format!("&console#new_ws=*{key}*0")).unwrap();
        run_ticks(&mut gw, 1, 200);
        assert_eq!(gw.server().sent_to(3), vec![format!("{START}*0")]);

        gw.on_text(3, &format!("&console#rdmeterz*{key}*1")).unwrap();
        run_ticks(&mut gw, 3, 200);
        let session = gw.sessions().get(3).unwrap();
        assert!(session.startup_done);
        assert_eq!(gw.server().sent_to(3)[1], format!("{VALIDATE}*1"));
    }

    #[test]
    fn test_stale_key_gets_logon_nudge() {
        let mut gw = gateway();
        gw.on_handshake(3, &[]);
        gw.on_text(3, "&console#new_ws=*12345*0").unwrap();
        run_ticks(&mut gw, 1, 200);
        assert_eq!(gw.server().sent_to(3), vec![format!("{LOAD_LOGON}*0")]);
    }

    #[test]
    fn test_bad_login_and_admin_limit() {
        let mut gw = gateway();
        assert!(matches!(
            gw.login(r#"{"username":"admin","password":"x"}"#),
            Err(GatewayError::BadLogin)
        ));

        for fd in [1, 2] {
            let key = login_key(&mut gw, "admin", "admin");
            gw.on_handshake(fd, &[]);
            gw.on_text(fd, &format!("&console#new_ws=*{key}*0")).unwrap();
        }
        run_ticks(&mut gw, 3, 200);
        assert_eq!(gw.sessions().administrators(), 2);

        let reply = gw
            .login(r#"{"username":"supervisor","password":"supervisor"}"#)
            .unwrap();
        assert_eq!(reply, LoginReply::admin_limit());
    }

    #[test]
    fn test_boot_sweeps_fill_snapshots() {
        let mut gw = gateway_with(GatewayConfig::default(), meter());
        for _ in 0..2000 {
            gw.clock().advance(25);
            gw.tick();
            if !gw.electrical_snapshot().is_empty() {
                break;
            }
        }

        assert!(gw.info_snapshot().starts_with(INFO_REPORT_PREFIX));
        assert!(gw.info_snapshot().contains("Serial number"));
        assert!(gw.electrical_snapshot().starts_with(ELECTRICAL_REPORT_PREFIX));
        assert!(!gw.electrical_snapshot().contains("Error("));
    }

    #[test]
    fn test_write_round_trip() {
        let mut gw = gateway_with(GatewayConfig::default(), meter());
        let key = login_key(&mut gw, "admin", "admin");
        gw.on_handshake(4, &[]);
        gw.on_text(4, &format!("&console#modbuswr?01 06 40 03 00 02*{key}*0"))
            .unwrap();

        run_ticks(&mut gw, 40, 25);
        let queued = gw
            .sessions()
            .get(4)
            .unwrap()
            .outbound
            .iter()
            .any(|m| m == WRITE_SUCCESSFUL);
        let sent = gw
            .server()
            .sent_to(4)
            .iter()
            .any(|m| m.starts_with(WRITE_SUCCESSFUL));
        assert!(queued || sent);
        assert!(gw
            .master()
            .link()
            .sent()
            .iter()
            .any(|frame| frame[..6] == [0x01, 0x06, 0x40, 0x03, 0x00, 0x02]));
    }

    #[test]
    fn test_write_busy_reports_not_successful() {
        let mut gw = gateway();
        let key = login_key(&mut gw, "admin", "admin");
        gw.on_handshake(4, &[]);
        gw.on_text(4, &format!("&console#modbuswr?01 06 40 03 00 02*{key}*0"))
            .unwrap();
        gw.on_text(4, &format!("&console#modbuswr?01 06 40 03 00 03*{key}*1"))
            .unwrap();

        run_ticks(&mut gw, 4, 1);
        let session = gw.sessions().get(4).unwrap();
        assert!(session.outbound.iter().any(|m| m == WRITE_NOT_SUCCESSFUL));
    }

    #[test]
    fn test_reset_command_restarts_after_delay() {
        let mut gw = gateway();
        let key = login_key(&mut gw, "admin", "admin");
        gw.on_handshake(2, &[]);
        gw.on_text(2, &format!("&console#reset*{key}*0")).unwrap();

        assert_eq!(gw.tick(), None);
        gw.clock().advance(1000);
        assert_eq!(gw.tick(), None);
        gw.clock().advance(1);
        assert_eq!(gw.tick(), Some(RestartReason::ResetCommand));
    }

    #[test]
    fn test_link_down_past_grace_restarts() {
        let mut gw = gateway();
        gw.link_down();
        gw.clock().advance(10_000);
        assert_eq!(gw.tick(), None);

        gw.link_up();
        gw.link_down();
        gw.clock().advance(10_001);
        assert_eq!(gw.tick(), Some(RestartReason::EthernetLinkLost));
        assert_eq!(gw.network().eth_ip, " ");
    }

    #[test]
    fn test_status_change_pushes_views() {
        let mut gw = gateway();
        gw.on_handshake(1, &[]);
        gw.set_network(NetworkInfo {
            ethernet_status: "Connected".into(),
            eth_ip: "10.0.0.5".into(),
            ..NetworkInfo::default()
        });

        let queued: Vec<&String> = gw.sessions().get(1).unwrap().outbound.iter().collect();
        assert_eq!(queued.len(), 2);
        assert!(queued[0].starts_with("&console#setting="));
        assert!(queued[1].contains("[Ethernet]"));

        gw.set_network(NetworkInfo {
            ethernet_status: "Connected".into(),
            ..NetworkInfo::default()
        });
        assert_eq!(gw.sessions().get(1).unwrap().outbound.len(), 2);
    }
}
