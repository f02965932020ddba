//! # Console Protocol
//!
//! Inbound text messages share one envelope:
//!
//! ```text
//! &console#<tag>[=|?]<payload>*<key>*<counter>
//! ```
//!
//! The key authenticates the session when it matches a binding in the
//! [`KeyBindingTable`]; authentication sticks to the session until another
//! session presents the same key. The counter detects a client that lost
//! messages, in which case the session's queues are rebuilt.
//!
//! Lifecycle tags (`new_ws`, `start`, `get=*`, `close`, ...) are handled for
//! every session. Everything else requires an authenticated session and
//! otherwise yields `&console#load=logon`.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::KeyBindingTable;
use crate::constants::CONSOLE_PREFIX;
use crate::frame::parse_hex_command;
use crate::network::NetworkInfo;
use crate::session::{Audience, Session, SessionTable, SocketId};
use crate::settings::{GatewaySettings, SettingsStore};
use crate::views::{info_view, settings_view, wrmeter_view};

pub const LOAD_LOGON: &str = "&console#load=logon";
pub const START: &str = "&console#start";
pub const VALIDATE: &str = "&console#validate=1";
pub const CLOSE_NOTICE: &str = "&console#close";
pub const CLIENTS_GET_END: &str = "&console#clients_get_end";
pub const UPLOAD_NOW: &str = "&console#uploadnow";
pub const WRITE_SUCCESSFUL: &str = "&console#mbresp=Write Successful";
pub const WRITE_NOT_SUCCESSFUL: &str = "&console#mbresp=Write Not Successful";

/// Bulk state dump sent to a session that restarted mid-dump
pub const GET_ALL: [&str; 6] = [
    "&console#get=start",
    "&console#get=set_loginad",
    "&console#get=set_loginsv",
    "&console#get=set_ap_password",
    "&console#get=set_ethernet",
    "&console#get=end",
];

/// Reply to a failed write
pub fn write_failed(code: u8) -> String {
    format!("&console#mbresp=Error({code})")
}

// ============================================================================
// Parsing
// ============================================================================

/// Split inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Everything between the prefix and the first `*`, starting with `#`
    pub tag: &'a str,
    pub key: u32,
    pub counter: u32,
}

/// Leading decimal digits of `text`, 0 when there are none
fn leading_u32(text: &str) -> u32 {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().unwrap_or(0)
}

impl<'a> Envelope<'a> {
    /// Parse a console message; `None` when the prefix is missing
    pub fn parse(text: &'a str) -> Option<Self> {
        let body = text.strip_prefix(CONSOLE_PREFIX)?;
        let mut parts = body.splitn(3, '*');
        let tag = parts.next().unwrap_or_default();
        let key = parts.next().map(leading_u32).unwrap_or(0);
        let counter = parts.next().map(leading_u32).unwrap_or(0);
        Some(Self { tag, key, counter })
    }
}

/// Settings section addressed by `#setting=<section>?<json>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSection {
    AdminLogon,
    SupervisorLogon,
    WifiPassword,
    Ethernet,
}

impl SettingSection {
    /// Confirmation sent back to the requester
    pub fn confirmation(self) -> &'static str {
        match self {
            Self::AdminLogon => "&console#confirm_set_logonad",
            Self::SupervisorLogon => "&console#confirm_set_logonsv",
            Self::WifiPassword => "&console#confirm_set_wifiap",
            Self::Ethernet => "&console#confirm_set_ethernet",
        }
    }
}

/// Inbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    NewWs,
    Start,
    Reset,
    Close,
    Persistent,
    ValidateAck,
    GetStart,
    GetEnd,
    WaitUpload,
    ModbusWrite(&'a str),
    UpdateSetting(SettingSection, &'a str),
    UnknownSetting(&'a str),
    RequestRdmeter,
    AckRdmeter,
    RequestSetting,
    AckSetting,
    RequestWrmeter,
    AckWrmeter,
    RequestInfor,
    AckInfor,
    AckInform,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Classify a tag by prefix
    pub fn parse(tag: &'a str) -> Self {
        const FIXED: [(&str, Command<'static>); 18] = [
            ("#new_ws=", Command::NewWs),
            ("#start", Command::Start),
            ("#reset", Command::Reset),
            ("#close", Command::Close),
            ("#persistent", Command::Persistent),
            ("#validate=1z", Command::ValidateAck),
            ("#get=start", Command::GetStart),
            ("#get=end", Command::GetEnd),
            ("#waitupload", Command::WaitUpload),
            ("#rdmeter?", Command::RequestRdmeter),
            ("#rdmeterz", Command::AckRdmeter),
            ("#setting?", Command::RequestSetting),
            ("#settingz", Command::AckSetting),
            ("#wrmeter?", Command::RequestWrmeter),
            ("#wrmeterz", Command::AckWrmeter),
            ("#infor?", Command::RequestInfor),
            ("#inforz", Command::AckInfor),
            ("#informz", Command::AckInform),
        ];

        if let Some(command) = tag.strip_prefix("#modbuswr?") {
            return Self::ModbusWrite(command);
        }
        if let Some(setting) = tag.strip_prefix("#setting=") {
            const SECTIONS: [(&str, SettingSection); 4] = [
                ("logonad?", SettingSection::AdminLogon),
                ("logonsv?", SettingSection::SupervisorLogon),
                ("wifipass?", SettingSection::WifiPassword),
                ("ethernet?", SettingSection::Ethernet),
            ];
            return SECTIONS
                .iter()
                .find_map(|(name, section)| {
                    setting
                        .strip_prefix(name)
                        .map(|payload| Self::UpdateSetting(*section, payload))
                })
                .unwrap_or(Self::UnknownSetting(setting));
        }
        FIXED
            .iter()
            .find(|(prefix, _)| tag.starts_with(prefix))
            .map(|(_, command)| *command)
            .unwrap_or(Self::Unknown(tag))
    }

    /// Handled without an authenticated session
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::NewWs
                | Self::Start
                | Self::Close
                | Self::Persistent
                | Self::ValidateAck
                | Self::GetStart
                | Self::GetEnd
        )
    }
}

// ============================================================================
// Handling
// ============================================================================

/// Work the protocol hands back to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Restart the gateway after the restart delay
    ScheduleRestart,
    /// Forward a raw write command to the Modbus master
    SubmitWrite { fd: SocketId, command: Vec<u8> },
}

/// State the protocol handler reads and updates
pub struct ProtocolContext<'a, S: SettingsStore + ?Sized> {
    pub sessions: &'a mut SessionTable,
    pub keys: &'a KeyBindingTable,
    pub settings: &'a mut GatewaySettings,
    pub store: &'a S,
    pub network: &'a NetworkInfo,
}

fn queue_get_all(session: &mut Session) {
    for message in GET_ALL {
        session.queue(message);
    }
}

/// Rebuild a session's queues after the client lost track of the counter
fn refresh_connection(session: &mut Session) {
    info!("Session {} out of sequence, refreshing", session.fd);
    session.reset_inbound();
    session.reset_outbound();
    if session.startup_done {
        session.get_started = true;
        queue_get_all(session);
    }
    session.queue(START);
}

/// Authenticate `fd` with `key` and take the key away from any other session
fn bind_key<S: SettingsStore + ?Sized>(ctx: &mut ProtocolContext<'_, S>, fd: SocketId, envelope: &Envelope<'_>) {
    let Some(access) = ctx.keys.lookup(envelope.key) else {
        return;
    };
    for other in ctx.sessions.iter_mut() {
        if other.fd != fd && other.authenticated && other.key == envelope.key {
            info!("Session {} lost its key to session {}", other.fd, fd);
            other.authenticated = false;
            other.key = 0;
        }
    }
    if let Some(session) = ctx.sessions.get_mut(fd) {
        session.authenticated = true;
        session.access = access;
        if envelope.counter != session.in_count && session.in_count != 0 {
            session.in_count = envelope.counter;
            refresh_connection(session);
        }
        session.key = envelope.key;
    }
}

/// Process one inbound message of session `fd`
pub fn handle_message<S: SettingsStore + ?Sized>(
    ctx: &mut ProtocolContext<'_, S>,
    fd: SocketId,
    text: &str,
) -> Option<Action> {
    debug!("WS {} -> {}", fd, text);
    let Some(envelope) = Envelope::parse(text) else {
        debug!("Session {}: ignoring non-console message", fd);
        return None;
    };
    ctx.sessions.get(fd)?;

    bind_key(ctx, fd, &envelope);
    let action = dispatch(ctx, fd, &envelope, Command::parse(envelope.tag));

    if let Some(session) = ctx.sessions.get_mut(fd) {
        session.in_count = session.in_count.wrapping_add(1);
    }
    action
}

fn dispatch<S: SettingsStore + ?Sized>(
    ctx: &mut ProtocolContext<'_, S>,
    fd: SocketId,
    envelope: &Envelope<'_>,
    command: Command<'_>,
) -> Option<Action> {
    let session = ctx.sessions.get_mut(fd)?;

    if !command.is_lifecycle() && !session.authenticated {
        session.queue(LOAD_LOGON);
        return None;
    }

    match command {
        Command::NewWs => {
            if !session.authenticated {
                session.queue(LOAD_LOGON);
            } else if session.get_started {
                queue_get_all(session);
            } else {
                session.queue(START);
                session.in_count = envelope.counter;
                session.wants_electrical = true;
                session.wants_infoconfig = true;
            }
        }
        Command::Start => {
            session.reset_outbound();
            if session.get_started {
                queue_get_all(session);
            } else if session.authenticated {
                let access = session.access;
                session.queue(settings_view(access, ctx.settings, ctx.network));
                session.queue(info_view(ctx.network));
                session.wants_electrical = true;
            } else {
                session.queue(LOAD_LOGON);
            }
        }
        Command::Reset => {
            info!("Session {} requested a restart", fd);
            return Some(Action::ScheduleRestart);
        }
        Command::Close | Command::Persistent | Command::ValidateAck | Command::GetStart => {}
        Command::GetEnd => {
            session.get_started = false;
            ctx.sessions.broadcast(Audience::All, CLIENTS_GET_END);
        }
        Command::WaitUpload => session.queue(UPLOAD_NOW),
        Command::ModbusWrite(hex) => match parse_hex_command(hex) {
            Ok(command) => return Some(Action::SubmitWrite { fd, command }),
            Err(e) => {
                warn!("Session {}: bad write command: {}", fd, e);
                session.queue(WRITE_NOT_SUCCESSFUL);
            }
        },
        Command::UpdateSetting(section, payload) => {
            if !session.is_administrator() {
                warn!("Session {}: settings change refused for {}", fd, session.access.as_str());
                return None;
            }
            apply_setting(ctx, section, payload);
            if let Some(session) = ctx.sessions.get_mut(fd) {
                session.queue(section.confirmation());
            }
            push_settings(ctx, Audience::AllExcept(fd));
        }
        Command::UnknownSetting(setting) => debug!("Session {}: unknown setting '{}'", fd, setting),
        Command::RequestRdmeter => session.wants_electrical = true,
        Command::AckRdmeter => session.confirmed.rdmeter = true,
        Command::RequestSetting => {
            let access = session.access;
            session.queue(settings_view(access, ctx.settings, ctx.network));
        }
        Command::AckSetting => session.confirmed.setting = true,
        Command::RequestWrmeter => {
            let access = session.access;
            session.queue(wrmeter_view(access));
        }
        Command::AckWrmeter => session.confirmed.wrmeter = true,
        Command::RequestInfor => session.queue(info_view(ctx.network)),
        Command::AckInfor => session.confirmed.infor = true,
        Command::AckInform => session.confirmed.inform = true,
        Command::Unknown(tag) => debug!("Session {}: unknown tag '{}'", fd, tag),
    }
    None
}

fn parse_update<T: DeserializeOwned + Default>(payload: &str) -> T {
    serde_json::from_str(payload).unwrap_or_else(|e| {
        warn!("Malformed settings payload: {}", e);
        T::default()
    })
}

fn apply_setting<S: SettingsStore + ?Sized>(
    ctx: &mut ProtocolContext<'_, S>,
    section: SettingSection,
    payload: &str,
) {
    match section {
        SettingSection::AdminLogon => ctx
            .settings
            .apply_admin_credentials(parse_update(payload), ctx.store),
        SettingSection::SupervisorLogon => ctx
            .settings
            .apply_supervisor_credentials(parse_update(payload), ctx.store),
        SettingSection::WifiPassword => ctx.settings.apply_wifi(parse_update(payload), ctx.store),
        SettingSection::Ethernet => ctx.settings.apply_ethernet(parse_update(payload), ctx.store),
    }
}

/// Queue the settings view on every session in `audience`, per its access
pub fn push_settings<S: SettingsStore + ?Sized>(ctx: &mut ProtocolContext<'_, S>, audience: Audience) {
    for session in ctx.sessions.iter_mut() {
        if audience == Audience::AllExcept(session.fd) {
            continue;
        }
        let view = settings_view(session.access, ctx.settings, ctx.network);
        session.queue(view);
    }
}

// ============================================================================
// Tests
// ============================================================================
