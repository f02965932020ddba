//! # Login and Rotating Keys
//!
//! A successful login issues a numeric key bound to an access level and to
//! one of [`ENDPOINT_SLOTS`] dynamic WebSocket endpoints. Slots are reused
//! round-robin: issuing a key into a slot retires the key it held before,
//! moves the slot's endpoint to `/ws<key>` and persists the binding so it
//! survives a restart.
//!
//! Keys bind a browser to a session; they are not a security boundary.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::ENDPOINT_SLOTS;
use crate::error::{GatewayError, GatewayResult};
use crate::server::EndpointRegistry;
use crate::session::AccessLevel;
use crate::settings::{load_or_default, persist, GatewaySettings, SettingsStore};

/// Username of the time-derived service account
pub const SERVICE_USERNAME: &str = "superadmin";

/// Reply text when supervisor access is refused
pub const ADMIN_LIMIT_MESSAGE: &str = "No empty slot available for Supervisor access.";

// ============================================================================
// Key binding table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    /// 0 means the slot holds no key
    pub key: u32,
    pub access: AccessLevel,
    pub endpoint: String,
}

/// Persisted key/endpoint bindings
#[derive(Debug, Clone)]
pub struct KeyBindingTable {
    bindings: Vec<KeyBinding>,
    next_slot: usize,
}

impl KeyBindingTable {
    /// Load bindings from `store`, writing defaults for missing slots
    pub fn load<S: SettingsStore + ?Sized>(store: &S) -> Self {
        let bindings = (0..ENDPOINT_SLOTS)
            .map(|slot| {
                let key = load_or_default(store, &format!("key{slot}"), "key", "0");
                let access = load_or_default(
                    store,
                    &format!("access{slot}"),
                    "access",
                    AccessLevel::Supervisor.as_code(),
                );
                let endpoint =
                    load_or_default(store, &format!("uri{slot}"), "uri", &format!("/ws{slot}"));
                KeyBinding {
                    key: key.trim().parse().unwrap_or(0),
                    access: AccessLevel::from_code(&access),
                    endpoint,
                }
            })
            .collect();
        let next_slot = load_or_default(store, "uriidx", "idx", "0")
            .trim()
            .parse::<usize>()
            .unwrap_or(0)
            % ENDPOINT_SLOTS;

        Self { bindings, next_slot }
    }

    /// Register every slot's endpoint with the server
    pub fn register_all<R: EndpointRegistry + ?Sized>(&self, registry: &mut R) {
        for binding in &self.bindings {
            if let Err(e) = registry.register_endpoint(&binding.endpoint) {
                warn!("Endpoint {} not registered: {}", binding.endpoint, e);
            }
        }
    }

    /// Access level granted by `key`; zero never matches
    pub fn lookup(&self, key: u32) -> Option<AccessLevel> {
        if key == 0 {
            return None;
        }
        self.bindings
            .iter()
            .find(|binding| binding.key == key)
            .map(|binding| binding.access)
    }

    /// Issue a key for `access` into the next slot.
    ///
    /// The key is derived from `now_ms`, bumped until it is nonzero and not
    /// held by any slot.
    pub fn issue<S, R>(&mut self, access: AccessLevel, now_ms: u64, store: &S, registry: &mut R) -> u32
    where
        S: SettingsStore + ?Sized,
        R: EndpointRegistry + ?Sized,
    {
        let mut key = now_ms as u32;
        while key == 0 || self.bindings.iter().any(|binding| binding.key == key) {
            key = key.wrapping_add(1);
        }

        let slot = self.next_slot;
        let endpoint = format!("/ws{key}");
        persist(store, &format!("key{slot}"), "key", &key.to_string());
        persist(store, &format!("access{slot}"), "access", access.as_code());

        registry.unregister_endpoint(&self.bindings[slot].endpoint);
        persist(store, &format!("uri{slot}"), "uri", &endpoint);
        if let Err(e) = registry.register_endpoint(&endpoint) {
            warn!("Endpoint {} not registered: {}", endpoint, e);
        }
        self.bindings[slot] = KeyBinding { key, access, endpoint };

        self.next_slot = (slot + 1) % ENDPOINT_SLOTS;
        persist(store, "uriidx", "idx", &self.next_slot.to_string());
        info!("Issued {} key in slot {}", access.as_str(), slot);
        key
    }

    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    /// Slot the next key goes into
    #[inline]
    pub fn next_slot(&self) -> usize {
        self.next_slot
    }
}

// ============================================================================
// Login
// ============================================================================

/// Body posted to the login endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Result of checking credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Granted(AccessLevel),
    /// Valid supervisor credentials, but too many administrators are online
    AdminLimit,
    BadCredential,
}

/// Service password for `wall`: `HHMMDDMMYYYY`
pub fn service_password(wall: NaiveDateTime) -> String {
    wall.format("%H%M%d%m%Y").to_string()
}

/// Check a login request against the stored credentials
pub fn check_credentials(
    request: &LoginRequest,
    settings: &GatewaySettings,
    live_admins: usize,
    admin_limit: usize,
    wall: NaiveDateTime,
) -> LoginOutcome {
    if request.username == settings.admin.username && request.password == settings.admin.password {
        return LoginOutcome::Granted(AccessLevel::Administrator);
    }
    if request.username == settings.supervisor.username
        && request.password == settings.supervisor.password
    {
        return if live_admins >= admin_limit {
            LoginOutcome::AdminLimit
        } else {
            LoginOutcome::Granted(AccessLevel::Supervisor)
        };
    }
    if request.username == SERVICE_USERNAME && request.password == service_password(wall) {
        return LoginOutcome::Granted(AccessLevel::Administrator);
    }
    LoginOutcome::BadCredential
}

/// JSON answer to a login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReply {
    pub key: String,
    pub msg: String,
}

impl LoginReply {
    pub fn granted(key: u32, access: AccessLevel) -> Self {
        let msg = match access {
            AccessLevel::Administrator => "Administrator",
            AccessLevel::Supervisor => "Supervisor",
        };
        Self {
            key: key.to_string(),
            msg: msg.to_string(),
        }
    }

    pub fn admin_limit() -> Self {
        Self {
            key: "0".to_string(),
            msg: ADMIN_LIMIT_MESSAGE.to_string(),
        }
    }

    pub fn to_json(&self) -> GatewayResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse a login body
pub fn parse_login(body: &str) -> GatewayResult<LoginRequest> {
    serde_json::from_str(body).map_err(|e| GatewayError::invalid_data(format!("login body: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::RecordingServer;
    use crate::settings::MemoryStore;
    use chrono::NaiveDate;

    fn wall() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap()
    }

    fn request(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_fresh_table_defaults() {
        let store = MemoryStore::new();
        let table = KeyBindingTable::load(&store);

        assert_eq!(table.bindings().len(), ENDPOINT_SLOTS);
        assert_eq!(table.bindings()[3].endpoint, "/ws3");
        assert_eq!(table.lookup(0), None);
        assert_eq!(table.next_slot(), 0);
        assert_eq!(store.read("uri5", "uri").unwrap().as_deref(), Some("/ws5"));
    }

    #[test]
    fn test_issue_moves_endpoint_and_persists() {
        let store = MemoryStore::new();
        let mut server = RecordingServer::new();
        let mut table = KeyBindingTable::load(&store);
        table.register_all(&mut server);

        let key = table.issue(AccessLevel::Administrator, 4242, &store, &mut server);
        assert_eq!(key, 4242);
        assert_eq!(table.lookup(4242), Some(AccessLevel::Administrator));
        assert!(server.endpoints().contains(&"/ws4242".to_string()));
        assert!(!server.endpoints().contains(&"/ws0".to_string()));
        assert_eq!(server.endpoints().len(), ENDPOINT_SLOTS);

        let reloaded = KeyBindingTable::load(&store);
        assert_eq!(reloaded.lookup(4242), Some(AccessLevel::Administrator));
        assert_eq!(reloaded.next_slot(), 1);
    }

    #[test]
    fn test_issue_keys_are_unique_and_nonzero() {
        let store = MemoryStore::new();
        let mut server = RecordingServer::new();
        let mut table = KeyBindingTable::load(&store);

        let first = table.issue(AccessLevel::Supervisor, 0, &store, &mut server);
        let second = table.issue(AccessLevel::Supervisor, 0, &store, &mut server);
        let third = table.issue(AccessLevel::Supervisor, 1, &store, &mut server);
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 3);
    }

    #[test]
    fn test_slots_rotate_and_retire_old_keys() {
        let store = MemoryStore::new();
        let mut server = RecordingServer::new();
        let mut table = KeyBindingTable::load(&store);

        let keys: Vec<u32> = (0..ENDPOINT_SLOTS as u64)
            .map(|i| table.issue(AccessLevel::Supervisor, 100 + i, &store, &mut server))
            .collect();
        assert!(keys.iter().all(|&key| table.lookup(key).is_some()));
        assert_eq!(table.next_slot(), 0);

        table.issue(AccessLevel::Administrator, 500, &store, &mut server);
        assert_eq!(table.lookup(keys[0]), None);
        assert!(table.lookup(keys[1]).is_some());
    }

    #[test]
    fn test_check_credentials() {
        let settings = GatewaySettings::default();

        assert_eq!(
            check_credentials(&request("admin", "admin"), &settings, 0, 2, wall()),
            LoginOutcome::Granted(AccessLevel::Administrator)
        );
        assert_eq!(
            check_credentials(&request("supervisor", "supervisor"), &settings, 1, 2, wall()),
            LoginOutcome::Granted(AccessLevel::Supervisor)
        );
        assert_eq!(
            check_credentials(&request("supervisor", "supervisor"), &settings, 2, 2, wall()),
            LoginOutcome::AdminLimit
        );
        assert_eq!(
            check_credentials(&request("admin", "nope"), &settings, 0, 2, wall()),
            LoginOutcome::BadCredential
        );
    }

    #[test]
    fn test_service_account_uses_wall_clock() {
        let settings = GatewaySettings::default();
        assert_eq!(service_password(wall()), "090507032024");
        assert_eq!(
            check_credentials(&request("superadmin", "090507032024"), &settings, 5, 2, wall()),
            LoginOutcome::Granted(AccessLevel::Administrator)
        );
        assert_eq!(
            check_credentials(&request("superadmin", "101010102024"), &settings, 0, 2, wall()),
            LoginOutcome::BadCredential
        );
    }

    #[test]
    fn test_login_reply_json() {
        let reply: LoginReply =
            serde_json::from_str(&LoginReply::granted(77, AccessLevel::Supervisor).to_json().unwrap())
                .unwrap();
        assert_eq!(reply.key, "77");
        assert_eq!(reply.msg, "Supervisor");
        assert_eq!(LoginReply::admin_limit().key, "0");
        assert!(parse_login("{\"username\":\"admin\"}").is_err());
    }
}
