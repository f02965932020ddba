//! # Persistent Settings
//!
//! Credentials, Wi-Fi and Ethernet configuration plus the key binding table
//! live in a [`SettingsStore`]: a set of small named JSON documents, each an
//! object of string fields (`username_admin.json` holds `{"username": ".."}`).
//!
//! Storage failures never stop the gateway. A value that cannot be read
//! keeps its default, and a value that is missing is written back with its
//! default on first read.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};

/// Keyed string storage backed by named JSON documents
pub trait SettingsStore {
    /// Read `field` of document `file`; `Ok(None)` when either is absent
    fn read(&self, file: &str, field: &str) -> GatewayResult<Option<String>>;

    /// Write `field` of document `file`, creating the document if needed
    fn write(&self, file: &str, field: &str, value: &str) -> GatewayResult<()>;
}

/// Read a setting, writing `default` when it is missing.
///
/// Read failures log a warning and yield the default without writing.
pub fn load_or_default<S: SettingsStore + ?Sized>(
    store: &S,
    file: &str,
    field: &str,
    default: &str,
) -> String {
    match store.read(file, field) {
        Ok(Some(value)) => value,
        Ok(None) => {
            persist(store, file, field, default);
            default.to_string()
        }
        Err(e) => {
            warn!("Failed to read {}/{}: {}", file, field, e);
            default.to_string()
        }
    }
}

/// Write a setting, logging failures
pub fn persist<S: SettingsStore + ?Sized>(store: &S, file: &str, field: &str, value: &str) {
    if let Err(e) = store.write(file, field, value) {
        warn!("Failed to write {}/{}: {}", file, field, e);
    }
}

// ============================================================================
// Stores
// ============================================================================

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RefCell<HashMap<String, Map<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents written so far
    pub fn file_count(&self) -> usize {
        self.files.borrow().len()
    }
}

impl SettingsStore for MemoryStore {
    fn read(&self, file: &str, field: &str) -> GatewayResult<Option<String>> {
        Ok(self
            .files
            .borrow()
            .get(file)
            .and_then(|doc| doc.get(field))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn write(&self, file: &str, field: &str, value: &str) -> GatewayResult<()> {
        self.files
            .borrow_mut()
            .entry(file.to_string())
            .or_default()
            .insert(field.to_string(), Value::String(value.to_string()));
        Ok(())
    }
}

/// Directory of `<file>.json` documents
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `dir`, which is created if absent
    pub fn open(dir: impl AsRef<Path>) -> GatewayResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir.join(format!("{file}.json"))
    }

    fn load(&self, file: &str) -> GatewayResult<Option<Map<String, Value>>> {
        let path = self.path_of(file);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(doc) => Ok(Some(doc)),
            _ => Err(GatewayError::storage(format!(
                "{} does not hold a JSON object",
                path.display()
            ))),
        }
    }
}

impl SettingsStore for JsonFileStore {
    fn read(&self, file: &str, field: &str) -> GatewayResult<Option<String>> {
        Ok(self
            .load(file)?
            .and_then(|doc| doc.get(field).and_then(Value::as_str).map(str::to_string)))
    }

    fn write(&self, file: &str, field: &str, value: &str) -> GatewayResult<()> {
        // A corrupt document is replaced rather than left blocking writes
        let mut doc = self.load(file).ok().flatten().unwrap_or_default();
        doc.insert(field.to_string(), Value::String(value.to_string()));
        fs::write(self.path_of(file), serde_json::to_string(&doc)?)?;
        debug!("Persisted {}/{}", file, field);
        Ok(())
    }
}

// ============================================================================
// Gateway settings
// ============================================================================

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const DEFAULT_SUPERVISOR_USERNAME: &str = "supervisor";
pub const DEFAULT_SUPERVISOR_PASSWORD: &str = "supervisor";
pub const DEFAULT_WIFI_AP_PASSWORD: &str = "password";
pub const DEFAULT_ETHERNET_ENABLED: &str = "Yes";
pub const DEFAULT_ETHERNET_STATIC: &str = "Yes";
pub const DEFAULT_STATIC_GATEWAY: &str = "192.168.0.1";
pub const DEFAULT_STATIC_SUBNET: &str = "255.255.255.0";
pub const DEFAULT_STATIC_IP: &str = "192.168.0.50";

/// Username/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Ethernet configuration as edited by administrators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetSettings {
    /// `"Yes"` / `"No"`
    pub enabled: String,
    /// Static addressing, `"Yes"` / `"No"`
    pub static_enabled: String,
    pub static_gateway: String,
    pub static_subnet: String,
    pub static_ip: String,
}

impl EthernetSettings {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled == "Yes"
    }
}

/// Credential change carried by `setting=logonad?` / `setting=logonsv?`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsUpdate {
    pub username: Option<String>,
    pub userpsw: Option<String>,
}

/// Payload of `setting=wifipass?`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WifiUpdate {
    pub wifiappsw: Option<String>,
}

/// Payload of `setting=ethernet?`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EthernetUpdate {
    pub ethen: Option<String>,
    pub ethsgway: Option<String>,
    pub ethssub: Option<String>,
    pub ethsen: Option<String>,
    pub ethsip: Option<String>,
}

/// All persisted gateway settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub admin: Credentials,
    pub supervisor: Credentials,
    pub wifi_ap_password: String,
    pub ethernet: EthernetSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            admin: Credentials {
                username: DEFAULT_ADMIN_USERNAME.to_string(),
                password: DEFAULT_ADMIN_PASSWORD.to_string(),
            },
            supervisor: Credentials {
                username: DEFAULT_SUPERVISOR_USERNAME.to_string(),
                password: DEFAULT_SUPERVISOR_PASSWORD.to_string(),
            },
            wifi_ap_password: DEFAULT_WIFI_AP_PASSWORD.to_string(),
            ethernet: EthernetSettings {
                enabled: DEFAULT_ETHERNET_ENABLED.to_string(),
                static_enabled: DEFAULT_ETHERNET_STATIC.to_string(),
                static_gateway: DEFAULT_STATIC_GATEWAY.to_string(),
                static_subnet: DEFAULT_STATIC_SUBNET.to_string(),
                static_ip: DEFAULT_STATIC_IP.to_string(),
            },
        }
    }
}

impl GatewaySettings {
    /// Load every setting, writing defaults for the missing ones.
    ///
    /// Ethernet disabled forces static addressing off.
    pub fn load<S: SettingsStore + ?Sized>(store: &S) -> Self {
        let defaults = Self::default();
        let enabled = load_or_default(store, "ethen", "ethen", &defaults.ethernet.enabled);
        let static_enabled = if enabled == "No" {
            persist(store, "ethsen", "ethsen", "No");
            "No".to_string()
        } else {
            load_or_default(store, "ethsen", "ethsen", &defaults.ethernet.static_enabled)
        };

        Self {
            admin: Credentials {
                username: load_or_default(store, "username_admin", "username", &defaults.admin.username),
                password: load_or_default(store, "userpsw_admin", "userpsw", &defaults.admin.password),
            },
            supervisor: Credentials {
                username: load_or_default(
                    store,
                    "username_svisor",
                    "username",
                    &defaults.supervisor.username,
                ),
                password: load_or_default(
                    store,
                    "userpsw_svisor",
                    "userpsw",
                    &defaults.supervisor.password,
                ),
            },
            wifi_ap_password: load_or_default(store, "wifiappsw", "wifiappsw", &defaults.wifi_ap_password),
            ethernet: EthernetSettings {
                enabled,
                static_enabled,
                static_gateway: load_or_default(
                    store,
                    "ethsgway",
                    "ethsgway",
                    &defaults.ethernet.static_gateway,
                ),
                static_subnet: load_or_default(
                    store,
                    "ethssub",
                    "ethssub",
                    &defaults.ethernet.static_subnet,
                ),
                static_ip: load_or_default(store, "ethsip", "ethsip", &defaults.ethernet.static_ip),
            },
        }
    }

    pub fn apply_admin_credentials<S: SettingsStore + ?Sized>(
        &mut self,
        update: CredentialsUpdate,
        store: &S,
    ) {
        if let Some(username) = update.username {
            persist(store, "username_admin", "username", &username);
            self.admin.username = username;
        }
        if let Some(password) = update.userpsw {
            persist(store, "userpsw_admin", "userpsw", &password);
            self.admin.password = password;
        }
    }

    pub fn apply_supervisor_credentials<S: SettingsStore + ?Sized>(
        &mut self,
        update: CredentialsUpdate,
        store: &S,
    ) {
        if let Some(username) = update.username {
            persist(store, "username_svisor", "username", &username);
            self.supervisor.username = username;
        }
        if let Some(password) = update.userpsw {
            persist(store, "userpsw_svisor", "userpsw", &password);
            self.supervisor.password = password;
        }
    }

    pub fn apply_wifi<S: SettingsStore + ?Sized>(&mut self, update: WifiUpdate, store: &S) {
        if let Some(password) = update.wifiappsw {
            persist(store, "wifiappsw", "wifiappsw", &password);
            self.wifi_ap_password = password;
        }
    }

    /// Apply an Ethernet change. Takes effect on the next restart.
    pub fn apply_ethernet<S: SettingsStore + ?Sized>(&mut self, update: EthernetUpdate, store: &S) {
        let ethernet = &mut self.ethernet;
        let fields = [
            ("ethen", update.ethen, &mut ethernet.enabled),
            ("ethsgway", update.ethsgway, &mut ethernet.static_gateway),
            ("ethssub", update.ethssub, &mut ethernet.static_subnet),
            ("ethsen", update.ethsen, &mut ethernet.static_enabled),
            ("ethsip", update.ethsip, &mut ethernet.static_ip),
        ];
        for (name, value, slot) in fields {
            if let Some(value) = value {
                persist(store, name, name, &value);
                *slot = value;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_writes_defaults() {
        let store = MemoryStore::new();
        let settings = GatewaySettings::load(&store);

        assert_eq!(settings, GatewaySettings::default());
        assert_eq!(
            store.read("username_admin", "username").unwrap().as_deref(),
            Some("admin")
        );
        assert_eq!(store.read("ethsip", "ethsip").unwrap().as_deref(), Some("192.168.0.50"));
        assert_eq!(store.file_count(), 10);
    }

    #[test]
    fn test_load_keeps_stored_values() {
        let store = MemoryStore::new();
        store.write("userpsw_admin", "userpsw", "s3cret").unwrap();
        store.write("wifiappsw", "wifiappsw", "apkey").unwrap();

        let settings = GatewaySettings::load(&store);
        assert_eq!(settings.admin.password, "s3cret");
        assert_eq!(settings.wifi_ap_password, "apkey");
    }

    #[test]
    fn test_ethernet_disabled_forces_static_off() {
        let store = MemoryStore::new();
        store.write("ethen", "ethen", "No").unwrap();
        store.write("ethsen", "ethsen", "Yes").unwrap();

        let settings = GatewaySettings::load(&store);
        assert_eq!(settings.ethernet.static_enabled, "No");
        assert!(!settings.ethernet.is_enabled());
        assert_eq!(store.read("ethsen", "ethsen").unwrap().as_deref(), Some("No"));
    }

    #[test]
    fn test_apply_updates_persist() {
        let store = MemoryStore::new();
        let mut settings = GatewaySettings::load(&store);

        settings.apply_admin_credentials(
            CredentialsUpdate {
                username: None,
                userpsw: Some("newpass".into()),
            },
            &store,
        );
        settings.apply_ethernet(
            EthernetUpdate {
                ethsip: Some("10.0.0.7".into()),
                ..EthernetUpdate::default()
            },
            &store,
        );

        assert_eq!(settings.admin.username, "admin");
        assert_eq!(settings.admin.password, "newpass");
        assert_eq!(settings.ethernet.static_ip, "10.0.0.7");
        assert_eq!(GatewaySettings::load(&store), settings);
    }

    #[test]
    fn test_update_payloads_parse() {
        let update: CredentialsUpdate =
            serde_json::from_str(r#"{"username":"ops","userpsw":"pw"}"#).unwrap();
        assert_eq!(update.username.as_deref(), Some("ops"));

        let update: EthernetUpdate = serde_json::from_str(r#"{"ethen":"No"}"#).unwrap();
        assert_eq!(update.ethen.as_deref(), Some("No"));
        assert!(update.ethsip.is_none());
    }

    #[test]
    fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        assert_eq!(store.read("key0", "key").unwrap(), None);
        store.write("key0", "key", "12345").unwrap();
        assert_eq!(store.read("key0", "key").unwrap().as_deref(), Some("12345"));

        let text = std::fs::read_to_string(dir.path().join("key0.json")).unwrap();
        assert_eq!(text, r#"{"key":"12345"}"#);
    }

    #[test]
    fn test_json_file_store_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        std::fs::write(store.path_of("ethen"), "not json").unwrap();

        assert!(store.read("ethen", "ethen").is_err());
        assert_eq!(load_or_default(&store, "ethen", "ethen", "Yes"), "Yes");

        store.write("ethen", "ethen", "No").unwrap();
        assert_eq!(store.read("ethen", "ethen").unwrap().as_deref(), Some("No"));
    }
}
