//! Network state reported by the platform
//!
//! Wi-Fi and Ethernet bring-up happen outside the gateway. The platform
//! reports addresses and link transitions; the gateway only displays them
//! and requests a restart when the Ethernet link stays down too long.

use tracing::{info, warn};

/// Addresses and status text shown in the info and settings views
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub wifi_mac: String,
    pub wifi_ap_ip: String,
    pub eth_mac: String,
    pub eth_ip: String,
    pub eth_gateway: String,
    pub eth_subnet: String,
    /// Device serial (the Wi-Fi MAC)
    pub serial: String,
    /// `Not Connected`, `Connecting..`, `Connected`
    pub ethernet_status: String,
}

impl Default for NetworkInfo {
    fn default() -> Self {
        Self {
            wifi_mac: " ".into(),
            wifi_ap_ip: " ".into(),
            eth_mac: " ".into(),
            eth_ip: " ".into(),
            eth_gateway: " ".into(),
            eth_subnet: " ".into(),
            serial: " ".into(),
            ethernet_status: "Not Connected".into(),
        }
    }
}

impl NetworkInfo {
    /// Active interfaces, e.g. `[Wifi AP][Ethernet]`
    pub fn network_mode(&self) -> String {
        let mut mode = String::new();
        if !self.wifi_ap_ip.trim().is_empty() {
            mode.push_str("[Wifi AP]");
        }
        if !self.eth_ip.trim().is_empty() {
            mode.push_str("[Ethernet]");
        }
        mode
    }

    /// Forget the Ethernet addresses
    pub fn clear_ethernet(&mut self) {
        self.eth_mac = " ".into();
        self.eth_ip = " ".into();
        self.eth_subnet = " ".into();
        self.eth_gateway = " ".into();
    }
}

/// Tracks how long the Ethernet link has been down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkWatch {
    down_since_ms: Option<u64>,
}

impl LinkWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link-down transition; an already running window is kept
    pub fn link_down(&mut self, now_ms: u64) {
        if self.down_since_ms.is_none() {
            warn!("Ethernet link down");
            self.down_since_ms = Some(now_ms);
        }
    }

    pub fn link_up(&mut self) {
        if self.down_since_ms.take().is_some() {
            info!("Ethernet link up");
        }
    }

    #[inline]
    pub fn is_down(&self) -> bool {
        self.down_since_ms.is_some()
    }

    /// Down for longer than `grace_ms`
    pub fn expired(&self, now_ms: u64, grace_ms: u64) -> bool {
        self.down_since_ms
            .is_some_and(|since| now_ms.saturating_sub(since) > grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_mode() {
        let mut info = NetworkInfo::default();
        assert_eq!(info.network_mode(), "");
        info.wifi_ap_ip = "192.168.4.1".into();
        assert_eq!(info.network_mode(), "[Wifi AP]");
        info.eth_ip = "10.0.0.2".into();
        assert_eq!(info.network_mode(), "[Wifi AP][Ethernet]");
        info.clear_ethernet();
        assert_eq!(info.network_mode(), "[Wifi AP]");
    }

    #[test]
    fn test_link_watch_grace() {
        let mut watch = LinkWatch::new();
        assert!(!watch.expired(100_000, 10_000));

        watch.link_down(1_000);
        watch.link_down(5_000);
        assert!(watch.is_down());
        assert!(!watch.expired(11_000, 10_000));
        assert!(watch.expired(11_001, 10_000));

        watch.link_up();
        assert!(!watch.expired(50_000, 10_000));
    }
}
