//! Outbound console views
//!
//! Every view is a `&console#<tag>=` prefix followed by a JSON object. Views
//! that go through a session's bounded queue are rendered compact so they
//! stay under the message length limit; the heartbeat is sent directly and
//! is pretty-printed like the meter reports.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::Serialize;

use crate::constants::FIRMWARE_VERSION;
use crate::network::NetworkInfo;
use crate::session::AccessLevel;
use crate::settings::GatewaySettings;

pub const SETTING_PREFIX: &str = "&console#setting=";
pub const WRMETER_PREFIX: &str = "&console#wrmeter=";
pub const INFOR_PREFIX: &str = "&console#infor=";
pub const HEARTBEAT_PREFIX: &str = "&console#persistent=";

#[derive(Serialize)]
struct AdminSettingsView<'a> {
    access: &'a str,
    username_admin: &'a str,
    userpsw_admin: &'a str,
    username_svisor: &'a str,
    userpsw_svisor: &'a str,
    wifiappsw: &'a str,
    ethsgway: &'a str,
    ethsen: &'a str,
    ethsip: &'a str,
    ethssub: &'a str,
    ethernet_status_msg: &'a str,
    ethen: &'a str,
}

#[derive(Serialize)]
struct AccessView<'a> {
    access: &'a str,
}

#[derive(Serialize)]
struct InfoView<'a> {
    #[serde(rename = "FirmVer")]
    firmware: &'a str,
    networkmode: String,
    wifimac: &'a str,
    wifiapip: &'a str,
    ethmac: &'a str,
    ethip: &'a str,
    ethgway: &'a str,
    ethsub: &'a str,
    serial: &'a str,
}

#[derive(Serialize)]
struct HeartbeatView {
    hour: String,
    minute: String,
    second: String,
    day: String,
    weekday: &'static str,
    month: &'static str,
    year: String,
    sensorelapsed: String,
}

fn with_prefix<T: Serialize>(prefix: &str, view: &T) -> String {
    format!("{}{}", prefix, serde_json::to_string(view).unwrap_or_default())
}

/// Settings view; supervisors only learn their access level
pub fn settings_view(access: AccessLevel, settings: &GatewaySettings, network: &NetworkInfo) -> String {
    match access {
        AccessLevel::Administrator => with_prefix(
            SETTING_PREFIX,
            &AdminSettingsView {
                access: access.as_str(),
                username_admin: &settings.admin.username,
                userpsw_admin: &settings.admin.password,
                username_svisor: &settings.supervisor.username,
                userpsw_svisor: &settings.supervisor.password,
                wifiappsw: &settings.wifi_ap_password,
                ethsgway: &settings.ethernet.static_gateway,
                ethsen: &settings.ethernet.static_enabled,
                ethsip: &settings.ethernet.static_ip,
                ethssub: &settings.ethernet.static_subnet,
                ethernet_status_msg: &network.ethernet_status,
                ethen: &settings.ethernet.enabled,
            },
        ),
        AccessLevel::Supervisor => with_prefix(
            SETTING_PREFIX,
            &AccessView {
                access: access.as_str(),
            },
        ),
    }
}

pub fn wrmeter_view(access: AccessLevel) -> String {
    with_prefix(
        WRMETER_PREFIX,
        &AccessView {
            access: access.as_str(),
        },
    )
}

pub fn info_view(network: &NetworkInfo) -> String {
    with_prefix(
        INFOR_PREFIX,
        &InfoView {
            firmware: FIRMWARE_VERSION,
            networkmode: network.network_mode(),
            wifimac: &network.wifi_mac,
            wifiapip: &network.wifi_ap_ip,
            ethmac: &network.eth_mac,
            ethip: &network.eth_ip,
            ethgway: &network.eth_gateway,
            ethsub: &network.eth_subnet,
            serial: &network.serial,
        },
    )
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => " ",
    }
}

/// Date/time heartbeat with the seconds since the last electrical batch
pub fn heartbeat(wall: NaiveDateTime, sensor_elapsed_s: u64) -> String {
    let view = HeartbeatView {
        hour: format!("{:02}", wall.hour()),
        minute: format!("{:02}", wall.minute()),
        second: format!("{:02}", wall.second()),
        day: format!("{:02}", wall.day()),
        weekday: weekday_name(wall.weekday()),
        month: month_name(wall.month()),
        year: wall.year().to_string(),
        sensorelapsed: sensor_elapsed_s.to_string(),
    };
    format!(
        "{}{}",
        HEARTBEAT_PREFIX,
        serde_json::to_string_pretty(&view).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_MESSAGE_LEN;
    use chrono::NaiveDate;
    use serde_json::Value;

    fn body(view: &str, prefix: &str) -> Value {
        serde_json::from_str(view.strip_prefix(prefix).unwrap()).unwrap()
    }

    #[test]
    fn test_settings_view_by_access() {
        let settings = GatewaySettings::default();
        let network = NetworkInfo::default();

        let admin = settings_view(AccessLevel::Administrator, &settings, &network);
        let json = body(&admin, SETTING_PREFIX);
        assert_eq!(json["access"], "administrator");
        assert_eq!(json["username_svisor"], "supervisor");
        assert_eq!(json["ethsip"], "192.168.0.50");
        assert_eq!(json["ethernet_status_msg"], "Not Connected");
        assert!(admin.len() <= MAX_MESSAGE_LEN);

        let supervisor = settings_view(AccessLevel::Supervisor, &settings, &network);
        assert_eq!(supervisor, r#"&console#setting={"access":"supervisor"}"#);
    }

    #[test]
    fn test_wrmeter_and_info_views() {
        assert_eq!(
            wrmeter_view(AccessLevel::Administrator),
            r#"&console#wrmeter={"access":"administrator"}"#
        );

        let network = NetworkInfo {
            eth_ip: "10.1.1.9".into(),
            serial: "a4:cf:12:0:1:2".into(),
            ..NetworkInfo::default()
        };
        let json = body(&info_view(&network), INFOR_PREFIX);
        assert_eq!(json["FirmVer"], "V1.00");
        assert_eq!(json["networkmode"], "[Ethernet]");
        assert_eq!(json["serial"], "a4:cf:12:0:1:2");
    }

    #[test]
    fn test_heartbeat_fields() {
        let wall = NaiveDate::from_ymd_opt(2024, 9, 1)
            .unwrap()
            .and_hms_opt(7, 3, 9)
            .unwrap();
        let json = body(&heartbeat(wall, 4), HEARTBEAT_PREFIX);

        assert_eq!(json["hour"], "07");
        assert_eq!(json["minute"], "03");
        assert_eq!(json["second"], "09");
        assert_eq!(json["day"], "01");
        assert_eq!(json["weekday"], "Sunday");
        assert_eq!(json["month"], "September");
        assert_eq!(json["year"], "2024");
        assert_eq!(json["sensorelapsed"], "4");
    }
}
