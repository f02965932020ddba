//! # Report Rendering
//!
//! Turns the value store into the JSON snapshot pushed to clients:
//!
//! ```text
//! <prefix>{
//!   "WAGO8793040": [
//!     { "parameter": "L1 Voltage", "value": "230.500", "unit": "(V)" },
//!     ...
//!   ]
//! }
//! ```
//!
//! Only enabled, readable entries appear, in catalogue order. An entry that
//! failed in the current sweep shows `Error(<code>)` as its value.

use serde::Serialize;
use tracing::warn;

use crate::catalogue::{Catalogue, ParameterDescriptor, ValueType, CID_CT_RATIO_2, CID_PULSE_WIDTH, VERSION_CIDS};
use crate::store::{MeterValue, Reading, ValueStore};

#[derive(Debug, Serialize)]
struct ReportEntry<'a> {
    parameter: &'a str,
    value: String,
    unit: String,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    #[serde(rename = "WAGO8793040")]
    entries: Vec<ReportEntry<'a>>,
}

/// Format one decoded value per its descriptor
pub fn render_value(descriptor: &ParameterDescriptor, value: &MeterValue) -> String {
    if descriptor.cid == CID_CT_RATIO_2 {
        if let Some((primary, secondary)) = value.register_pair() {
            return format!("{}/{}", primary, secondary);
        }
    }
    if descriptor.cid == CID_PULSE_WIDTH {
        if let Some((high, low)) = value.register_pair() {
            return format!("{}~{}", low, high);
        }
    }
    if VERSION_CIDS.contains(&descriptor.cid) {
        if let MeterValue::F32(version) = value {
            return format!("V{:.2}", version);
        }
    }

    match (descriptor.value_type, value) {
        (ValueType::Hex16 | ValueType::Bin16, MeterValue::U16(v)) => format!("{:04X}", v),
        (ValueType::Hex32 | ValueType::Bin32, MeterValue::U32(v)) => format!("{:08X}", v),
        _ => value.to_string(),
    }
}

fn render_reading(descriptor: &ParameterDescriptor, reading: Option<&Reading>) -> String {
    match reading {
        Some(Reading {
            ok: true,
            value: Some(value),
            ..
        }) => render_value(descriptor, value),
        Some(reading) => format!("Error({})", reading.fault.map(|f| f.code()).unwrap_or(0)),
        None => "Error(0)".to_string(),
    }
}

fn render_unit(unit: &str) -> String {
    if unit.is_empty() {
        String::new()
    } else {
        format!("({})", unit)
    }
}

/// Render `prefix` followed by the pretty-printed snapshot.
///
/// The result never exceeds `capacity` bytes; trailing entries are dropped
/// until it fits. When not even the prefix and an empty report fit, the
/// result is empty and nothing is published.
pub fn render_report(
    prefix: &str,
    catalogue: &Catalogue,
    enabled: &[bool],
    store: &ValueStore,
    capacity: usize,
) -> String {
    let mut report = Report {
        entries: catalogue
            .iter()
            .enumerate()
            .filter(|(index, descriptor)| {
                enabled.get(*index).copied().unwrap_or(false) && descriptor.is_readable()
            })
            .map(|(index, descriptor)| ReportEntry {
                parameter: descriptor.name,
                value: render_reading(descriptor, store.get(index)),
                unit: render_unit(descriptor.unit),
            })
            .collect(),
    };

    loop {
        let body = serde_json::to_string_pretty(&report).unwrap_or_default();
        if prefix.len() + body.len() <= capacity {
            return format!("{}{}", prefix, body);
        }
        if report.entries.is_empty() {
            warn!("Report prefix alone exceeds {} bytes", capacity);
            return String::new();
        }
        warn!(
            "Report exceeds {} bytes, dropping '{}'",
            capacity,
            report.entries.last().map(|e| e.parameter).unwrap_or_default()
        );
        report.entries.pop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Cid, EnableSet};
    use crate::error::ReadFault;

    fn descriptor(cid: u16, value_type: ValueType) -> ParameterDescriptor {
        *Catalogue::wago_879_3040()
            .iter()
            .find(|d| d.cid == Cid(cid) && d.value_type == value_type)
            .unwrap()
    }

    #[test]
    fn test_render_value_formats() {
        let voltage = descriptor(0x5000, ValueType::Float);
        assert_eq!(render_value(&voltage, &MeterValue::F32(229.87654)), "229.877");

        let meter_code = descriptor(0x4002, ValueType::Hex16);
        assert_eq!(render_value(&meter_code, &MeterValue::U16(0x2A)), "002A");

        let serial = descriptor(0x4000, ValueType::Hex32);
        assert_eq!(render_value(&serial, &MeterValue::U32(0xAB12)), "0000AB12");

        let modbus_id = descriptor(0x4003, ValueType::U16);
        assert_eq!(render_value(&modbus_id, &MeterValue::U16(1)), "1");

        let direction = descriptor(0x4012, ValueType::Ascii);
        assert_eq!(render_value(&direction, &MeterValue::Ascii(b'F')), "F");
    }

    #[test]
    fn test_render_special_values() {
        let ct_ratio = descriptor(0x401F, ValueType::Bin32);
        assert_eq!(render_value(&ct_ratio, &MeterValue::U32(0x0064_0005)), "100/5");

        let pulse_width = descriptor(0x4021, ValueType::Bin32);
        assert_eq!(render_value(&pulse_width, &MeterValue::U32(0x0050_0064)), "100~80");

        let software = descriptor(0x4007, ValueType::Float);
        assert_eq!(render_value(&software, &MeterValue::F32(1.02)), "V1.02");
    }

    #[test]
    fn test_report_lists_enabled_entries_with_errors() {
        let catalogue = Catalogue::wago_879_3040();
        let enabled = catalogue.enable_mask(EnableSet::Info);
        let mut store = ValueStore::new(catalogue.len());
        store.record_success(0, MeterValue::U32(0x1234));
        store.record_failure(1, ReadFault::NoResponse);

        let report = render_report("&console#inform=", &catalogue, &enabled, &store, 12_200);
        let body = report.strip_prefix("&console#inform=").unwrap();
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        let entries = json["WAGO8793040"].as_array().unwrap();

        assert_eq!(entries.len(), 31);
        assert_eq!(entries[0]["parameter"], "Serial number");
        assert_eq!(entries[0]["value"], "00001234");
        assert_eq!(entries[0]["unit"], "");
        assert_eq!(entries[1]["value"], "Error(3)");
        assert_eq!(entries[2]["value"], "Error(0)");
        assert_eq!(entries[7]["unit"], "(A)");
    }

    #[test]
    fn test_full_electrical_report_fits_default_capacity() {
        let catalogue = Catalogue::wago_879_3040();
        let enabled = catalogue.enable_mask(EnableSet::Electrical);
        let mut store = ValueStore::new(catalogue.len());
        for index in 0..catalogue.len() {
            store.record_success(index, MeterValue::F32(-12345.678));
        }
        let report = render_report("&console#rdmeter=", &catalogue, &enabled, &store, 12_200);
        let json: serde_json::Value =
            serde_json::from_str(report.strip_prefix("&console#rdmeter=").unwrap()).unwrap();
        assert_eq!(json["WAGO8793040"].as_array().unwrap().len(), 100);
    }

    #[test]
    fn test_report_bounded_by_capacity() {
        let catalogue = Catalogue::wago_879_3040();
        let enabled = catalogue.enable_mask(EnableSet::All);
        let store = ValueStore::new(catalogue.len());

        let report = render_report("&console#rdmeter=", &catalogue, &enabled, &store, 600);
        assert!(report.len() <= 600);
        let json: serde_json::Value =
            serde_json::from_str(report.strip_prefix("&console#rdmeter=").unwrap()).unwrap();
        let entries = json["WAGO8793040"].as_array().unwrap();
        assert!(!entries.is_empty());
        assert_eq!(entries[0]["parameter"], "Serial number");
    }

    #[test]
    fn test_report_empty_when_nothing_fits() {
        let catalogue = Catalogue::wago_879_3040();
        let enabled = catalogue.enable_mask(EnableSet::All);
        let store = ValueStore::new(catalogue.len());

        assert_eq!(render_report("&console#rdmeter=", &catalogue, &enabled, &store, 20), "");

        let empty = render_report("&console#rdmeter=", &catalogue, &[], &store, 40);
        assert_eq!(empty, "&console#rdmeter={\n  \"WAGO8793040\": []\n}");
        assert_eq!(empty.len(), 40);
        assert!(empty.len() <= crate::constants::MIN_REPORT_CAPACITY);
    }
}
