/// Flattening of station readings into MQTT topics
use log::warn;
use std::collections::HashSet;
use std::fmt::Write;

use crate::models::{Device, Module, StationReading};
use crate::utils::format_value;

/// Topic and payload for a single published field
pub type TopicValue = (String, String);

/// Maps a reading onto `<prefix>/<device>/<field>` and
/// `<prefix>/<device>/modules/<module>/<field>` topics
#[derive(Debug, Clone)]
pub struct TopicMapper {
    prefix: String,
}

impl TopicMapper {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Flatten a reading into ordered topic/value pairs
    ///
    /// Absent metrics produce no pair. A device or module id repeated within
    /// the same scope is only mapped the first time it appears; later copies
    /// are skipped with a warning.
    ///
    /// # Arguments
    /// * `reading` - Decoded station reading of one poll cycle
    ///
    /// # Returns
    /// Topic/value pairs in device order, each device followed by its modules
    pub fn map(&self, reading: &StationReading) -> Vec<TopicValue> {
        let mut pairs = Vec::new();
        let mut seen_devices = HashSet::new();

        for device in &reading.devices {
            if !seen_devices.insert(device.id.as_str()) {
                warn!("Skipping repeated device {}", device.id);
                continue;
            }
            self.map_device(device, &mut pairs);
        }

        pairs
    }

    fn map_device(&self, device: &Device, pairs: &mut Vec<TopicValue>) {
        let base = format!("{}/{}", self.prefix, sanitize_id(&device.id));

        pairs.push((format!("{base}/type"), device.device_type.clone()));
        if let Some(dashboard) = &device.dashboard_data {
            for (field, value) in dashboard.fields() {
                pairs.push((format!("{base}/{field}"), format_value(value)));
            }
        }

        let mut seen_modules = HashSet::new();
        for module in &device.modules {
            if !seen_modules.insert(module.id.as_str()) {
                warn!("Skipping repeated module {} of device {}", module.id, device.id);
                continue;
            }
            let module_base = format!("{base}/modules/{}", sanitize_id(&module.id));
            map_module(&module_base, module, pairs);
        }
    }
}

fn map_module(base: &str, module: &Module, pairs: &mut Vec<TopicValue>) {
    pairs.push((format!("{base}/type"), module.module_type.clone()));
    if let Some(battery) = module.battery_percent {
        pairs.push((format!("{base}/battery_percent"), format_value(battery)));
    }
    if let Some(dashboard) = &module.dashboard_data {
        for (field, value) in dashboard.fields() {
            pairs.push((format!("{base}/{field}"), format_value(value)));
        }
    }
}

/// Turn a device or module id into a single topic level
///
/// MAC-style ids (`70:ee:50:3a:01:9c`) lose their colons. Anything else is
/// percent-encoded for `:`, `/`, `+`, `#`, `%` and control characters, and
/// additionally has its first character encoded if the result would look
/// like a stripped MAC. Distinct ids therefore always map to distinct levels.
pub fn sanitize_id(id: &str) -> String {
    if is_mac_like(id) {
        return id.replace(':', "");
    }

    let mut out = String::with_capacity(id.len());
    let force_first = looks_like_stripped_mac(id);
    for (i, c) in id.chars().enumerate() {
        if (i == 0 && force_first) || needs_escape(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn needs_escape(c: char) -> bool {
    matches!(c, ':' | '/' | '+' | '#' | '%') || c.is_control()
}

/// Two or more colon-separated groups of exactly two hex digits
fn is_mac_like(id: &str) -> bool {
    let mut groups = 0;
    for group in id.split(':') {
        if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
        groups += 1;
    }
    groups >= 2
}

/// Shape of a MAC-like id after its colons are removed
fn looks_like_stripped_mac(id: &str) -> bool {
    id.len() >= 4 && id.len() % 2 == 0 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
