//! Records exchanged between the collector and its subscribers.
//!
//! Both records travel as positional tuples: the field order below is the
//! wire contract, so reordering fields breaks existing subscribers.

use serde::{Deserialize, Serialize};

/// Severity assigned by the keyword classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Info,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Error => "error",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed kernel log line.
///
/// `timestamp` is kept exactly as the log formatter rendered it; the
/// collector never parses it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EventTuple", into = "EventTuple")]
pub struct Event {
    pub timestamp: String,
    pub level: Level,
    pub subsystem: String,
    pub source: String,
    pub message: String,
    pub is_usb: bool,
    pub is_error: bool,
    /// Bus id of the device the line refers to, empty when unknown.
    pub device_id: String,
}

type EventTuple = (String, Level, String, String, String, bool, bool, String);

impl From<Event> for EventTuple {
    fn from(e: Event) -> Self {
        (
            e.timestamp,
            e.level,
            e.subsystem,
            e.source,
            e.message,
            e.is_usb,
            e.is_error,
            e.device_id,
        )
    }
}

impl From<EventTuple> for Event {
    fn from(t: EventTuple) -> Self {
        let (timestamp, level, subsystem, source, message, is_usb, is_error, device_id) = t;
        Self {
            timestamp,
            level,
            subsystem,
            source,
            message,
            is_usb,
            is_error,
            device_id,
        }
    }
}

/// One USB device present at the last enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DeviceTuple", into = "DeviceTuple")]
pub struct DeviceInfo {
    /// Kernel-assigned bus name, e.g. `1-2` or `usb1`.
    pub bus_id: String,
    /// Short serial number, empty when the device has none.
    pub device_id: String,
    pub vendor_id: String,
    pub product_id: String,
    /// Human-readable model string, empty when unknown.
    pub summary: String,
    /// Canonical sysfs path; unique within one enumeration.
    pub sys_path: String,
}

type DeviceTuple = (String, String, String, String, String, String);

impl From<DeviceInfo> for DeviceTuple {
    fn from(d: DeviceInfo) -> Self {
        (
            d.bus_id,
            d.device_id,
            d.vendor_id,
            d.product_id,
            d.summary,
            d.sys_path,
        )
    }
}

impl From<DeviceTuple> for DeviceInfo {
    fn from(t: DeviceTuple) -> Self {
        let (bus_id, device_id, vendor_id, product_id, summary, sys_path) = t;
        Self {
            bus_id,
            device_id,
            vendor_id,
            product_id,
            summary,
            sys_path,
        }
    }
}

/// Point-in-time sizes of the store, sent as `[eventCount, deviceCount]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct StateSummary {
    pub event_count: usize,
    pub device_count: usize,
}

impl From<StateSummary> for (usize, usize) {
    fn from(s: StateSummary) -> Self {
        (s.event_count, s.device_count)
    }
}

impl From<(usize, usize)> for StateSummary {
    fn from((event_count, device_count): (usize, usize)) -> Self {
        Self {
            event_count,
            device_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_positionally() {
        let event = Event {
            timestamp: "Oct 18 10:00:01".into(),
            level: Level::Error,
            subsystem: "kernel".into(),
            source: "host".into(),
            message: "kernel: usb 1-2: device descriptor read/64, error -71".into(),
            is_usb: true,
            is_error: true,
            device_id: "1-2".into(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                "Oct 18 10:00:01",
                "error",
                "kernel",
                "host",
                "kernel: usb 1-2: device descriptor read/64, error -71",
                true,
                true,
                "1-2"
            ])
        );

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_device_field_order() {
        let device = DeviceInfo {
            bus_id: "1-2".into(),
            device_id: "ABC123".into(),
            vendor_id: "046d".into(),
            product_id: "c52b".into(),
            summary: "Unifying Receiver".into(),
            sys_path: "/sys/devices/pci0000:00/0000:00:14.0/usb1/1-2".into(),
        };

        let json = serde_json::to_string(&device).unwrap();
        assert_eq!(
            json,
            r#"["1-2","ABC123","046d","c52b","Unifying Receiver","/sys/devices/pci0000:00/0000:00:14.0/usb1/1-2"]"#
        );
    }

    #[test]
    fn test_short_tuple_is_rejected() {
        let result: Result<DeviceInfo, _> = serde_json::from_str(r#"["1-2","x"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_summary_is_pair() {
        let summary = StateSummary {
            event_count: 12,
            device_count: 3,
        };
        assert_eq!(serde_json::to_string(&summary).unwrap(), "[12,3]");
    }
}
