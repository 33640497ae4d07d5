//! Snapshot of attached USB devices from sysfs and the udev database.
//!
//! Every entry under `<sysfs>/bus/usb/devices` is either a whole device
//! (`DEVTYPE=usb_device`) or one of its interfaces (`usb_interface`). Only
//! whole devices are reported. Identity comes from sysfs attributes, serial
//! and model from the udev record `<udev_data>/c<major>:<minor>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::collector::traits::FileSystem;
use crate::model::DeviceInfo;

/// `DEVTYPE` of a top-level USB device.
const USB_DEVICE_DEVTYPE: &str = "usb_device";

/// Error type for enumeration failures.
#[derive(Debug)]
pub enum CollectError {
    /// The USB bus directory could not be listed.
    BusUnavailable(PathBuf, std::io::Error),
    /// I/O error reading a device file.
    Io(std::io::Error),
    /// The device is not a whole USB device.
    NotADevice,
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::BusUnavailable(path, e) => {
                write!(f, "USB bus {} unavailable: {}", path.display(), e)
            }
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::NotADevice => write!(f, "not a usb_device"),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Enumerates USB devices through a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct DeviceEnumerator<F: FileSystem> {
    fs: F,
    sysfs_root: PathBuf,
    udev_data: PathBuf,
}

impl<F: FileSystem> DeviceEnumerator<F> {
    /// Creates an enumerator.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `sysfs_root` - sysfs mount point (usually "/sys")
    /// * `udev_data` - udev database directory (usually "/run/udev/data")
    pub fn new(fs: F, sysfs_root: impl Into<PathBuf>, udev_data: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            sysfs_root: sysfs_root.into(),
            udev_data: udev_data.into(),
        }
    }

    /// Directory listing one entry per USB device and interface.
    pub fn bus_dir(&self) -> PathBuf {
        self.sysfs_root.join("bus/usb/devices")
    }

    /// Returns every whole USB device currently attached, ordered by bus id.
    ///
    /// Devices whose files cannot be read are skipped; only an unreadable
    /// bus directory fails the whole enumeration. A host without a USB bus
    /// directory (no USB support loaded) has no devices.
    pub fn enumerate(&self) -> Result<Vec<DeviceInfo>, CollectError> {
        let bus_dir = self.bus_dir();
        if !self.fs.exists(&bus_dir) {
            debug!(path = %bus_dir.display(), "no USB bus directory");
            return Ok(Vec::new());
        }
        let mut entries = self
            .fs
            .read_dir(&bus_dir)
            .map_err(|e| CollectError::BusUnavailable(bus_dir.clone(), e))?;
        entries.sort();

        let mut devices = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.read_device(&entry) {
                Ok(device) => devices.push(device),
                Err(CollectError::NotADevice) => {}
                Err(e) => debug!(path = %entry.display(), error = %e, "skipping USB entry"),
            }
        }
        Ok(devices)
    }

    fn read_device(&self, entry: &Path) -> Result<DeviceInfo, CollectError> {
        let uevent = parse_key_values(&self.fs.read_to_string(&entry.join("uevent"))?);
        if uevent.get("DEVTYPE").map(String::as_str) != Some(USB_DEVICE_DEVTYPE) {
            return Err(CollectError::NotADevice);
        }

        let udev = self.udev_properties(&uevent);
        let prop = |key: &str| udev.get(key).filter(|v| !v.is_empty()).cloned();

        let bus_id = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sys_path = self
            .fs
            .canonicalize(entry)
            .unwrap_or_else(|_| entry.to_path_buf());

        Ok(DeviceInfo {
            bus_id,
            device_id: prop("ID_SERIAL_SHORT")
                .or_else(|| self.attr(entry, "serial"))
                .unwrap_or_default(),
            vendor_id: self.attr(entry, "idVendor").unwrap_or_default(),
            product_id: self.attr(entry, "idProduct").unwrap_or_default(),
            summary: prop("ID_MODEL_FROM_DATABASE")
                .or_else(|| prop("ID_MODEL"))
                .or_else(|| self.attr(entry, "product"))
                .unwrap_or_default(),
            sys_path: sys_path.to_string_lossy().into_owned(),
        })
    }

    /// Reads a single-line sysfs attribute; missing or empty is `None`.
    fn attr(&self, entry: &Path, name: &str) -> Option<String> {
        self.fs
            .read_to_string(&entry.join(name))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Loads the udev database record for the device's character node.
    fn udev_properties(&self, uevent: &HashMap<String, String>) -> HashMap<String, String> {
        let (Some(major), Some(minor)) = (uevent.get("MAJOR"), uevent.get("MINOR")) else {
            return HashMap::new();
        };
        let path = self.udev_data.join(format!("c{}:{}", major, minor));
        if !self.fs.exists(&path) {
            return HashMap::new();
        }
        match self.fs.read_to_string(&path) {
            Ok(content) => parse_udev_record(&content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "unreadable udev record");
                HashMap::new()
            }
        }
    }
}

/// Parses `KEY=VALUE` lines (sysfs `uevent` format).
fn parse_key_values(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Parses the `E:KEY=VALUE` property lines of a udev database record.
fn parse_udev_record(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix("E:"))
        .filter_map(|prop| prop.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, UsbFixture};

    fn enumerator(fs: MockFs) -> DeviceEnumerator<MockFs> {
        DeviceEnumerator::new(fs, "/sys", "/run/udev/data")
    }

    #[test]
    fn test_enumerate_skips_interfaces() {
        let devices = enumerator(MockFs::typical_usb_bus()).enumerate().unwrap();

        let ids: Vec<&str> = devices.iter().map(|d| d.bus_id.as_str()).collect();
        assert_eq!(ids, vec!["1-2", "1-3", "usb1"]);
    }

    #[test]
    fn test_enumerate_prefers_database_model() {
        let devices = enumerator(MockFs::typical_usb_bus()).enumerate().unwrap();
        let receiver = devices.iter().find(|d| d.bus_id == "1-2").unwrap();

        assert_eq!(receiver.vendor_id, "046d");
        assert_eq!(receiver.product_id, "c52b");
        assert_eq!(receiver.summary, "Unifying Receiver");
        assert_eq!(receiver.device_id, "");
        assert_eq!(
            receiver.sys_path,
            "/sys/devices/pci0000:00/0000:00:14.0/usb1/1-2"
        );
    }

    #[test]
    fn test_enumerate_falls_back_to_raw_model() {
        let devices = enumerator(MockFs::typical_usb_bus()).enumerate().unwrap();
        let stick = devices.iter().find(|d| d.bus_id == "1-3").unwrap();

        assert_eq!(stick.summary, "Ultra");
        assert_eq!(stick.device_id, "4C530001230712110101");
    }

    #[test]
    fn test_enumerate_without_udev_uses_sysfs_attributes() {
        let devices = enumerator(MockFs::usb_bus_without_udev())
            .enumerate()
            .unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "000001");
        assert_eq!(devices[0].summary, "USB 10/100/1000 LAN");
    }

    #[test]
    fn test_enumerate_skips_unreadable_device() {
        let mut fs = MockFs::typical_usb_bus();
        // Entry without a uevent file, e.g. a device removed mid-scan.
        fs.add_dir("/sys/bus/usb/devices/1-4");

        let devices = enumerator(fs).enumerate().unwrap();
        assert_eq!(devices.len(), 3);
    }

    #[test]
    fn test_enumerate_missing_attributes_are_empty() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/bus/usb/devices/3-1/uevent", "DEVTYPE=usb_device\n");

        let devices = enumerator(fs).enumerate().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].bus_id, "3-1");
        assert_eq!(devices[0].vendor_id, "");
        assert_eq!(devices[0].summary, "");
    }

    #[test]
    fn test_enumerate_without_usb_bus_is_empty() {
        let devices = enumerator(MockFs::new()).enumerate().unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn test_enumerate_unlistable_bus_fails() {
        let mut fs = MockFs::new();
        // Present but not a directory.
        fs.add_file("/sys/bus/usb/devices", "");

        let result = enumerator(fs).enumerate();
        assert!(matches!(result, Err(CollectError::BusUnavailable(_, _))));
    }

    #[test]
    fn test_custom_roots() {
        let mut fs = MockFs::new();
        fs.add_usb_device(
            "/host/sys",
            "/host/udev",
            &UsbFixture {
                name: "4-1",
                device_path: "devices/usb4/4-1",
                devtype: "usb_device",
                vendor_id: "05ac",
                product_id: "12a8",
                major_minor: Some((189, 384)),
                udev_properties: &[("ID_MODEL_FROM_DATABASE", "iPhone 5/5C/5S/6/SE")],
                ..Default::default()
            },
        );

        let devices = DeviceEnumerator::new(fs, "/host/sys", "/host/udev")
            .enumerate()
            .unwrap();
        assert_eq!(devices[0].summary, "iPhone 5/5C/5S/6/SE");
        assert_eq!(devices[0].sys_path, "/host/sys/devices/usb4/4-1");
    }

    #[test]
    fn test_parse_udev_record() {
        let props = parse_udev_record("I:123\nE:ID_MODEL=Foo\nE:ID_VENDOR=Bar=Baz\nG:seat\n");
        assert_eq!(props.get("ID_MODEL").unwrap(), "Foo");
        assert_eq!(props.get("ID_VENDOR").unwrap(), "Bar=Baz");
        assert_eq!(props.len(), 2);
    }
}
