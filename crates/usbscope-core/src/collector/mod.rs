//! Producers feeding the event store.
//!
//! Two independent live sources, each free to block on its own input:
//!
//! ```text
//! ┌──────────────────────────────┐   ┌─────────────────────────────────┐
//! │        LogStreamReader       │   │       DeviceChangeWatcher       │
//! │  journalctl -k -f (child)    │   │  NETLINK_KOBJECT_UEVENT socket  │
//! │  parse_line() per line       │   │  DeviceEnumerator per uevent    │
//! └──────────────┬───────────────┘   └────────────────┬────────────────┘
//!                │ Event                              │ Vec<DeviceInfo>
//!                ▼                                    ▼
//!          EventStore::append_event          EventStore::set_devices
//! ```
//!
//! Device enumeration reads sysfs and the udev database through the
//! [`FileSystem`] trait so it can be exercised against [`MockFs`].
//!
//! ```
//! use usbscope_core::collector::{DeviceEnumerator, MockFs};
//!
//! let fs = MockFs::typical_usb_bus();
//! let enumerator = DeviceEnumerator::new(fs, "/sys", "/run/udev/data");
//! let devices = enumerator.enumerate().unwrap();
//! assert!(devices.iter().any(|d| d.bus_id == "1-2"));
//! ```

pub mod log_collector;
pub mod mock;
pub mod traits;
pub mod usb;

pub use log_collector::parser::parse_line;
pub use log_collector::tailer::JournalCommand;
pub use log_collector::{LogStreamReader, RestartPolicy, TailError};
pub use mock::MockFs;
pub use traits::{FileSystem, RealFs};
pub use usb::{
    CollectError, DeviceChangeWatcher, DeviceEnumerator, UeventGroup, UeventSocket, UeventSource,
};
