//! USB device enumeration and hot-plug watching.

pub mod enumerator;
#[cfg(target_os = "linux")]
pub mod netlink;
pub mod uevent;
pub mod watcher;

use std::str::FromStr;

pub use enumerator::{CollectError, DeviceEnumerator};
#[cfg(target_os = "linux")]
pub use netlink::UeventSocket;
pub use watcher::{DeviceChangeWatcher, UeventSource};

/// Netlink multicast group to listen on for hot-plug messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UeventGroup {
    /// Raw kernel messages; may arrive before udev has written its record.
    Kernel,
    /// Messages re-broadcast by udev after it processed the device.
    #[default]
    Udev,
}

impl UeventGroup {
    pub fn multicast_mask(self) -> u32 {
        match self {
            UeventGroup::Kernel => 1,
            UeventGroup::Udev => 2,
        }
    }
}

impl FromStr for UeventGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kernel" => Ok(UeventGroup::Kernel),
            "udev" => Ok(UeventGroup::Udev),
            other => Err(format!("unknown uevent group '{}' (kernel|udev)", other)),
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use std::io;
    use std::time::Duration;

    use super::UeventGroup;
    use super::uevent::Uevent;
    use super::watcher::UeventSource;

    /// Placeholder on platforms without `NETLINK_KOBJECT_UEVENT`.
    #[derive(Debug)]
    pub struct UeventSocket;

    impl UeventSocket {
        pub fn open(_group: UeventGroup) -> io::Result<Self> {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "hot-plug notifications require Linux netlink",
            ))
        }
    }

    impl UeventSource for UeventSocket {
        fn next_event(&mut self, _timeout: Duration) -> io::Result<Option<Uevent>> {
            Ok(None)
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use unsupported::UeventSocket;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uevent_group_parse() {
        assert_eq!("udev".parse::<UeventGroup>().unwrap(), UeventGroup::Udev);
        assert_eq!("KERNEL".parse::<UeventGroup>().unwrap(), UeventGroup::Kernel);
        assert!("both".parse::<UeventGroup>().is_err());
    }

    #[test]
    fn test_uevent_group_masks() {
        assert_eq!(UeventGroup::Kernel.multicast_mask(), 1);
        assert_eq!(UeventGroup::default().multicast_mask(), 2);
    }
}
