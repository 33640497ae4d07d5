//! Decoding of hot-plug messages received on `NETLINK_KOBJECT_UEVENT`.
//!
//! Two framings arrive on the socket depending on the multicast group:
//!
//! - kernel group: `ACTION@DEVPATH\0KEY=VALUE\0KEY=VALUE\0...`
//! - udev group: a `libudev\0` header (magic `0xfeedcafe`, big endian)
//!   followed by `KEY=VALUE\0` properties at `properties_off`.

use std::collections::HashMap;

const UDEV_PREFIX: &[u8] = b"libudev\0";
const UDEV_MAGIC: u32 = 0xfeed_cafe;
/// prefix[8] + magic + header_size + properties_off + properties_len
const UDEV_HEADER_MIN: usize = 24;

/// One decoded hot-plug notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uevent {
    pub properties: HashMap<String, String>,
    /// Stands in for messages the kernel dropped on a full receive queue.
    pub overflow: bool,
}

impl Uevent {
    pub fn lost_messages() -> Self {
        Self {
            properties: HashMap::new(),
            overflow: true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn action(&self) -> Option<&str> {
        self.get("ACTION")
    }

    pub fn subsystem(&self) -> Option<&str> {
        self.get("SUBSYSTEM")
    }

    /// Whether this message should trigger a USB rescan.
    pub fn is_usb(&self) -> bool {
        self.overflow || self.subsystem() == Some("usb")
    }
}

/// Decode one datagram. Returns `None` for frames that are neither format.
pub fn decode(buf: &[u8]) -> Option<Uevent> {
    if buf.starts_with(UDEV_PREFIX) {
        decode_udev(buf)
    } else {
        decode_kernel(buf)
    }
}

fn decode_kernel(buf: &[u8]) -> Option<Uevent> {
    let mut fields = buf.split(|&b| b == 0);
    let header = fields.next()?;
    if !header.contains(&b'@') {
        return None;
    }
    Some(Uevent {
        properties: parse_properties(fields),
        overflow: false,
    })
}

fn decode_udev(buf: &[u8]) -> Option<Uevent> {
    if buf.len() < UDEV_HEADER_MIN {
        return None;
    }
    let magic = u32::from_be_bytes(buf[8..12].try_into().ok()?);
    if magic != UDEV_MAGIC {
        return None;
    }
    let off = u32::from_ne_bytes(buf[16..20].try_into().ok()?) as usize;
    let len = u32::from_ne_bytes(buf[20..24].try_into().ok()?) as usize;
    let props = buf.get(off..off.checked_add(len)?)?;
    Some(Uevent {
        properties: parse_properties(props.split(|&b| b == 0)),
        overflow: false,
    })
}

fn parse_properties<'a>(fields: impl Iterator<Item = &'a [u8]>) -> HashMap<String, String> {
    fields
        .filter(|f| !f.is_empty())
        .filter_map(|f| {
            let text = String::from_utf8_lossy(f);
            let (k, v) = text.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn encode_udev(properties: &[(&str, &str)]) -> Vec<u8> {
    let mut props = Vec::new();
    for (k, v) in properties {
        props.extend_from_slice(format!("{k}={v}").as_bytes());
        props.push(0);
    }
    let header_size: u32 = 40;
    let mut buf = Vec::new();
    buf.extend_from_slice(UDEV_PREFIX);
    buf.extend_from_slice(&UDEV_MAGIC.to_be_bytes());
    buf.extend_from_slice(&header_size.to_ne_bytes());
    buf.extend_from_slice(&header_size.to_ne_bytes());
    buf.extend_from_slice(&(props.len() as u32).to_ne_bytes());
    buf.resize(header_size as usize, 0);
    buf.extend_from_slice(&props);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_kernel_frame() {
        let frame = b"add@/devices/pci0000:00/0000:00:14.0/usb1/1-2\0ACTION=add\0DEVPATH=/devices/pci0000:00/0000:00:14.0/usb1/1-2\0SUBSYSTEM=usb\0DEVTYPE=usb_device\0SEQNUM=4242\0";
        let event = decode(frame).unwrap();

        assert_eq!(event.action(), Some("add"));
        assert!(event.is_usb());
        assert_eq!(event.get("DEVTYPE"), Some("usb_device"));
        assert_eq!(event.get("SEQNUM"), Some("4242"));
    }

    #[test]
    fn test_decode_udev_frame() {
        let frame = encode_udev(&[
            ("ACTION", "remove"),
            ("SUBSYSTEM", "usb"),
            ("ID_MODEL", "Ultra"),
        ]);
        let event = decode(&frame).unwrap();

        assert_eq!(event.action(), Some("remove"));
        assert!(event.is_usb());
        assert_eq!(event.get("ID_MODEL"), Some("Ultra"));
    }

    #[test]
    fn test_decode_non_usb() {
        let frame = b"change@/devices/virtual/net/wlan0\0ACTION=change\0SUBSYSTEM=net\0";
        let event = decode(frame).unwrap();
        assert!(!event.is_usb());
    }

    #[test]
    fn test_overflow_triggers_rescan() {
        assert!(Uevent::lost_messages().is_usb());
        assert!(!Uevent::default().is_usb());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"").is_none());
        assert!(decode(b"no header here").is_none());

        let mut frame = encode_udev(&[("SUBSYSTEM", "usb")]);
        frame[8] = 0;
        assert!(decode(&frame).is_none());

        let frame = encode_udev(&[("SUBSYSTEM", "usb")]);
        assert!(decode(&frame[..30]).is_none());
    }
}
