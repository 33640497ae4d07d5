//! Pre-built mock sysfs scenarios for testing.

use super::filesystem::{MockFs, UsbFixture};

#[allow(dead_code)]
impl MockFs {
    /// A laptop-like bus: one xHCI root hub, a receiver with a database
    /// model, a flash drive known only by its raw properties, and the
    /// interfaces that must not surface as devices.
    pub fn typical_usb_bus() -> Self {
        let mut fs = Self::new();
        fs.add_usb_device(
            "/sys",
            "/run/udev/data",
            &UsbFixture {
                name: "usb1",
                device_path: "devices/pci0000:00/0000:00:14.0/usb1",
                devtype: "usb_device",
                vendor_id: "1d6b",
                product_id: "0002",
                major_minor: Some((189, 0)),
                serial: Some("0000:00:14.0"),
                product: Some("xHCI Host Controller"),
                udev_properties: &[
                    ("ID_SERIAL_SHORT", "0000:00:14.0"),
                    ("ID_MODEL", "xHCI_Host_Controller"),
                    ("ID_MODEL_FROM_DATABASE", "2.0 root hub"),
                ],
            },
        );
        fs.add_usb_device(
            "/sys",
            "/run/udev/data",
            &UsbFixture {
                name: "1-0:1.0",
                device_path: "devices/pci0000:00/0000:00:14.0/usb1/1-0:1.0",
                devtype: "usb_interface",
                vendor_id: "1d6b",
                product_id: "0002",
                ..Default::default()
            },
        );
        fs.add_usb_device(
            "/sys",
            "/run/udev/data",
            &UsbFixture {
                name: "1-2",
                device_path: "devices/pci0000:00/0000:00:14.0/usb1/1-2",
                devtype: "usb_device",
                vendor_id: "046d",
                product_id: "c52b",
                major_minor: Some((189, 1)),
                product: Some("USB Receiver"),
                udev_properties: &[
                    ("ID_MODEL", "USB_Receiver"),
                    ("ID_MODEL_FROM_DATABASE", "Unifying Receiver"),
                ],
                ..Default::default()
            },
        );
        fs.add_usb_device(
            "/sys",
            "/run/udev/data",
            &UsbFixture {
                name: "1-2:1.0",
                device_path: "devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0",
                devtype: "usb_interface",
                vendor_id: "046d",
                product_id: "c52b",
                ..Default::default()
            },
        );
        fs.add_usb_device(
            "/sys",
            "/run/udev/data",
            &UsbFixture {
                name: "1-3",
                device_path: "devices/pci0000:00/0000:00:14.0/usb1/1-3",
                devtype: "usb_device",
                vendor_id: "0781",
                product_id: "5581",
                major_minor: Some((189, 2)),
                serial: Some("4C530001230712110101"),
                product: Some("Ultra"),
                udev_properties: &[
                    ("ID_SERIAL_SHORT", "4C530001230712110101"),
                    ("ID_MODEL", "Ultra"),
                ],
            },
        );
        fs
    }

    /// A bus where udev has not (yet) written database records, so every
    /// field must come from raw sysfs attributes.
    pub fn usb_bus_without_udev() -> Self {
        let mut fs = Self::new();
        fs.add_usb_device(
            "/sys",
            "/run/udev/data",
            &UsbFixture {
                name: "2-1",
                device_path: "devices/pci0000:00/0000:00:1d.0/usb2/2-1",
                devtype: "usb_device",
                vendor_id: "0bda",
                product_id: "8153",
                major_minor: Some((189, 129)),
                serial: Some("000001"),
                product: Some("USB 10/100/1000 LAN"),
                udev_properties: &[],
            },
        );
        fs
    }
}
