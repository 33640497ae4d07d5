//! In-memory mock filesystem for testing device enumeration without real sysfs.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files, directories and symlinks in memory so tests can describe
/// a sysfs tree and udev database without a Linux host.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Symlink path -> canonical target.
    links: HashMap<PathBuf, PathBuf>,
}

/// Attributes of one USB device for [`MockFs::add_usb_device`].
#[derive(Debug, Clone, Default)]
pub struct UsbFixture<'a> {
    /// Sysfs name under `bus/usb/devices`, e.g. `1-2`.
    pub name: &'a str,
    /// Canonical location under `devices/`, relative to the sysfs root.
    pub device_path: &'a str,
    pub devtype: &'a str,
    pub vendor_id: &'a str,
    pub product_id: &'a str,
    pub major_minor: Option<(u32, u32)>,
    /// Raw sysfs `serial` attribute.
    pub serial: Option<&'a str>,
    /// Raw sysfs `product` attribute.
    pub product: Option<&'a str>,
    /// `E:` lines for the udev database record.
    pub udev_properties: &'a [(&'a str, &'a str)],
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds a directory entry at `link` that canonicalizes to `target`.
    ///
    /// Reads through `link` are not redirected; fixtures store attribute
    /// files under the link path directly.
    pub fn add_link(&mut self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let link = link.as_ref().to_path_buf();
        self.add_dir(&link);
        self.links.insert(link, target.as_ref().to_path_buf());
    }

    /// Adds a USB device (or interface) below `sysfs_root`, plus its udev
    /// database record under `udev_root` when it has a device number.
    pub fn add_usb_device(
        &mut self,
        sysfs_root: impl AsRef<Path>,
        udev_root: impl AsRef<Path>,
        fixture: &UsbFixture<'_>,
    ) {
        let sysfs_root = sysfs_root.as_ref();
        let entry = sysfs_root.join("bus/usb/devices").join(fixture.name);
        self.add_link(&entry, sysfs_root.join(fixture.device_path));

        let mut uevent = format!("DEVTYPE={}\n", fixture.devtype);
        if let Some((major, minor)) = fixture.major_minor {
            uevent.push_str(&format!("MAJOR={major}\nMINOR={minor}\n"));
        }
        uevent.push_str(&format!(
            "PRODUCT={}/{}/100\n",
            fixture.vendor_id.trim_start_matches('0'),
            fixture.product_id.trim_start_matches('0')
        ));
        self.add_file(entry.join("uevent"), uevent);

        if fixture.devtype != "usb_device" {
            return;
        }

        self.add_file(entry.join("idVendor"), format!("{}\n", fixture.vendor_id));
        self.add_file(entry.join("idProduct"), format!("{}\n", fixture.product_id));
        if let Some(serial) = fixture.serial {
            self.add_file(entry.join("serial"), format!("{serial}\n"));
        }
        if let Some(product) = fixture.product {
            self.add_file(entry.join("product"), format!("{product}\n"));
        }

        if let Some((major, minor)) = fixture.major_minor
            && !fixture.udev_properties.is_empty()
        {
            let mut record = String::from("I:1234567\n");
            for (key, value) in fixture.udev_properties {
                record.push_str(&format!("E:{key}={value}\n"));
            }
            record.push_str("G:seat\n");
            self.add_file(
                udev_root.as_ref().join(format!("c{major}:{minor}")),
                record,
            );
        }
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        if let Some(target) = self.links.get(path) {
            return Ok(target.clone());
        }
        if self.exists(path) {
            Ok(path.to_path_buf())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("path not found: {:?}", path),
            ))
        }
    }
}
