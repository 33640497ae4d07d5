//! Filesystem access seam for sysfs and udev database reads.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Minimal read-only filesystem used by the device enumerator.
pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn exists(&self, path: &Path) -> bool;

    /// Lists the full paths of the direct children of `path`.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Resolves symlinks (sysfs bus entries point into `/sys/devices`).
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_fs_reads_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("idVendor"), "1d6b\n").unwrap();
        std::fs::create_dir(dir.path().join("1-0:1.0")).unwrap();

        let fs = RealFs::new();
        assert_eq!(
            fs.read_to_string(&dir.path().join("idVendor")).unwrap(),
            "1d6b\n"
        );
        let mut entries = fs.read_dir(dir.path()).unwrap();
        entries.sort();
        assert_eq!(entries.len(), 2);
        assert!(fs.exists(&dir.path().join("1-0:1.0")));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_fs_canonicalize_follows_links() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("devices").join("1-2");
        std::fs::create_dir_all(&target).unwrap();
        let link = dir.path().join("1-2");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let fs = RealFs::new();
        assert_eq!(
            fs.canonicalize(&link).unwrap(),
            std::fs::canonicalize(&target).unwrap()
        );
    }
}
