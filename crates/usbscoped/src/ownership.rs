//! Single-instance ownership of the service socket.
//!
//! An exclusive `flock` on `<socket>.lock` decides the owner. Only the
//! owner touches the socket path: it removes a stale socket left by a
//! crashed predecessor, binds a fresh one and unlinks it on drop. The lock
//! file itself is never removed, so every contender locks the same inode.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tracing::{debug, warn};

/// Error type for service registration.
#[derive(Debug)]
pub(crate) enum OwnershipError {
    /// Another collector holds the lock for this socket.
    AlreadyOwned(PathBuf),
    /// I/O error creating the lock or binding the socket.
    Io(io::Error),
}

impl std::fmt::Display for OwnershipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnershipError::AlreadyOwned(path) => {
                write!(f, "{} is already owned by another collector", path.display())
            }
            OwnershipError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for OwnershipError {}

impl From<io::Error> for OwnershipError {
    fn from(e: io::Error) -> Self {
        OwnershipError::Io(e)
    }
}

/// Held for as long as this process is the addressable collector.
#[derive(Debug)]
pub(crate) struct ServiceOwnership {
    socket_path: PathBuf,
    bound: bool,
    _lock: File,
}

pub(crate) fn lock_path(socket_path: &Path) -> PathBuf {
    let mut name = socket_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl ServiceOwnership {
    /// Take the lock for `socket_path`, creating its directory if needed.
    pub(crate) fn acquire(socket_path: &Path) -> Result<Self, OwnershipError> {
        if let Some(dir) = socket_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        let lock_path = lock_path(socket_path);
        let mut lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        // SAFETY: `lock` owns a valid descriptor for the duration of the call.
        let rc = unsafe { libc::flock(lock.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(OwnershipError::AlreadyOwned(socket_path.to_path_buf()));
            }
            return Err(err.into());
        }

        lock.set_len(0)?;
        writeln!(lock, "{}", std::process::id())?;
        debug!(lock = %lock_path.display(), "service lock acquired");

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            bound: false,
            _lock: lock,
        })
    }

    /// Bind the service socket, replacing a stale one.
    pub(crate) fn bind(&mut self) -> Result<UnixListener, OwnershipError> {
        match fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(path = %self.socket_path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        self.bound = true;
        Ok(listener)
    }

    pub(crate) fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ServiceOwnership {
    fn drop(&mut self) {
        if !self.bound {
            return;
        }
        if let Err(e) = fs::remove_file(&self.socket_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.socket_path.display(), error = %e, "failed to remove socket");
        }
    }
}
