//! Kernel hot-plug socket (`AF_NETLINK` / `NETLINK_KOBJECT_UEVENT`).
//!
//! The socket is only a trigger for re-enumeration, so sender credentials
//! are not checked: a forged message costs one extra sysfs scan.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use super::UeventGroup;
use super::uevent::{self, Uevent};
use super::watcher::UeventSource;

/// Largest uevent datagram we accept; the kernel caps them at 8 KiB.
const RECV_BUFFER_SIZE: usize = 16 * 1024;

/// Bound netlink socket subscribed to one uevent multicast group.
///
/// The file descriptor is closed when this value is dropped.
#[derive(Debug)]
pub struct UeventSocket {
    fd: OwnedFd,
    buf: Vec<u8>,
}

impl UeventSocket {
    pub fn open(group: UeventGroup) -> io::Result<Self> {
        // SAFETY: plain socket(2) call; the result is checked before use.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_pid = 0;
        addr.nl_groups = group.multicast_mask();

        // SAFETY: `addr` outlives the call and the length matches its type.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd,
            buf: vec![0; RECV_BUFFER_SIZE],
        })
    }

    /// Waits up to `timeout` for the socket to become readable.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: one valid pollfd, count matches.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(rc > 0 && pfd.revents & libc::POLLIN != 0)
    }
}

impl UeventSource for UeventSocket {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Uevent>> {
        if !self.wait_readable(timeout)? {
            return Ok(None);
        }

        // SAFETY: the buffer is valid for `len` writable bytes.
        let n = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                self.buf.as_mut_ptr() as *mut libc::c_void,
                self.buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                // ENOBUFS: the kernel dropped messages; rescanning catches up.
                _ if err.raw_os_error() == Some(libc::ENOBUFS) => Ok(Some(Uevent::lost_messages())),
                _ => Err(err),
            };
        }

        Ok(uevent::decode(&self.buf[..n as usize]))
    }
}
