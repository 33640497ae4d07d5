//! Hot-plug watcher: re-enumerates on every USB uevent.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::enumerator::DeviceEnumerator;
use super::uevent::Uevent;
use crate::collector::log_collector::RestartPolicy;
use crate::collector::traits::FileSystem;
use crate::model::DeviceInfo;

/// How long one wait on the source may block; bounds shutdown latency.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A blocking source of hot-plug notifications.
pub trait UeventSource {
    /// Waits up to `timeout` for the next message. `Ok(None)` means
    /// nothing usable arrived in time.
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Uevent>>;
}

/// Publishes a full device snapshot at start and after each USB uevent.
///
/// No diffing is done; consumers compare snapshots themselves.
pub struct DeviceChangeWatcher<F: FileSystem> {
    enumerator: DeviceEnumerator<F>,
    restart: RestartPolicy,
}

impl<F: FileSystem> DeviceChangeWatcher<F> {
    /// A watcher that reopens a failed source with the default backoff.
    pub fn new(enumerator: DeviceEnumerator<F>) -> Self {
        Self {
            enumerator,
            restart: RestartPolicy::default(),
        }
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Current device set; an unreachable bus degrades to an empty set.
    pub fn snapshot(&self) -> Vec<DeviceInfo> {
        match self.enumerator.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "USB enumeration failed, reporting no devices");
                Vec::new()
            }
        }
    }

    /// Publishes the initial snapshot, then watches sources produced by
    /// `open` until `running` is cleared.
    ///
    /// When a source cannot be opened or fails while waiting, the restart
    /// policy decides: `Never` returns the error, `Backoff` opens a new
    /// source after the delay and republishes a fresh snapshot, since
    /// changes made while no source was listening were missed. Each source
    /// is dropped (releasing its OS handle) before the next is opened.
    pub fn run<S, O, P>(&self, mut open: O, mut publish: P, running: &AtomicBool) -> io::Result<()>
    where
        S: UeventSource,
        O: FnMut() -> io::Result<S>,
        P: FnMut(Vec<DeviceInfo>),
    {
        let initial = self.snapshot();
        info!(devices = initial.len(), "initial USB device snapshot");
        publish(initial);

        let mut delay = match self.restart {
            RestartPolicy::Backoff { initial, .. } => initial,
            RestartPolicy::Never => Duration::ZERO,
        };
        let mut resync = false;

        while running.load(Ordering::SeqCst) {
            let mut delivered = 0u64;
            let result = match open() {
                Ok(mut source) => {
                    info!("USB hot-plug monitoring started");
                    if resync {
                        publish(self.snapshot());
                    }
                    let watched = self.watch(&mut source, &mut publish, running, &mut delivered);
                    drop(source);
                    watched
                }
                Err(e) => Err(e),
            };
            let Err(e) = result else {
                break;
            };

            let RestartPolicy::Backoff { initial, max } = self.restart else {
                return Err(e);
            };
            if delivered > 0 {
                delay = initial;
            }
            warn!(
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "USB hot-plug source failed, reopening"
            );
            if !sleep_while_running(delay, running) {
                break;
            }
            delay = (delay * 2).min(max);
            resync = true;
        }

        debug!("USB hot-plug monitoring stopped");
        Ok(())
    }

    /// Republishes on every USB uevent; `Ok` only once `running` clears.
    fn watch<S, P>(
        &self,
        source: &mut S,
        publish: &mut P,
        running: &AtomicBool,
        delivered: &mut u64,
    ) -> io::Result<()>
    where
        S: UeventSource,
        P: FnMut(Vec<DeviceInfo>),
    {
        while running.load(Ordering::SeqCst) {
            let Some(event) = source.next_event(POLL_INTERVAL)? else {
                continue;
            };
            *delivered += 1;
            if !event.is_usb() {
                continue;
            }
            debug!(
                action = event.action().unwrap_or("unknown"),
                devpath = event.get("DEVPATH").unwrap_or(""),
                "USB uevent"
            );
            publish(self.snapshot());
        }
        Ok(())
    }
}

/// Sleeps for `delay` in slices of [`POLL_INTERVAL`]; returns whether the
/// watcher is still running.
fn sleep_while_running(delay: Duration, running: &AtomicBool) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(POLL_INTERVAL);
        std::thread::sleep(slice);
        remaining -= slice;
    }
    running.load(Ordering::SeqCst)
}
