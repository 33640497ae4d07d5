//! Producers: kernel log tail task and USB hot-plug watcher thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;

use tokio::sync::broadcast;
use tracing::{info, warn};

use usbscope_core::collector::{
    DeviceChangeWatcher, FileSystem, LogStreamReader, UeventGroup, UeventSocket,
};
use usbscope_core::store::EventStore;

// ============================================================
// Kernel log
// ============================================================

/// Feeds parsed kernel lines into the store until shutdown.
///
/// A failing log source only costs the event stream; queries keep being
/// served from whatever the store already holds.
pub(crate) async fn journal_task(
    reader: LogStreamReader,
    store: Arc<EventStore>,
    shutdown: broadcast::Receiver<()>,
) {
    match reader.run(|event| store.append_event(event), shutdown).await {
        Ok(()) => info!("kernel log reader stopped"),
        Err(e) => warn!(
            error = %e,
            "kernel log source unavailable, no further log events will be collected"
        ),
    }
}

// ============================================================
// USB hot-plug
// ============================================================

/// Runs the hot-plug watcher on its own thread; it blocks on the netlink
/// socket and checks `running` between waits. A failed socket is reopened
/// according to the watcher's restart policy.
pub(crate) fn spawn_device_watcher<F>(
    watcher: DeviceChangeWatcher<F>,
    group: UeventGroup,
    store: Arc<EventStore>,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>>
where
    F: FileSystem + Send + 'static,
{
    std::thread::Builder::new()
        .name("usb-hotplug".into())
        .spawn(move || {
            let open = || UeventSocket::open(group);
            match watcher.run(open, |devices| store.set_devices(devices), &running) {
                Ok(()) => info!("USB hot-plug watcher stopped"),
                Err(e) => warn!(
                    error = %e,
                    "USB hot-plug monitoring unavailable, device set will not update"
                ),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use usbscope_core::collector::{DeviceEnumerator, JournalCommand, MockFs, RestartPolicy};
    use usbscope_core::store::StoreConfig;

    #[tokio::test]
    async fn test_journal_task_fills_store() {
        let store = Arc::new(EventStore::new(StoreConfig::default()));
        let reader = LogStreamReader::new(
            JournalCommand::new(
                "sh",
                ["-c", "printf 'Oct 18 10:00:01 h kernel: usb 1-2: USB disconnect, device number 3\\n'"],
            ),
            RestartPolicy::Never,
        );
        let (_tx, rx) = broadcast::channel(1);

        journal_task(reader, store.clone(), rx).await;

        let events = store.recent_events(10);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_usb);
        assert_eq!(events[0].device_id, "1-2");
    }

    #[tokio::test]
    async fn test_journal_task_survives_missing_source() {
        let store = Arc::new(EventStore::new(StoreConfig::default()));
        let reader = LogStreamReader::new(
            JournalCommand::new("/nonexistent/journalctl", Vec::<String>::new()),
            RestartPolicy::Never,
        );
        let (_tx, rx) = broadcast::channel(1);

        journal_task(reader, store.clone(), rx).await;
        assert_eq!(store.state_summary().event_count, 0);
    }

    #[test]
    fn test_device_watcher_publishes_initial_set() {
        let store = Arc::new(EventStore::new(StoreConfig::default()));
        let running = Arc::new(AtomicBool::new(true));
        let watcher = DeviceChangeWatcher::new(DeviceEnumerator::new(
            MockFs::typical_usb_bus(),
            "/sys",
            "/run/udev/data",
        ));

        let handle =
            spawn_device_watcher(watcher, UeventGroup::Udev, store.clone(), running.clone())
                .unwrap();

        // The initial snapshot is published whether or not the netlink
        // socket can be opened in this environment.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while store.state_summary().device_count == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(store.state_summary().device_count, 3);

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
