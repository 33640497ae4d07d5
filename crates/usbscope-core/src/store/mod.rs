//! Authoritative collector state.
//!
//! [`EventStore`] owns the bounded event log, the current device set and
//! the error-burst window behind one mutex. Every mutation publishes its
//! notification while still holding the lock, so subscribers observe
//! notifications in exactly the order mutations were applied, and any
//! query issued after a mutation returns sees its effect.
//!
//! Fan-out goes through a bounded `tokio::sync::broadcast` channel: a slow
//! subscriber loses its oldest notifications instead of blocking producers
//! or other subscribers.

pub mod burst;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::model::{DeviceInfo, Event, StateSummary};
use crate::service::signal;

pub use burst::{DEFAULT_BURST_THRESHOLD, DEFAULT_BURST_WINDOW, ErrorBurstWindow};

/// Default number of events kept in memory.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Notifications a subscriber may fall behind before losing the oldest.
pub const DEFAULT_SIGNAL_BUFFER: usize = 1024;

/// A push notification emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// One appended event, in append order.
    LogEvent(Event),
    /// The device set was replaced; subscribers must re-query it.
    DevicesChanged,
    /// The error window reached the burst threshold.
    ErrorBurst { count: usize, last_message: String },
}

impl Signal {
    /// Notification name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::LogEvent(_) => signal::LOG_EVENT,
            Signal::DevicesChanged => signal::DEVICES_CHANGED,
            Signal::ErrorBurst { .. } => signal::ERROR_BURST,
        }
    }

    /// Positional JSON arguments: the event tuple, `[]`, or
    /// `[count, lastMessage]`.
    pub fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            Signal::LogEvent(event) => serde_json::to_string(event),
            Signal::DevicesChanged => Ok("[]".to_string()),
            Signal::ErrorBurst {
                count,
                last_message,
            } => serde_json::to_string(&(count, last_message)),
        }
    }

    /// Rebuilds a notification from its wire name and payload; `None` for
    /// names this version does not know.
    pub fn from_payload(name: &str, payload: &str) -> serde_json::Result<Option<Self>> {
        let signal = match name {
            signal::LOG_EVENT => Signal::LogEvent(serde_json::from_str(payload)?),
            signal::DEVICES_CHANGED => Signal::DevicesChanged,
            signal::ERROR_BURST => {
                let (count, last_message) = serde_json::from_str(payload)?;
                Signal::ErrorBurst {
                    count,
                    last_message,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(signal))
    }
}

/// Tunables for [`EventStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub capacity: usize,
    pub burst_window: Duration,
    pub burst_threshold: usize,
    pub signal_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            burst_window: DEFAULT_BURST_WINDOW,
            burst_threshold: DEFAULT_BURST_THRESHOLD,
            signal_buffer: DEFAULT_SIGNAL_BUFFER,
        }
    }
}

struct StoreInner {
    events: VecDeque<Event>,
    devices: Vec<DeviceInfo>,
    burst: ErrorBurstWindow,
}

/// Bounded event log, current device set and burst detector.
pub struct EventStore {
    capacity: usize,
    inner: Mutex<StoreInner>,
    signals: broadcast::Sender<Signal>,
}

impl EventStore {
    pub fn new(config: StoreConfig) -> Self {
        let (signals, _) = broadcast::channel(config.signal_buffer.max(1));
        Self {
            capacity: config.capacity,
            inner: Mutex::new(StoreInner {
                events: VecDeque::with_capacity(config.capacity.min(DEFAULT_CAPACITY)),
                devices: Vec::new(),
                burst: ErrorBurstWindow::new(config.burst_window, config.burst_threshold),
            }),
            signals,
        }
    }

    // Every mutation leaves the state consistent, so a poisoned lock is
    // still safe to use.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, signal: Signal) {
        // Err only means nobody is subscribed right now.
        let _ = self.signals.send(signal);
    }

    /// Append an event observed now.
    pub fn append_event(&self, event: Event) {
        self.append_event_at(event, Instant::now());
    }

    /// Append an event observed at `now`.
    ///
    /// Order of effects: the log is updated and trimmed to capacity, the
    /// event is published, then error events feed the burst window.
    pub fn append_event_at(&self, event: Event, now: Instant) {
        let mut inner = self.lock();

        inner.events.push_back(event.clone());
        while inner.events.len() > self.capacity {
            inner.events.pop_front();
        }

        let message = event.is_error.then(|| event.message.clone());
        self.publish(Signal::LogEvent(event));

        if let Some(last_message) = message
            && let Some(count) = inner.burst.record(now)
        {
            warn!(count, message = %last_message, "kernel error burst");
            self.publish(Signal::ErrorBurst {
                count,
                last_message,
            });
        }
    }

    /// Replace the device set wholesale.
    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        let mut inner = self.lock();
        debug!(devices = devices.len(), "device set replaced");
        inner.devices = devices;
        self.publish(Signal::DevicesChanged);
    }

    /// The last `min(limit, len)` events, oldest first. `limit <= 0`
    /// yields nothing.
    pub fn recent_events(&self, limit: i64) -> Vec<Event> {
        if limit <= 0 {
            return Vec::new();
        }
        let inner = self.lock();
        let take = usize::try_from(limit)
            .unwrap_or(usize::MAX)
            .min(inner.events.len());
        let skip = inner.events.len() - take;
        inner.events.iter().skip(skip).cloned().collect()
    }

    pub fn current_devices(&self) -> Vec<DeviceInfo> {
        self.lock().devices.clone()
    }

    pub fn state_summary(&self) -> StateSummary {
        let inner = self.lock();
        StateSummary {
            event_count: inner.events.len(),
            device_count: inner.devices.len(),
        }
    }

    /// New notification subscription, starting with the next mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.signals.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
