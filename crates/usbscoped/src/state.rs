//! Shared application state and global statics.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use tokio::sync::broadcast;

use usbscope_core::store::EventStore;

/// State handed to every request handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<EventStore>,
    /// Fires once when the collector is stopping; ends open signal streams.
    pub(crate) shutdown: broadcast::Sender<()>,
}

impl AppState {
    pub(crate) fn new(store: Arc<EventStore>, shutdown: broadcast::Sender<()>) -> Self {
        Self { store, shutdown }
    }
}

pub(crate) static SSE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);
