//! HTTP request handlers: collector queries and the notification stream.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use futures_core::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use usbscope_core::model::{DeviceInfo, StateSummary};
use usbscope_core::service::{method, method_path};

use crate::state::{AppState, SSE_CONNECTIONS};

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route(
            &method_path(method::GET_RECENT_EVENTS),
            get(handle_recent_events),
        )
        .route(
            &method_path(method::GET_CURRENT_DEVICES),
            get(handle_current_devices),
        )
        .route(
            &method_path(method::GET_STATE_SUMMARY),
            get(handle_state_summary),
        )
        .route(&method_path(method::GET_VERSION), get(handle_version))
        .route(&method_path(method::SIGNALS), get(handle_signals))
        .with_state(state)
}

// ============================================================
// Queries
// ============================================================

#[derive(Deserialize)]
pub(crate) struct RecentEventsQuery {
    /// Number of most recent events; zero or negative returns none.
    limit: i64,
}

pub(crate) async fn handle_recent_events(
    State(state): State<AppState>,
    Query(query): Query<RecentEventsQuery>,
) -> Json<Vec<usbscope_core::model::Event>> {
    let events = state.store.recent_events(query.limit);
    debug!(limit = query.limit, returned = events.len(), "GetRecentEvents");
    Json(events)
}

pub(crate) async fn handle_current_devices(State(state): State<AppState>) -> Json<Vec<DeviceInfo>> {
    Json(state.store.current_devices())
}

pub(crate) async fn handle_state_summary(State(state): State<AppState>) -> Json<StateSummary> {
    Json(state.store.state_summary())
}

pub(crate) async fn handle_version() -> Json<&'static str> {
    Json(usbscope_core::VERSION)
}

// ============================================================
// Notification stream
// ============================================================

/// Counts one open notification stream for as long as it lives.
struct SseGuard {
    active: &'static AtomicUsize,
}

impl SseGuard {
    fn connect(active: &'static AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::Relaxed) + 1;
        info!(active_subscribers = now, "subscriber connected");
        Self { active }
    }
}

impl Drop for SseGuard {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
        info!(active_subscribers = now, "subscriber disconnected");
    }
}

pub(crate) async fn handle_signals(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = signal_stream(&state, SseGuard::connect(&SSE_CONNECTIONS));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// The guard is owned by the stream from the start, so a response that is
/// dropped before its first poll still releases its slot.
fn signal_stream(
    state: &AppState,
    guard: SseGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + use<> {
    let mut rx = state.store.subscribe();
    let mut shutdown = state.shutdown.subscribe();

    async_stream::stream! {
        let _guard = guard;
        loop {
            let received = tokio::select! {
                _ = shutdown.recv() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(signal) => match signal.payload_json() {
                    Ok(json) => {
                        yield Ok(Event::default().event(signal.name()).data(json));
                    }
                    Err(e) => {
                        error!(signal = signal.name(), error = %e, "failed to encode notification");
                    }
                },
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged, oldest notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
