//! usbscope-core: shared library for the usbscope collector.
//!
//! Provides:
//! - `model`: `Event` and `DeviceInfo` records and their positional wire form
//! - `collector`: kernel log tailing/parsing and USB device enumeration/hot-plug
//! - `store`: the bounded event log, current device set and error-burst detector
//! - `service`: collector service identity, method names and endpoint resolution
//! - `client`: queries and notification subscription against a running collector

pub mod client;
pub mod collector;
pub mod model;
pub mod service;
pub mod store;

/// Crate version reported by `GetVersion`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git SHA the binary was built from ("unknown" outside a checkout).
pub const GIT_SHA: &str = env!("USBSCOPE_GIT_SHA");
