//! Collector service identity and endpoint resolution.
//!
//! The service is reached over HTTP on a Unix domain socket whose name is
//! the well-known service name. Methods live under the object path:
//!
//! ```text
//! GET /org/usbscope/Collector/GetRecentEvents?limit=N   -> [Event, ...]
//! GET /org/usbscope/Collector/GetCurrentDevices         -> [DeviceInfo, ...]
//! GET /org/usbscope/Collector/GetStateSummary           -> [eventCount, deviceCount]
//! GET /org/usbscope/Collector/GetVersion                -> "x.y.z"
//! GET /org/usbscope/Collector/Signals                   -> text/event-stream
//! ```

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

/// Well-known name; also the socket file stem.
pub const SERVICE_NAME: &str = "org.usbscope.Collector";

/// Interface name reported alongside the version.
pub const INTERFACE: &str = "org.usbscope.Collector1";

pub const OBJECT_PATH: &str = "/org/usbscope/Collector";

/// Runtime directory of the system-wide instance.
pub const SYSTEM_RUNTIME_DIR: &str = "/run/usbscope";

pub mod method {
    pub const GET_RECENT_EVENTS: &str = "GetRecentEvents";
    pub const GET_CURRENT_DEVICES: &str = "GetCurrentDevices";
    pub const GET_STATE_SUMMARY: &str = "GetStateSummary";
    pub const GET_VERSION: &str = "GetVersion";
    /// Notification stream, not a query.
    pub const SIGNALS: &str = "Signals";
}

pub mod signal {
    pub const LOG_EVENT: &str = "LogEvent";
    pub const DEVICES_CHANGED: &str = "DevicesChanged";
    pub const ERROR_BURST: &str = "ErrorBurst";
}

/// Route of a method under the object path.
pub fn method_path(method: &str) -> String {
    format!("{}/{}", OBJECT_PATH, method)
}

/// Which channel the collector binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusScope {
    /// Per-user, under `$XDG_RUNTIME_DIR`.
    Session,
    /// Machine-wide, under [`SYSTEM_RUNTIME_DIR`].
    System,
}

impl BusScope {
    pub fn as_str(self) -> &'static str {
        match self {
            BusScope::Session => "session",
            BusScope::System => "system",
        }
    }
}

impl std::fmt::Display for BusScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested scope; `Auto` prefers the session channel when one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusSelection {
    #[default]
    Auto,
    Session,
    System,
}

impl FromStr for BusSelection {
    type Err = Infallible;

    /// Only `session` and `system` select a channel; anything else,
    /// including an empty value, means `Auto`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "session" | "user" => BusSelection::Session,
            "system" => BusSelection::System,
            _ => BusSelection::Auto,
        })
    }
}

/// Resolved listening address of the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scope: BusScope,
    pub socket_path: PathBuf,
}

impl Endpoint {
    /// Resolve the socket for `selection`.
    ///
    /// `runtime_dir` is the session runtime directory (`XDG_RUNTIME_DIR`);
    /// an empty or missing value means no session channel is available, in
    /// which case every selection lands on the system channel.
    pub fn resolve(selection: BusSelection, runtime_dir: Option<&Path>) -> Self {
        let session_dir = runtime_dir.filter(|d| !d.as_os_str().is_empty());
        let (scope, dir) = match (selection, session_dir) {
            (BusSelection::System, _) | (BusSelection::Auto, None) => {
                (BusScope::System, Path::new(SYSTEM_RUNTIME_DIR))
            }
            (BusSelection::Session, None) => {
                warn!(
                    "session channel requested but XDG_RUNTIME_DIR is not set, using system channel"
                );
                (BusScope::System, Path::new(SYSTEM_RUNTIME_DIR))
            }
            (BusSelection::Session | BusSelection::Auto, Some(dir)) => (BusScope::Session, dir),
        };
        Self {
            scope,
            socket_path: dir.join(socket_file_name()),
        }
    }

    /// Resolve from the process environment.
    pub fn from_env(selection: BusSelection) -> Self {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from);
        Self::resolve(selection, runtime_dir.as_deref())
    }

    /// Use an explicit socket path, keeping the requested scope label.
    pub fn with_socket(mut self, socket_path: PathBuf) -> Self {
        self.socket_path = socket_path;
        self
    }
}

pub fn socket_file_name() -> String {
    format!("{}.sock", SERVICE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> BusSelection {
        s.parse().unwrap()
    }

    #[test]
    fn test_auto_prefers_session() {
        let ep = Endpoint::resolve(BusSelection::Auto, Some(Path::new("/run/user/1000")));
        assert_eq!(ep.scope, BusScope::Session);
        assert_eq!(
            ep.socket_path,
            PathBuf::from("/run/user/1000/org.usbscope.Collector.sock")
        );
    }

    #[test]
    fn test_auto_falls_back_to_system() {
        let ep = Endpoint::resolve(BusSelection::Auto, None);
        assert_eq!(ep.scope, BusScope::System);
        assert_eq!(
            ep.socket_path,
            PathBuf::from("/run/usbscope/org.usbscope.Collector.sock")
        );

        let ep = Endpoint::resolve(BusSelection::Auto, Some(Path::new("")));
        assert_eq!(ep.scope, BusScope::System);
    }

    #[test]
    fn test_explicit_system_ignores_session() {
        let ep = Endpoint::resolve(BusSelection::System, Some(Path::new("/run/user/1000")));
        assert_eq!(ep.scope, BusScope::System);
    }

    #[test]
    fn test_session_without_runtime_dir_falls_back_to_system() {
        let ep = Endpoint::resolve(BusSelection::Session, None);
        assert_eq!(ep.scope, BusScope::System);
        assert_eq!(
            ep.socket_path,
            PathBuf::from("/run/usbscope/org.usbscope.Collector.sock")
        );
    }

    #[test]
    fn test_bus_selection_parse() {
        assert_eq!(parse("SYSTEM"), BusSelection::System);
        assert_eq!(parse("session"), BusSelection::Session);
        assert_eq!(parse(""), BusSelection::Auto);
        assert_eq!(parse("auto"), BusSelection::Auto);
    }

    #[test]
    fn test_unknown_bus_value_means_auto() {
        assert_eq!(parse("both"), BusSelection::Auto);

        let ep = Endpoint::resolve(parse("bogus"), Some(Path::new("/run/user/1000")));
        assert_eq!(ep.scope, BusScope::Session);
        let ep = Endpoint::resolve(parse("bogus"), None);
        assert_eq!(ep.scope, BusScope::System);
    }

    #[test]
    fn test_method_path() {
        assert_eq!(
            method_path(method::GET_RECENT_EVENTS),
            "/org/usbscope/Collector/GetRecentEvents"
        );
    }
}
