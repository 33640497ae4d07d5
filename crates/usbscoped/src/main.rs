//! usbscoped - USB activity collector daemon.
//!
//! Tails the kernel log, watches USB hot-plug events and serves both as
//! queries and push notifications on a local Unix socket.

mod background;
mod handlers;
mod ownership;
mod state;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use usbscope_core::collector::{
    DeviceChangeWatcher, DeviceEnumerator, JournalCommand, LogStreamReader, RealFs,
    RestartPolicy, UeventGroup,
};
use usbscope_core::service::{BusSelection, Endpoint, INTERFACE, SERVICE_NAME};
use usbscope_core::store::{DEFAULT_CAPACITY, EventStore, StoreConfig};

use ownership::{OwnershipError, ServiceOwnership};
use state::AppState;

/// Exit code when startup fails.
const EXIT_BOOTSTRAP_FAILED: i32 = 1;

/// Exit code when another collector already owns the service.
const EXIT_ALREADY_RUNNING: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RestartMode {
    /// Report the first failure and stop collecting from that source.
    Never,
    /// Restart with exponential backoff (1s doubling up to 60s).
    Backoff,
}

impl From<RestartMode> for RestartPolicy {
    fn from(mode: RestartMode) -> Self {
        match mode {
            RestartMode::Never => RestartPolicy::Never,
            RestartMode::Backoff => RestartPolicy::default(),
        }
    }
}

/// USB activity collector daemon.
#[derive(Parser)]
#[command(name = "usbscoped", about = "USB activity collector daemon", version = usbscope_core::VERSION)]
struct Args {
    /// Channel scope: auto, session or system.
    /// Session is used when XDG_RUNTIME_DIR is set, system otherwise;
    /// unrecognized values mean auto.
    #[arg(long, env = "USBSCOPE_BUS", default_value = "auto")]
    bus: BusSelection,

    /// Explicit socket path, overriding the one derived from --bus.
    #[arg(long, env = "USBSCOPE_SOCKET", value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Number of kernel log events kept in memory.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Historical kernel lines replayed at startup.
    #[arg(long, default_value = "200")]
    seed_lines: usize,

    /// What to do when journalctl fails to start or exits.
    #[arg(long, value_enum, default_value_t = RestartMode::Backoff)]
    journal_restart: RestartMode,

    /// What to do when the hot-plug socket cannot be opened or fails.
    #[arg(long, value_enum, default_value_t = RestartMode::Backoff)]
    hotplug_restart: RestartMode,

    /// Path to sysfs (for testing/mocking).
    #[arg(long, default_value = "/sys")]
    sysfs_root: PathBuf,

    /// Path to the udev database.
    #[arg(long, default_value = "/run/udev/data")]
    udev_data: PathBuf,

    /// Netlink group for hot-plug messages: udev or kernel.
    #[arg(long, default_value = "udev")]
    uevent_group: UeventGroup,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// `RUST_LOG` directives are applied first; the crate levels are added on top.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["usbscoped", "usbscope_core", "tower_http"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(EXIT_BOOTSTRAP_FAILED);
        }
    };

    let code = runtime.block_on(async_main(args));
    drop(runtime);
    process::exit(code);
}

async fn async_main(args: Args) -> i32 {
    let endpoint = Endpoint::from_env(args.bus);
    let endpoint = match args.socket.clone() {
        Some(path) => endpoint.with_socket(path),
        None => endpoint,
    };

    info!(
        version = usbscope_core::VERSION,
        git = usbscope_core::GIT_SHA,
        service = SERVICE_NAME,
        interface = INTERFACE,
        bus = %endpoint.scope,
        socket = %endpoint.socket_path.display(),
        "usbscoped starting"
    );

    let mut ownership = match ServiceOwnership::acquire(&endpoint.socket_path) {
        Ok(o) => o,
        Err(OwnershipError::AlreadyOwned(path)) => {
            error!(
                socket = %path.display(),
                "another collector already owns the service, exiting"
            );
            return EXIT_ALREADY_RUNNING;
        }
        Err(e) => {
            error!(error = %e, "failed to register service");
            return EXIT_BOOTSTRAP_FAILED;
        }
    };
    let listener = match ownership.bind() {
        Ok(l) => l,
        Err(e) => {
            error!(socket = %ownership.socket_path().display(), error = %e, "failed to bind socket");
            return EXIT_BOOTSTRAP_FAILED;
        }
    };

    let store = Arc::new(EventStore::new(StoreConfig {
        capacity: args.capacity,
        ..Default::default()
    }));

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, mut server_shutdown) = broadcast::channel::<()>(1);
    {
        let running = running.clone();
        let tx = shutdown_tx.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
            let _ = tx.send(());
        }) {
            warn!("Failed to set signal handler: {}", e);
        }
    }

    // Kernel log producer
    let reader = LogStreamReader::new(
        JournalCommand::kernel(args.seed_lines),
        args.journal_restart.into(),
    );
    let journal = tokio::spawn(background::journal_task(
        reader,
        store.clone(),
        shutdown_tx.subscribe(),
    ));

    // USB device producer
    let enumerator = DeviceEnumerator::new(RealFs::new(), &args.sysfs_root, &args.udev_data);
    let watcher = match background::spawn_device_watcher(
        DeviceChangeWatcher::new(enumerator).with_restart(args.hotplug_restart.into()),
        args.uevent_group,
        store.clone(),
        running.clone(),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "failed to start USB watcher thread, no devices will be reported");
            None
        }
    };

    let app = handlers::router(AppState::new(store.clone(), shutdown_tx.clone()))
        .layer(TraceLayer::new_for_http());

    info!(socket = %ownership.socket_path().display(), "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.recv().await;
        })
        .await;

    let code = match served {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "server error");
            EXIT_BOOTSTRAP_FAILED
        }
    };

    // Graceful shutdown
    info!("Shutting down...");
    running.store(false, Ordering::SeqCst);
    let _ = shutdown_tx.send(());

    if let Err(e) = journal.await {
        warn!(error = %e, "kernel log task failed");
    }
    if let Some(handle) = watcher {
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => debug!("USB watcher joined"),
            _ => warn!("USB watcher thread panicked"),
        }
    }

    let summary = store.state_summary();
    drop(ownership);
    info!(
        events = summary.event_count,
        devices = summary.device_count,
        "usbscoped stopped"
    );
    code
}
