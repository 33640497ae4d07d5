//! Kernel log collector.
//!
//! Tails the kernel ring buffer through `journalctl`, parses each complete
//! line into an [`Event`] and pushes it to a consumer as it arrives. If the
//! child cannot start or exits, the reader either restarts it with backoff
//! or reports the failure once, depending on [`RestartPolicy`].

pub mod parser;
pub mod tailer;

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::model::Event;

use parser::parse_line;
use tailer::{JournalCommand, JournalTail};

/// First delay before restarting a failed log source.
const INITIAL_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the restart delay.
const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);

/// What to do when a producer's source cannot start or fails: the log
/// child exiting, or the hot-plug socket erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Report the failure and stop.
    Never,
    /// Restart after `initial`, doubling the delay up to `max`. The delay
    /// resets after a run that delivered at least one message.
    Backoff { initial: Duration, max: Duration },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Backoff {
            initial: INITIAL_RESTART_DELAY,
            max: MAX_RESTART_DELAY,
        }
    }
}

/// Error type for log source failures.
#[derive(Debug)]
pub enum TailError {
    /// The child could not be started.
    Spawn(io::Error),
    /// The child closed its output and exited.
    Exited(ExitStatus),
    /// Reading from or reaping the child failed.
    Io(io::Error),
}

impl std::fmt::Display for TailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TailError::Spawn(e) => write!(f, "failed to start log source: {}", e),
            TailError::Exited(status) => write!(f, "log source exited ({})", status),
            TailError::Io(e) => write!(f, "log source I/O error: {}", e),
        }
    }
}

impl std::error::Error for TailError {}

/// How one run of the child ended.
enum RunOutcome {
    Shutdown,
    Ended { delivered: u64, error: TailError },
}

/// Produces a live stream of kernel log events.
#[derive(Debug, Clone, Default)]
pub struct LogStreamReader {
    command: JournalCommand,
    restart: RestartPolicy,
}

impl LogStreamReader {
    pub fn new(command: JournalCommand, restart: RestartPolicy) -> Self {
        Self { command, restart }
    }

    /// Run until `shutdown` fires, calling `deliver` once per parsed line in
    /// arrival order.
    ///
    /// Returns `Ok(())` on shutdown. With [`RestartPolicy::Never`] the first
    /// start failure or exit is returned as an error; with backoff the
    /// reader keeps retrying and only returns on shutdown.
    pub async fn run<F>(
        &self,
        mut deliver: F,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), TailError>
    where
        F: FnMut(Event),
    {
        let mut delay = match self.restart {
            RestartPolicy::Backoff { initial, .. } => initial,
            RestartPolicy::Never => Duration::ZERO,
        };

        loop {
            let error = match JournalTail::spawn(&self.command) {
                Ok(mut tail) => {
                    info!(program = self.command.program(), "kernel log tail started");
                    match pump(&mut tail, &mut deliver, &mut shutdown).await {
                        RunOutcome::Shutdown => {
                            tail.shutdown().await;
                            debug!("kernel log tail stopped");
                            return Ok(());
                        }
                        RunOutcome::Ended { delivered, error } => {
                            if delivered > 0
                                && let RestartPolicy::Backoff { initial, .. } = self.restart
                            {
                                delay = initial;
                            }
                            error
                        }
                    }
                }
                Err(e) => TailError::Spawn(e),
            };

            let RestartPolicy::Backoff { max, .. } = self.restart else {
                return Err(error);
            };

            warn!(
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "kernel log source unavailable, restarting"
            );

            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(max);
        }
    }
}

async fn pump<F>(
    tail: &mut JournalTail,
    deliver: &mut F,
    shutdown: &mut broadcast::Receiver<()>,
) -> RunOutcome
where
    F: FnMut(Event),
{
    let mut delivered: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.recv() => return RunOutcome::Shutdown,
            line = tail.next_line() => match line {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    deliver(parse_line(&line));
                    delivered += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    return RunOutcome::Ended {
                        delivered,
                        error: TailError::Io(e),
                    };
                }
            },
        }
    }

    let error = match tail.wait().await {
        Ok(status) => TailError::Exited(status),
        Err(e) => TailError::Io(e),
    };
    RunOutcome::Ended { delivered, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn sh(script: &str) -> JournalCommand {
        JournalCommand::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_reader_delivers_parsed_lines_in_order() {
        let reader = LogStreamReader::new(
            sh("printf 'Oct 18 10:00:01 h kernel: usb 1-2: reset\\n\\nOct 18 10:00:02 h kernel: hello\\n'"),
            RestartPolicy::Never,
        );
        let (_tx, rx) = broadcast::channel(1);
        let mut events = Vec::new();

        let result = reader.run(|e| events.push(e), rx).await;

        assert!(matches!(result, Err(TailError::Exited(_))));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].device_id, "1-2");
        assert_eq!(events[1].message, "kernel: hello");
    }

    #[tokio::test]
    async fn test_reader_reports_spawn_failure() {
        let reader = LogStreamReader::new(
            JournalCommand::new("/nonexistent/usbscope-log-source", Vec::<String>::new()),
            RestartPolicy::Never,
        );
        let (_tx, rx) = broadcast::channel(1);

        let result = reader.run(|_| {}, rx).await;
        assert!(matches!(result, Err(TailError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_reader_restarts_with_backoff_until_shutdown() {
        let reader = LogStreamReader::new(
            sh("echo 'Oct 18 10:00:01 h kernel: tick'"),
            RestartPolicy::Backoff {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(20),
            },
        );
        let (tx, rx) = broadcast::channel(1);
        let count = Arc::new(Mutex::new(0usize));

        let counter = count.clone();
        let handle = tokio::spawn(async move {
            reader
                .run(move |_| *counter.lock().unwrap() += 1, rx)
                .await
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while *count.lock().unwrap() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reader did not restart");

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_reader_shutdown_kills_child() {
        let reader = LogStreamReader::new(
            sh("echo 'Oct 18 10:00:01 h kernel: up'; exec sleep 30"),
            RestartPolicy::Never,
        );
        let (tx, rx) = broadcast::channel(1);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            reader
                .run(
                    move |e| {
                        let _ = event_tx.send(e);
                    },
                    rx,
                )
                .await
        });

        let first = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.message, "kernel: up");

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
