//! Child-process tailer for the kernel log.
//!
//! Runs `journalctl` in follow mode and hands back complete lines. Bytes
//! after the last newline stay buffered until the line is terminated; a
//! fragment left when the child closes stdout is discarded.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

/// Historical lines replayed before following.
pub const DEFAULT_SEED_LINES: usize = 200;

/// Program and arguments producing the log stream on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalCommand {
    program: String,
    args: Vec<String>,
}

impl JournalCommand {
    /// Arbitrary command; used for tests and non-journald hosts.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `journalctl -k -n <seed_lines> -f -o short`.
    pub fn kernel(seed_lines: usize) -> Self {
        Self::new(
            "journalctl",
            [
                "-k".to_string(),
                "-n".to_string(),
                seed_lines.to_string(),
                "-f".to_string(),
                "-o".to_string(),
                "short".to_string(),
            ],
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for JournalCommand {
    fn default() -> Self {
        Self::kernel(DEFAULT_SEED_LINES)
    }
}

/// A running log child and the read side of its stdout.
pub struct JournalTail {
    child: Child,
    reader: BufReader<ChildStdout>,
    buf: Vec<u8>,
}

impl JournalTail {
    /// Start the child. The child is killed if this value is dropped.
    pub fn spawn(command: &JournalCommand) -> io::Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;

        Ok(Self {
            child,
            reader: BufReader::new(stdout),
            buf: Vec::with_capacity(512),
        })
    }

    /// Next complete line without its terminator, or `None` once stdout
    /// is closed.
    ///
    /// Cancel safe: bytes read before a cancellation stay in the buffer.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 {
                if !self.buf.is_empty() {
                    debug!(bytes = self.buf.len(), "dropping unterminated trailing line");
                    self.buf.clear();
                }
                return Ok(None);
            }
            if self.buf.last() != Some(&b'\n') {
                // EOF in the middle of a line; the next read reports it.
                continue;
            }

            let line = String::from_utf8_lossy(&self.buf).trim().to_string();
            self.buf.clear();
            return Ok(Some(line));
        }
    }

    /// Wait for the child to exit after stdout closed.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kill the child and reap it.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "log child already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> JournalCommand {
        JournalCommand::new("sh", ["-c", script])
    }

    #[test]
    fn test_kernel_command_args() {
        let cmd = JournalCommand::kernel(200);
        assert_eq!(cmd.program(), "journalctl");
        assert_eq!(cmd.args, vec!["-k", "-n", "200", "-f", "-o", "short"]);
        assert_eq!(JournalCommand::default(), cmd);
    }

    #[tokio::test]
    async fn test_tail_reads_complete_lines() {
        let mut tail = JournalTail::spawn(&sh("printf 'first\\nsecond\\n'")).unwrap();

        assert_eq!(tail.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(tail.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(tail.next_line().await.unwrap(), None);
        assert!(tail.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_tail_drops_trailing_fragment() {
        let mut tail = JournalTail::spawn(&sh("printf 'whole\\nhalf'")).unwrap();

        assert_eq!(tail.next_line().await.unwrap().as_deref(), Some("whole"));
        assert_eq!(tail.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tail_joins_split_writes() {
        let mut tail =
            JournalTail::spawn(&sh("printf 'usb 1-2: re'; sleep 0.1; printf 'set\\n'")).unwrap();

        assert_eq!(
            tail.next_line().await.unwrap().as_deref(),
            Some("usb 1-2: reset")
        );
    }

    #[tokio::test]
    async fn test_tail_lossy_utf8() {
        let mut tail = JournalTail::spawn(&sh("printf 'bad \\377 byte\\n'")).unwrap();
        let line = tail.next_line().await.unwrap().unwrap();
        assert!(line.starts_with("bad "));
        assert!(line.ends_with(" byte"));
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = JournalTail::spawn(&JournalCommand::new(
            "/nonexistent/usbscope-log-source",
            Vec::<String>::new(),
        ));
        assert!(result.is_err());
    }
}
