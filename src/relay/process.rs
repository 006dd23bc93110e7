// Relay subprocess — spawn, state tracking, and idempotent termination of the extractor.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

use crate::config::EXTRACTOR_BUFFER_SIZE;

/// Lifecycle of one relayed extraction.
///
/// `Completed` and `Failed` are reached through natural process exit;
/// `Aborted` only through client-initiated cancellation, the one transition
/// that actively kills a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Spawned,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelayState::Completed | RelayState::Aborted | RelayState::Failed
        )
    }
}

/// Shared view of a relay's state. Terminal states are sticky.
#[derive(Clone, Debug)]
pub struct StateHandle(Arc<RwLock<RelayState>>);

impl StateHandle {
    fn new() -> Self {
        Self(Arc::new(RwLock::new(RelayState::Spawned)))
    }

    pub fn get(&self) -> RelayState {
        *self.0.read()
    }

    pub(crate) fn set(&self, next: RelayState) {
        let mut state = self.0.write();
        if !state.is_terminal() {
            *state = next;
        }
    }
}

/// Owns the spawned extraction subprocess for the duration of one request.
/// Never shared across requests.
pub struct RelayChild {
    child: Child,
    state: StateHandle,
    kill_sent: bool,
}

impl RelayChild {
    /// Spawn the extractor in audio-streaming mode: best-available audio,
    /// playlist traversal disabled, bounded internal buffer, raw bytes on
    /// stdout.
    pub fn spawn(binary: &Path, url: &str) -> Result<Self> {
        let mut child = Command::new(binary)
            .args([
                "-f",
                "ba",
                "--no-playlist",
                "--buffer-size",
                EXTRACTOR_BUFFER_SIZE,
                "-o",
                "-",
            ])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Last-resort cleanup if the owning pump task is dropped with
            // the runtime; explicit terminate/wait remains the primary path.
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning extractor {}", binary.display()))?;

        // stderr is diagnostics only; its content never aborts the stream.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr));
        }

        Ok(Self {
            child,
            state: StateHandle::new(),
            kill_sent: false,
        })
    }

    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// OS process id while the child is running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Send a termination signal to the child. Idempotent: repeated calls,
    /// or calls after the process has already exited, are no-ops.
    pub fn terminate(&mut self) {
        if self.kill_sent {
            return;
        }
        self.kill_sent = true;
        if let Err(err) = self.child.start_kill() {
            debug!("extractor kill skipped: {err}");
        }
    }

    /// Reap the child and return its exit status.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("extractor: {line}");
    }
}
