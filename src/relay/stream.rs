// Stream relay — forward pipe from extractor stdout to the HTTP response body.

use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::body::Body;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::process::{RelayChild, RelayState, StateHandle};
use crate::config::{STREAM_CHANNEL_DEPTH, STREAM_IDLE_TIMEOUT};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// An open relay: the response body plus a state handle observers can poll.
#[derive(Debug)]
pub struct RelayStream {
    pub body: Body,
    pub state: StateHandle,
}

/// Spawn the extractor for `url` and connect its stdout to a response body.
///
/// Holds the response back until the first chunk arrives (or the process
/// exits early), so failures before any byte is emitted surface as an error
/// instead of an empty 200. After the first chunk, errors end the chunked
/// stream mid-flight; there is no resumable-download support.
pub async fn open_stream(binary: &Path, url: &str) -> Result<RelayStream> {
    open_stream_with_idle_timeout(binary, url, STREAM_IDLE_TIMEOUT).await
}

/// Same as [`open_stream`] with an explicit idle-data bound.
pub async fn open_stream_with_idle_timeout(
    binary: &Path,
    url: &str,
    idle_timeout: Duration,
) -> Result<RelayStream> {
    let mut child = RelayChild::spawn(binary, url)?;
    let state = child.state_handle();
    let stdout = child
        .take_stdout()
        .ok_or_else(|| anyhow!("extractor stdout was not captured"))?;

    // Bounded channel: the HTTP response draining the receiver is the only
    // consumer, so its flow control throttles the pump, which in turn lets
    // the subprocess block on its own full pipe.
    let (tx, mut rx) = mpsc::channel::<io::Result<Bytes>>(STREAM_CHANNEL_DEPTH);
    tokio::spawn(pump(child, stdout, tx, idle_timeout));

    match rx.recv().await {
        Some(Ok(first)) => {
            let rest = ReceiverStream::new(rx);
            let stream = tokio_stream::once(Ok::<_, io::Error>(first)).chain(rest);
            Ok(RelayStream {
                body: Body::from_stream(stream),
                state,
            })
        }
        Some(Err(err)) => Err(anyhow!("extractor failed before any bytes: {err}")),
        None => Err(anyhow!("extractor produced no audio data")),
    }
}

/// Read stdout until EOF, error, idle timeout, or client disconnect.
///
/// The pump owns the child on every exit path: whatever ends the loop, the
/// process is signalled (when still running) and reaped before the task
/// returns, so no extractor outlives its request.
async fn pump(
    mut child: RelayChild,
    mut stdout: ChildStdout,
    tx: mpsc::Sender<io::Result<Bytes>>,
    idle_timeout: Duration,
) {
    let state = child.state_handle();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];

    loop {
        match timeout(idle_timeout, stdout.read(&mut buf)).await {
            // EOF — fall through to reap and record the exit status.
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                state.set(RelayState::Streaming);
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if tx.send(Ok(chunk)).await.is_err() {
                    // Receiver dropped: the client disconnected. The one
                    // path that kills a still-running process.
                    debug!("client disconnected, killing extractor");
                    child.terminate();
                    let _ = child.wait().await;
                    state.set(RelayState::Aborted);
                    return;
                }
            }
            Ok(Err(err)) => {
                warn!("extractor stdout read failed: {err}");
                child.terminate();
                let _ = child.wait().await;
                state.set(RelayState::Failed);
                let _ = tx.send(Err(err)).await;
                return;
            }
            Err(_) => {
                warn!(
                    "no extractor output for {:?}, killing hung process",
                    idle_timeout
                );
                child.terminate();
                let _ = child.wait().await;
                state.set(RelayState::Failed);
                let _ = tx
                    .send(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "extractor produced no data",
                    )))
                    .await;
                return;
            }
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => {
            debug!("extractor completed");
            state.set(RelayState::Completed);
        }
        Ok(status) => {
            warn!("extractor exited with {status}");
            state.set(RelayState::Failed);
            let _ = tx
                .send(Err(io::Error::other(format!(
                    "extractor exited with {status}"
                ))))
                .await;
        }
        Err(err) => {
            warn!("failed to reap extractor: {err}");
            state.set(RelayState::Failed);
        }
    }
}
