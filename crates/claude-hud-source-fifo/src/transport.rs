//! Resilient reader for the hook event FIFO.
//!
//! [`StreamTransport::open`] spawns a read loop that keeps one reader
//! attached to the pipe for as long as the transport lives:
//!
//! - path missing: status `connecting`, retry every `retry_interval`;
//! - opened: status unchanged until the first bytes arrive (`connected`);
//! - writer closed (EOF): `disconnected`, drop the handle, reopen after
//!   `retry_interval` and wait for the next writer;
//! - any other failure: `error`, a [`TransportMessage::Fault`] is
//!   delivered and the loop backs off for `error_backoff`.
//!
//! The loop never gives up on its own; only [`StreamTransport::close`]
//! (or dropping the transport) stops it.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use claude_hud_core::types::{ConnectionStatus, HudEvent};
use tokio::net::unix::pipe;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::{DEFAULT_MAX_LINE_BYTES, LineDecoder};

const READ_BUF_SIZE: usize = 16 * 1024; // 16 KiB

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Delay before reopening after a missing path or writer EOF.
    pub retry_interval: Duration,
    /// Delay before retrying after an open/read failure.
    pub error_backoff: Duration,
    /// Bound of the event channel; a full channel pauses reading.
    pub channel_capacity: usize,
    pub max_line_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(5),
            channel_capacity: 1024,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

// ---------------------------------------------------------------------------
// Error / message
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a named pipe", .path.display())]
    NotAFifo { path: PathBuf },
    #[error("read from {} failed: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub enum TransportMessage {
    Event(HudEvent),
    Fault(TransportError),
}

// ---------------------------------------------------------------------------
// StreamTransport
// ---------------------------------------------------------------------------

pub struct StreamTransport {
    path: PathBuf,
    rx: mpsc::Receiver<TransportMessage>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamTransport {
    /// Start reading `path` on the current tokio runtime.
    pub fn open(path: impl Into<PathBuf>, options: TransportOptions) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let cancel = CancellationToken::new();

        let read_loop = ReadLoop {
            path: path.clone(),
            decoder: LineDecoder::new(options.max_line_bytes),
            options,
            tx,
            status: status_tx,
        };
        let task = tokio::spawn(read_loop.run(cancel.clone()));

        Self {
            path,
            rx,
            status,
            cancel,
            task: Some(task),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Next message in arrival order; `None` once closed.
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        if self.is_closed() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Stop the read loop. Idempotent; nothing is delivered afterwards.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// [`close`](Self::close), then wait until the loop has released the
    /// pipe handle.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.rx.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(path = %self.path.display(), error = %e, "fifo read loop panicked");
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

struct ReadLoop {
    path: PathBuf,
    options: TransportOptions,
    decoder: LineDecoder,
    tx: mpsc::Sender<TransportMessage>,
    status: watch::Sender<ConnectionStatus>,
}

/// How one open/read cycle ended.
enum Cycle {
    Missing,
    Eof,
    Failed(TransportError),
    /// The receiving side is gone.
    Abandoned,
}

impl ReadLoop {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let delay = tokio::select! {
                () = cancel.cancelled() => return,
                delay = self.step() => delay,
            };
            let Some(delay) = delay else {
                return;
            };
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One cycle plus its status transition. Returns the delay before the
    /// next cycle, or `None` to stop.
    async fn step(&mut self) -> Option<Duration> {
        match self.cycle().await {
            Cycle::Missing => {
                self.set_status(ConnectionStatus::Connecting);
                Some(self.options.retry_interval)
            }
            Cycle::Eof => {
                let dropped = self.decoder.finish();
                if dropped > 0 {
                    debug!(path = %self.path.display(), dropped, "discarded partial record at eof");
                }
                self.set_status(ConnectionStatus::Disconnected);
                Some(self.options.retry_interval)
            }
            Cycle::Failed(err) => {
                self.decoder.finish();
                warn!(path = %self.path.display(), error = %err, "fifo transport fault");
                self.set_status(ConnectionStatus::Error);
                self.tx.send(TransportMessage::Fault(err)).await.ok()?;
                Some(self.options.error_backoff)
            }
            Cycle::Abandoned => None,
        }
    }

    async fn cycle(&mut self) -> Cycle {
        let receiver = match self.open_receiver().await {
            Ok(Some(receiver)) => receiver,
            Ok(None) => return Cycle::Missing,
            Err(e) => return Cycle::Failed(e),
        };
        debug!(path = %self.path.display(), "fifo opened, waiting for writer");

        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            if let Err(e) = receiver.readable().await {
                return Cycle::Failed(self.read_error(e));
            }
            let n = match receiver.try_read(&mut buf) {
                Ok(0) => return Cycle::Eof,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Cycle::Failed(self.read_error(e)),
            };

            self.set_status(ConnectionStatus::Connected);
            for result in self.decoder.push(&buf[..n]) {
                match result {
                    Ok(event) => {
                        if self.tx.send(TransportMessage::Event(event)).await.is_err() {
                            return Cycle::Abandoned;
                        }
                    }
                    Err(e) => {
                        warn!(path = %self.path.display(), error = %e, "skipping malformed record");
                    }
                }
            }
        }
    }

    /// `Ok(None)` when the path does not exist yet.
    async fn open_receiver(&self) -> Result<Option<pipe::Receiver>, TransportError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TransportError::Open {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if !meta.file_type().is_fifo() {
            return Err(TransportError::NotAFifo {
                path: self.path.clone(),
            });
        }

        match pipe::OpenOptions::new().open_receiver(&self.path) {
            Ok(receiver) => Ok(Some(receiver)),
            // Removed between the metadata check and the open.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TransportError::Open {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn read_error(&self, source: io::Error) -> TransportError {
        TransportError::Read {
            path: self.path.clone(),
            source,
        }
    }

    fn set_status(&self, next: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(path = %self.path.display(), status = %next, "fifo connection status");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
