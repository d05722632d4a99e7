//! Per-session pipeline: one FIFO transport, the reducer state and the
//! transcript oracle, wired together as tokio tasks.
//!
//! All mutation of [`SessionState`] happens under one mutex. The event
//! pump applies records strictly in arrival order; the oracle poll does its
//! file IO outside the lock and only takes it to swap in the result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use claude_hud_core::reducer::{SessionSnapshot, SessionState};
use claude_hud_core::types::ConnectionStatus;
use claude_hud_source_fifo::{StreamTransport, TransportMessage};
use claude_hud_source_transcript::TranscriptOracle;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineOptions;
use crate::descriptor::RefreshDescriptor;

/// State shared between the pipeline tasks.
#[derive(Debug)]
struct Shared {
    state: SessionState,
    connection: ConnectionStatus,
    last_fault: Option<String>,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HudSnapshot {
    pub session_id: String,
    pub connection: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fault: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub session: SessionSnapshot,
}

pub struct SessionPipeline {
    session_id: String,
    started_at: DateTime<Utc>,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionPipeline {
    /// Build fresh state for `target` and start its tasks on the current
    /// runtime.
    pub fn start(target: &RefreshDescriptor, options: &PipelineOptions, now: DateTime<Utc>) -> Self {
        info!(
            session = %target.session_id,
            fifo = %target.fifo_path.display(),
            transcript = target.transcript_path.as_deref().unwrap_or(""),
            "starting session pipeline"
        );

        let shared = Arc::new(Mutex::new(Shared {
            state: SessionState::new(target.transcript_path.as_deref(), now),
            connection: ConnectionStatus::Connecting,
            last_fault: None,
        }));
        let cancel = CancellationToken::new();

        let transport = StreamTransport::open(&target.fifo_path, options.transport.clone());
        let pump = tokio::spawn(run_event_pump(
            transport,
            Arc::clone(&shared),
            cancel.clone(),
        ));
        let oracle = tokio::spawn(run_oracle_poll(
            TranscriptOracle::new(),
            Arc::clone(&shared),
            options.transcript_poll,
            cancel.clone(),
        ));

        Self {
            session_id: target.session_id.clone(),
            started_at: now,
            shared,
            cancel,
            tasks: vec![pump, oracle],
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> HudSnapshot {
        let shared = self.shared.lock().await;
        HudSnapshot {
            session_id: self.session_id.clone(),
            connection: shared.connection,
            last_fault: shared.last_fault.clone(),
            started_at: self.started_at,
            elapsed_ms: u64::try_from((now - self.started_at).num_milliseconds()).unwrap_or(0),
            session: shared.state.snapshot(),
        }
    }

    /// Cancel all tasks and wait for them; the transport is closed by the
    /// pump on its way out. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(session = %self.session_id, error = %e, "pipeline task failed");
            }
        }
    }
}

impl Drop for SessionPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn run_event_pump(
    mut transport: StreamTransport,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
) {
    let mut status = transport.subscribe_status();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    // Read loop ended.
                    break;
                }
                let next = *status.borrow_and_update();
                shared.lock().await.connection = next;
            }
            msg = transport.recv() => match msg {
                Some(TransportMessage::Event(event)) => {
                    debug!(kind = %event.event, "hook event");
                    shared.lock().await.state.apply(&event, Utc::now());
                }
                Some(TransportMessage::Fault(fault)) => {
                    debug!(fifo = %transport.path().display(), "transport fault recorded");
                    let mut guard = shared.lock().await;
                    guard.connection = ConnectionStatus::Error;
                    guard.last_fault = Some(fault.to_string());
                }
                None => break,
            },
        }
    }

    transport.shutdown().await;
}

async fn run_oracle_poll(
    mut oracle: TranscriptOracle,
    shared: Arc<Mutex<Shared>>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_path = String::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let path = shared.lock().await.state.session().transcript_path.clone();
        if path.is_empty() {
            continue;
        }
        if path != last_path {
            // A different transcript: its samples must not mix with the old one's.
            oracle.invalidate();
            last_path.clone_from(&path);
        }

        let now = Utc::now();
        let read = tokio::task::spawn_blocking(move || {
            let health = oracle.context_health(&path, now);
            let model = oracle.model().map(str::to_owned);
            (oracle, health, model)
        })
        .await;

        let (returned, health, model) = match read {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "transcript read task failed");
                break;
            }
        };
        oracle = returned;

        if let Some(health) = health {
            debug!(tokens = health.tokens, percent = health.percent, "transcript health");
            shared
                .lock()
                .await
                .state
                .apply_transcript_health(health, model.as_deref());
        }
    }
}
