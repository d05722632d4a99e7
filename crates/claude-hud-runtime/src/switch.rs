//! Session switch detection.
//!
//! The controller only decides *whether* to switch; tearing down and
//! rebuilding the pipeline is done by the HUD loop.

use std::path::{Path, PathBuf};

use tokio::signal::unix::{Signal, SignalKind, signal};

use crate::descriptor::{RefreshDescriptor, descriptor_path, read_descriptor};

pub struct SessionSwitchController {
    descriptor_path: PathBuf,
    active_session: String,
}

impl SessionSwitchController {
    pub fn new(hud_dir: &Path, active_session: impl Into<String>) -> Self {
        Self {
            descriptor_path: descriptor_path(hud_dir),
            active_session: active_session.into(),
        }
    }

    pub fn active_session(&self) -> &str {
        &self.active_session
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// The descriptor when it names a session other than the active one.
    pub fn check(&self) -> Option<RefreshDescriptor> {
        read_descriptor(&self.descriptor_path)
            .filter(|descriptor| descriptor.session_id != self.active_session)
    }

    /// Record `descriptor` as the active session.
    pub fn activate(&mut self, descriptor: &RefreshDescriptor) {
        descriptor.session_id.clone_into(&mut self.active_session);
    }
}

/// `SIGUSR1` stream, or `None` when the handler cannot be installed; the
/// poll fallback still covers switches in that case.
pub fn refresh_signal() -> Option<Signal> {
    match signal(SignalKind::user_defined1()) {
        Ok(sig) => Some(sig),
        Err(e) => {
            tracing::warn!(error = %e, "SIGUSR1 unavailable, relying on refresh polling");
            None
        }
    }
}

/// Resolves on the next delivery; pending forever without a handler.
pub async fn next_refresh_signal(sig: &mut Option<Signal>) {
    match sig {
        Some(sig) => {
            if sig.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) {
        std::fs::write(descriptor_path(dir), body).expect("write descriptor");
    }

    #[test]
    fn missing_descriptor_is_no_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = SessionSwitchController::new(dir.path(), "s-1");
        assert!(controller.check().is_none());
    }

    #[test]
    fn same_session_is_no_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), r#"{"sessionId":"s-1","fifoPath":"/tmp/s-1.fifo"}"#);
        let controller = SessionSwitchController::new(dir.path(), "s-1");
        assert!(controller.check().is_none());
    }

    #[test]
    fn new_session_is_a_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            r#"{"sessionId":"s-2","fifoPath":"/tmp/s-2.fifo","transcriptPath":"/t.jsonl"}"#,
        );
        let mut controller = SessionSwitchController::new(dir.path(), "s-1");

        let change = controller.check().expect("switch");
        assert_eq!(change.session_id, "s-2");
        assert_eq!(change.fifo_path, PathBuf::from("/tmp/s-2.fifo"));

        controller.activate(&change);
        assert_eq!(controller.active_session(), "s-2");
        assert!(controller.check().is_none(), "settled after activation");
    }

    #[test]
    fn malformed_descriptor_is_no_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "{ not json");
        let controller = SessionSwitchController::new(dir.path(), "s-1");
        assert!(controller.check().is_none());

        write(dir.path(), r#"{"sessionId":"s-2"}"#);
        assert!(controller.check().is_none());
    }

    #[tokio::test]
    async fn refresh_signal_is_delivered() {
        let mut sig = refresh_signal();
        assert!(sig.is_some());

        let status = std::process::Command::new("kill")
            .args(["-USR1", &std::process::id().to_string()])
            .status()
            .expect("run kill");
        assert!(status.success());

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            next_refresh_signal(&mut sig),
        )
        .await
        .expect("SIGUSR1 delivered");
    }
}
