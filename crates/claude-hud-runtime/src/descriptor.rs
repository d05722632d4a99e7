//! Refresh descriptor: `<hud_dir>/refresh.json`, written by the session
//! start hook to point the dashboard at a new session.
//!
//! ```json
//! {"sessionId": "...", "fifoPath": "...", "transcriptPath": "..."}
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DESCRIPTOR_FILE: &str = "refresh.json";

/// Endpoint set of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshDescriptor {
    pub session_id: String,
    pub fifo_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
}

/// Wire shape with every field optional, validated into [`RefreshDescriptor`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    fifo_path: Option<String>,
    #[serde(default)]
    transcript_path: Option<String>,
}

pub fn descriptor_path(hud_dir: &Path) -> PathBuf {
    hud_dir.join(DESCRIPTOR_FILE)
}

/// Parse descriptor JSON. `None` unless both `sessionId` and `fifoPath`
/// are present and non-empty.
pub fn parse_descriptor(raw: &str) -> Option<RefreshDescriptor> {
    let raw: RawDescriptor = serde_json::from_str(raw).ok()?;
    let session_id = raw.session_id.filter(|s| !s.is_empty())?;
    let fifo_path = raw.fifo_path.filter(|s| !s.is_empty())?;
    Some(RefreshDescriptor {
        session_id,
        fifo_path: PathBuf::from(fifo_path),
        transcript_path: raw.transcript_path.filter(|s| !s.is_empty()),
    })
}

/// Read and parse the descriptor at `path`; any failure reads as `None`.
pub fn read_descriptor(path: &Path) -> Option<RefreshDescriptor> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let parsed = parse_descriptor(&raw);
            if parsed.is_none() {
                tracing::debug!(path = %path.display(), "ignoring invalid refresh descriptor");
            }
            parsed
        }
        Err(_) => None,
    }
}
