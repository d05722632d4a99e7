use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Event kind ───────────────────────────────────────────────────

/// Hook lifecycle kind carried in the `event` field of a record.
///
/// Kinds the reducer does not act on are preserved in [`HookEventKind::Other`]
/// so newer hook types pass through without failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HookEventKind {
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    Stop,
    SubagentStop,
    Other(String),
}

impl HookEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for HookEventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PreToolUse" => Self::PreToolUse,
            "PostToolUse" => Self::PostToolUse,
            "UserPromptSubmit" => Self::UserPromptSubmit,
            "Stop" => Self::Stop,
            "SubagentStop" => Self::SubagentStop,
            _ => Self::Other(s),
        }
    }
}

impl From<HookEventKind> for String {
    fn from(kind: HookEventKind) -> Self {
        match kind {
            HookEventKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for HookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Tool kind ────────────────────────────────────────────────────

/// Tools with side effects beyond the tool stream itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Sub-agent spawn.
    Task,
    /// Full to-do list snapshot.
    TodoWrite,
    /// File edits counted into the modified-files tally.
    Edit,
    Write,
    MultiEdit,
    Other,
}

impl ToolKind {
    pub fn classify(name: &str) -> Self {
        match name {
            "Task" => Self::Task,
            "TodoWrite" => Self::TodoWrite,
            "Edit" => Self::Edit,
            "Write" => Self::Write,
            "MultiEdit" => Self::MultiEdit,
            _ => Self::Other,
        }
    }
}

// ─── Event ────────────────────────────────────────────────────────

/// One decoded hook record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HudEvent {
    pub event: HookEventKind,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub session: Option<String>,
    /// Unix time in seconds, possibly fractional.
    #[serde(default)]
    pub ts: f64,
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl HudEvent {
    /// Bare event of the given kind; remaining fields empty.
    pub fn new(event: HookEventKind, ts: f64) -> Self {
        Self {
            event,
            tool: None,
            tool_use_id: None,
            input: None,
            response: None,
            session: None,
            ts,
            permission_mode: None,
            cwd: None,
            transcript_path: None,
            prompt: None,
        }
    }

    /// Tool name, treating an empty string as absent.
    pub fn tool_name(&self) -> Option<&str> {
        non_empty(self.tool.as_deref())
    }

    /// Invocation id, treating an empty string as absent.
    pub fn invocation_id(&self) -> Option<&str> {
        non_empty(self.tool_use_id.as_deref())
    }

    /// Input payload; JSON `null` counts as absent.
    pub fn input_payload(&self) -> Option<&serde_json::Value> {
        self.input.as_ref().filter(|v| !v.is_null())
    }

    /// Response payload; JSON `null` counts as absent.
    pub fn response_payload(&self) -> Option<&serde_json::Value> {
        self.response.as_ref().filter(|v| !v.is_null())
    }

    pub fn tool_kind(&self) -> Option<ToolKind> {
        self.tool_name().map(ToolKind::classify)
    }

    /// Event timestamp as a UTC instant. Out-of-range values fall back to
    /// the epoch.
    pub fn timestamp(&self) -> DateTime<Utc> {
        if !self.ts.is_finite() {
            return DateTime::UNIX_EPOCH;
        }
        #[expect(clippy::cast_possible_truncation)]
        let millis = (self.ts * 1000.0).round() as i64;
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Synthesized key used when a record carries no invocation id:
    /// `"{ts}-{suffix}"`.
    pub fn synthesized_id(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.ts)
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

// ─── Tool entry ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Complete,
    Error,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// One tool invocation in the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEntry {
    pub id: String,
    pub tool: String,
    /// Short human-readable target: file path, command or pattern prefix.
    pub target: String,
    pub status: ToolStatus,
    /// Raw event timestamp (unix seconds) of the last record for this entry.
    pub ts: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

// ─── Agent entry ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Complete,
}

/// One sub-agent spawned through the `Task` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub description: String,
    pub status: AgentStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ─── Todo ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

/// One item of the agent's to-do list, as emitted by `TodoWrite`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_form: Option<String>,
}

// ─── Modified files ───────────────────────────────────────────────

/// Lines added and removed in one file over the session.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

// ─── Session info ─────────────────────────────────────────────────

pub const DEFAULT_PERMISSION_MODE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub permission_mode: String,
    pub cwd: String,
    pub transcript_path: String,
    pub is_idle: bool,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            permission_mode: DEFAULT_PERMISSION_MODE.to_owned(),
            cwd: String::new(),
            transcript_path: String::new(),
            is_idle: true,
        }
    }
}

impl SessionInfo {
    pub fn with_transcript_path(path: Option<&str>) -> Self {
        Self {
            transcript_path: path.unwrap_or_default().to_owned(),
            ..Self::default()
        }
    }

    /// Merge-by-presence: non-empty event fields overwrite, everything else
    /// keeps its known value.
    pub fn merge_presence(&mut self, event: &HudEvent) {
        if let Some(mode) = non_empty(event.permission_mode.as_deref()) {
            mode.clone_into(&mut self.permission_mode);
        }
        if let Some(cwd) = non_empty(event.cwd.as_deref()) {
            cwd.clone_into(&mut self.cwd);
        }
        if let Some(path) = non_empty(event.transcript_path.as_deref()) {
            path.clone_into(&mut self.transcript_path);
        }
    }
}

// ─── Connection ───────────────────────────────────────────────────

/// Stream transport connection state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
