//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "claude-hud",
    version,
    about = "Live context-health dashboard for a Claude Code session"
)]
pub struct Cli {
    /// Session id of the initial session
    #[arg(long, env = "CLAUDE_HUD_SESSION", default_value = "unknown")]
    pub session: String,

    /// Named pipe the hooks write events into
    #[arg(long, env = "CLAUDE_HUD_FIFO")]
    pub fifo: PathBuf,

    /// Transcript file of the initial session
    #[arg(long)]
    pub transcript: Option<String>,

    /// Directory holding refresh.json (default: $HOME/.claude/hud)
    #[arg(long, env = "CLAUDE_HUD_DIR")]
    pub hud_dir: Option<PathBuf>,

    /// Redraw interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub refresh_interval_ms: u64,

    /// Transcript poll interval in milliseconds
    #[arg(long, default_value = "5000")]
    pub transcript_poll_ms: u64,

    /// refresh.json poll interval in milliseconds
    #[arg(long, default_value = "2000")]
    pub switch_poll_ms: u64,

    /// Print one JSON snapshot per line instead of the text dashboard
    #[arg(long)]
    pub json: bool,

    /// Color output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// `$HOME/.claude/hud`, or `./.claude/hud` without a home directory.
pub fn default_hud_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".claude").join("hud")
}
