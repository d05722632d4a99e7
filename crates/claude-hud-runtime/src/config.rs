//! Runtime configuration resolved from the parsed CLI.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use claude_hud_source_fifo::TransportOptions;

use crate::cli::{Cli, ColorChoice, default_hud_dir};
use crate::descriptor::RefreshDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text { use_color: bool },
    Json,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub transport: TransportOptions,
    pub transcript_poll: Duration,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Session the dashboard starts on.
    pub initial: RefreshDescriptor,
    pub hud_dir: PathBuf,
    pub refresh_interval: Duration,
    pub switch_poll: Duration,
    pub pipeline: PipelineOptions,
    pub output: OutputMode,
}

impl RuntimeConfig {
    pub fn from_cli(cli: Cli) -> Self {
        let output = if cli.json {
            OutputMode::Json
        } else {
            OutputMode::Text {
                use_color: resolve_color(cli.color),
            }
        };

        Self {
            initial: RefreshDescriptor {
                session_id: cli.session,
                fifo_path: cli.fifo,
                transcript_path: cli.transcript.filter(|p| !p.is_empty()),
            },
            hud_dir: cli.hud_dir.unwrap_or_else(default_hud_dir),
            refresh_interval: interval_ms(cli.refresh_interval_ms),
            switch_poll: interval_ms(cli.switch_poll_ms),
            pipeline: PipelineOptions {
                transport: TransportOptions::default(),
                transcript_poll: interval_ms(cli.transcript_poll_ms),
            },
            output,
        }
    }
}

/// Zero would make `tokio::time::interval` panic; clamp to 1 ms.
fn interval_ms(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

pub fn resolve_color(color: ColorChoice) -> bool {
    match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal(),
    }
}
