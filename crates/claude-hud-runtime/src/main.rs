//! claude-hud: live context-health dashboard for a Claude Code session.
//! Reads hook events from the session FIFO, cross-checks context usage
//! against the transcript, and follows `/resume` and new sessions through
//! the refresh descriptor.

use clap::Parser;

mod cli;
mod cmd_json;
mod config;
mod descriptor;
mod hud_loop;
mod pipeline;
mod switch;
mod view;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // stdout belongs to the dashboard; logs go to stderr.
    let filter = std::env::var("CLAUDE_HUD_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = config::RuntimeConfig::from_cli(args);
    hud_loop::run(config).await
}
