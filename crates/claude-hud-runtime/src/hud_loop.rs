//! Top-level dashboard loop: render ticks, session switches and shutdown.

use anyhow::Context as _;
use chrono::Utc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{MissedTickBehavior, interval};

use crate::cmd_json;
use crate::config::{OutputMode, PipelineOptions, RuntimeConfig};
use crate::pipeline::SessionPipeline;
use crate::switch::{SessionSwitchController, next_refresh_signal, refresh_signal};
use crate::view;

pub async fn run(config: RuntimeConfig) -> anyhow::Result<()> {
    let mut controller = SessionSwitchController::new(&config.hud_dir, &config.initial.session_id);
    let mut pipeline = SessionPipeline::start(&config.initial, &config.pipeline, Utc::now());

    let mut refresh = refresh_signal();
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;

    let mut render_tick = interval(config.refresh_interval);
    render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut switch_tick = interval(config.switch_poll);
    switch_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        session = %controller.active_session(),
        descriptor = %controller.descriptor_path().display(),
        "claude-hud started"
    );

    let result = loop {
        tokio::select! {
            _ = render_tick.tick() => {
                if let Err(e) = draw(&pipeline, config.output).await {
                    // Closed stdout: nothing left to draw to.
                    break Err(e);
                }
            }
            _ = switch_tick.tick() => {
                maybe_switch(&mut controller, &mut pipeline, &config.pipeline).await;
            }
            () = next_refresh_signal(&mut refresh) => {
                tracing::debug!("SIGUSR1 received, checking refresh descriptor");
                maybe_switch(&mut controller, &mut pipeline, &config.pipeline).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break Ok(());
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break Ok(());
            }
        }
    };

    pipeline.shutdown().await;
    result
}

async fn draw(pipeline: &SessionPipeline, output: OutputMode) -> anyhow::Result<()> {
    let snap = pipeline.snapshot(Utc::now()).await;
    match output {
        OutputMode::Text { use_color } => view::print_frame(&snap, use_color)?,
        OutputMode::Json => cmd_json::print_json_line(&snap)?,
    }
    Ok(())
}

/// Remount onto the descriptor's session when it differs from the active
/// one. The old pipeline is fully stopped before the new one starts.
async fn maybe_switch(
    controller: &mut SessionSwitchController,
    pipeline: &mut SessionPipeline,
    options: &PipelineOptions,
) -> bool {
    let Some(next) = controller.check() else {
        return false;
    };

    tracing::info!(
        from = %pipeline.session_id(),
        to = %next.session_id,
        fifo = %next.fifo_path.display(),
        "switching session"
    );

    pipeline.shutdown().await;
    *pipeline = SessionPipeline::start(&next, options, Utc::now());
    controller.activate(&next);
    true
}
