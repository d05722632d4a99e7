//! Plain-text dashboard rendering.

use std::fmt::Write as _;
use std::io::Write as _;

use claude_hud_core::health::{ContextHealth, ContextStatus, HealthSource};
use claude_hud_core::types::{
    AgentStatus, ConnectionStatus, DEFAULT_PERMISSION_MODE, TodoStatus, ToolStatus,
};

use crate::pipeline::HudSnapshot;

const BAR_WIDTH: usize = 20;
const SPARKLINE_WIDTH: usize = 20;
const SPARK_BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const RECENT_TOOLS: usize = 8;
const TARGET_WIDTH: usize = 28;
/// Burn rate above which the rate is highlighted.
const HIGH_BURN_RATE: i64 = 5_000;

// ANSI
const BOLD: &str = "1";
const DIM: &str = "2";
const RED: &str = "31";
const GREEN: &str = "32";
const YELLOW: &str = "33";
const CYAN: &str = "36";

fn paint(text: &str, code: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// `1.2M`, `12k`, or the plain number.
pub fn format_number(n: u64) -> String {
    #[expect(clippy::cast_precision_loss)]
    let f = n as f64;
    if n >= 1_000_000 {
        format!("{:.1}M", f / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.0}k", f / 1_000.0)
    } else {
        n.to_string()
    }
}

/// `42s`, `3m 5s`, `2h 14m`. The unit is picked from the raw value, so
/// 59.7 s reads `60s`; longer spans truncate to whole seconds.
pub fn format_duration(ms: u64) -> String {
    if ms < 60_000 {
        return format!("{}s", (ms + 500) / 1_000);
    }
    let secs = ms / 1_000;
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins}m {}s", secs % 60);
    }
    format!("{}h {}m", mins / 60, mins % 60)
}

fn format_burn_rate(rate: i64) -> String {
    match rate {
        0 => "--".to_owned(),
        r if r < 0 => format!("-{}/min", format_number(r.unsigned_abs())),
        r => format!("{}/min", format_number(r.unsigned_abs())),
    }
}

fn format_tool_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        #[expect(clippy::cast_precision_loss)]
        let secs = ms as f64 / 1_000.0;
        format!("{secs:.1}s")
    } else {
        format_duration(ms)
    }
}

/// Char-safe truncation with a trailing ellipsis.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}\u{2026}")
}

/// Collapse `$HOME` to `~`.
fn short_path(path: &str) -> String {
    let home = std::env::var("HOME").unwrap_or_default();
    match path.strip_prefix(home.as_str()) {
        Some(rest) if !home.is_empty() => format!("~{rest}"),
        _ => path.to_owned(),
    }
}

/// Last `width` values as 8-level blocks scaled to their own min/max,
/// left-padded with `─`.
pub fn sparkline(data: &[u64], width: usize) -> String {
    let samples = &data[data.len().saturating_sub(width)..];
    let (Some(min), Some(max)) = (samples.iter().min(), samples.iter().max()) else {
        return "─".repeat(width);
    };
    let range = max - min;

    let mut out = "─".repeat(width - samples.len());
    for value in samples {
        let index = if range == 0 {
            0
        } else {
            #[expect(clippy::cast_precision_loss)]
            let normalized = (value - min) as f64 / range as f64;
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let index = (normalized * SPARK_BLOCKS.len() as f64).floor() as usize;
            index.min(SPARK_BLOCKS.len() - 1)
        };
        out.push(SPARK_BLOCKS[index]);
    }
    out
}

fn meter(percent: f64) -> (String, String) {
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64) as usize;
    ("█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn connection_icon(status: ConnectionStatus) -> (&'static str, &'static str) {
    match status {
        ConnectionStatus::Connecting => ("◐", YELLOW),
        ConnectionStatus::Connected => ("●", GREEN),
        ConnectionStatus::Disconnected => ("○", DIM),
        ConnectionStatus::Error => ("✗", RED),
    }
}

fn status_color(status: ContextStatus) -> &'static str {
    match status {
        ContextStatus::Healthy => GREEN,
        ContextStatus::Warning => YELLOW,
        ContextStatus::Critical => RED,
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// Full dashboard frame.
pub fn render(snap: &HudSnapshot, use_color: bool) -> String {
    let mut out = String::new();
    let c = use_color;
    let info = &snap.session.session;

    // Header
    let mode = if info.permission_mode == DEFAULT_PERMISSION_MODE {
        String::new()
    } else {
        format!(" [{}]", info.permission_mode)
    };
    let (icon, icon_color) = connection_icon(snap.connection);
    let _ = writeln!(
        out,
        "{} {} {}",
        paint("Claude HUD", "1;36", c),
        paint(&format!("({}){mode}", format_duration(snap.elapsed_ms)), DIM, c),
        paint(icon, icon_color, c),
    );

    match snap.connection {
        ConnectionStatus::Connecting => {
            let _ = writeln!(out, "{}", paint("Connecting to session...", YELLOW, c));
        }
        ConnectionStatus::Disconnected => {
            let _ = writeln!(
                out,
                "{}",
                paint("Waiting for session... (run claude or /resume)", DIM, c)
            );
        }
        ConnectionStatus::Error => {
            let fault = snap.last_fault.as_deref().unwrap_or("transport error");
            let _ = writeln!(out, "{}", paint(fault, RED, c));
        }
        ConnectionStatus::Connected => {}
    }
    out.push('\n');

    // Activity
    let activity = if info.is_idle {
        paint("○ Idle", DIM, c)
    } else {
        paint("● Working", GREEN, c)
    };
    if info.cwd.is_empty() {
        let _ = writeln!(out, "{activity}");
    } else {
        let _ = writeln!(out, "{activity}  {}", paint(&short_path(&info.cwd), DIM, c));
    }
    out.push('\n');

    render_context(&mut out, &snap.session.context, c);
    render_tools(&mut out, snap, c);
    render_agents(&mut out, snap, c);
    render_todos(&mut out, snap, c);
    render_edits(&mut out, snap, c);

    let cost = &snap.session.cost;
    let _ = writeln!(
        out,
        "{} ${:.2} {}",
        paint("Cost", BOLD, c),
        cost.total_cost,
        paint(
            &format!(
                "({} · in {} • out {})",
                cost.model.as_str(),
                format_number(cost.input_tokens),
                format_number(cost.output_tokens)
            ),
            DIM,
            c
        ),
    );

    out
}

fn render_context(out: &mut String, ctx: &ContextHealth, c: bool) {
    let color = status_color(ctx.status);
    let compact = if ctx.should_compact {
        format!(" {}", paint("⚠ COMPACT", "1;31", c))
    } else {
        String::new()
    };
    let source = match ctx.source {
        HealthSource::Estimate => "est.",
        HealthSource::Transcript => "transcript",
    };
    let _ = writeln!(out, "{}{compact} {}", paint("Context", BOLD, c), paint(source, DIM, c));

    let (filled, empty) = meter(ctx.percent);
    let _ = writeln!(
        out,
        "{}{} {}",
        paint(&filled, color, c),
        paint(&empty, DIM, c),
        paint(&format!("{}%", ctx.percent_rounded()), color, c),
    );
    let _ = writeln!(
        out,
        "{}",
        paint(
            &format!(
                "{} used • {} left",
                format_number(ctx.tokens),
                format_number(ctx.remaining)
            ),
            DIM,
            c
        ),
    );

    let burn = format_burn_rate(ctx.burn_rate);
    let burn = if ctx.burn_rate > HIGH_BURN_RATE {
        paint(&burn, YELLOW, c)
    } else {
        burn
    };
    let b = &ctx.breakdown;
    let counted = b.tool_outputs + b.tool_inputs + b.messages;
    let split = if counted > 0 {
        let pct = |part: u64| {
            #[expect(clippy::cast_precision_loss)]
            let p = (part as f64 / counted as f64 * 100.0).round();
            p
        };
        paint(
            &format!(" • Out:{}% In:{}%", pct(b.tool_outputs), pct(b.tool_inputs)),
            DIM,
            c,
        )
    } else {
        String::new()
    };
    let _ = writeln!(out, "{} {burn}{split}", paint("Burn:", DIM, c));
    let _ = writeln!(
        out,
        "{}",
        paint(&sparkline(&ctx.token_history, SPARKLINE_WIDTH), CYAN, c)
    );
    out.push('\n');
}

fn render_tools(out: &mut String, snap: &HudSnapshot, c: bool) {
    let tools = &snap.session.tools;
    if tools.is_empty() {
        return;
    }
    let running = if snap.session.running_tools > 0 {
        format!(" ({} running)", snap.session.running_tools)
    } else {
        String::new()
    };
    let _ = writeln!(out, "{}{}", paint("Tools", BOLD, c), paint(&running, DIM, c));

    for tool in tools.iter().skip(tools.len().saturating_sub(RECENT_TOOLS)) {
        let glyph = match tool.status {
            ToolStatus::Running => paint("◐", YELLOW, c),
            ToolStatus::Complete => paint("✓", GREEN, c),
            ToolStatus::Error => paint("✗", RED, c),
        };
        let duration = tool
            .duration_ms
            .map(|ms| format!(" {}", format_tool_duration(ms)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            " {glyph} {:<10} {}{}",
            truncate(&tool.tool, 10),
            paint(&truncate(&tool.target, TARGET_WIDTH), DIM, c),
            paint(&duration, DIM, c),
        );
    }

    if !snap.session.top_tools.is_empty() {
        let top: Vec<String> = snap
            .session
            .top_tools
            .iter()
            .map(|(name, count)| format!("{} {}", paint(&count.to_string(), CYAN, c), truncate(name, 6)))
            .collect();
        let _ = writeln!(out, "{}", top.join(" · "));
    }
    out.push('\n');
}

fn render_agents(out: &mut String, snap: &HudSnapshot, c: bool) {
    let agents = &snap.session.agents;
    if agents.is_empty() {
        return;
    }
    let _ = writeln!(
        out,
        "{} {}",
        paint("Agents", BOLD, c),
        paint(&format!("({}/{} done)", snap.session.completed_agents, agents.len()), DIM, c),
    );
    for agent in agents {
        let glyph = match agent.status {
            AgentStatus::Running => paint("◐", YELLOW, c),
            AgentStatus::Complete => paint("✓", GREEN, c),
        };
        let elapsed = agent
            .ended_at
            .map(|end| {
                let ms = u64::try_from((end - agent.started_at).num_milliseconds()).unwrap_or(0);
                format!(" ({})", format_duration(ms))
            })
            .unwrap_or_default();
        let _ = writeln!(
            out,
            " {glyph} {} {}{}",
            paint(&agent.agent_type, CYAN, c),
            truncate(&agent.description, TARGET_WIDTH),
            paint(&elapsed, DIM, c),
        );
    }
    out.push('\n');
}

fn render_todos(out: &mut String, snap: &HudSnapshot, c: bool) {
    let todos = &snap.session.todos;
    if todos.is_empty() {
        return;
    }
    let done = todos
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count();
    let _ = writeln!(
        out,
        "{} {}",
        paint("Todos", BOLD, c),
        paint(&format!("({done}/{})", todos.len()), DIM, c),
    );
    for todo in todos {
        let line = match todo.status {
            TodoStatus::Completed => format!(" {} {}", paint("✓", GREEN, c), paint(&todo.content, DIM, c)),
            TodoStatus::InProgress => {
                let label = todo.active_form.as_deref().unwrap_or(&todo.content);
                format!(" {} {}", paint("▸", YELLOW, c), label)
            }
            TodoStatus::Pending | TodoStatus::Unknown => format!(" ○ {}", todo.content),
        };
        let _ = writeln!(out, "{line}");
    }
    out.push('\n');
}

fn render_edits(out: &mut String, snap: &HudSnapshot, c: bool) {
    let files = &snap.session.modified_files;
    if files.is_empty() {
        return;
    }
    let additions: u64 = files.iter().map(|f| f.additions).sum();
    let deletions: u64 = files.iter().map(|f| f.deletions).sum();
    let noun = if files.len() == 1 { "file" } else { "files" };
    let _ = writeln!(
        out,
        "{} {} {} {}",
        paint("Edits", BOLD, c),
        paint(&format!("+{additions}"), GREEN, c),
        paint(&format!("-{deletions}"), RED, c),
        paint(&format!("in {} {noun}", files.len()), DIM, c),
    );
    out.push('\n');
}

/// Clear the screen and draw one frame on stdout.
pub fn print_frame(snap: &HudSnapshot, use_color: bool) -> std::io::Result<()> {
    let frame = render(snap, use_color);
    let mut stdout = std::io::stdout().lock();
    // Clear screen + cursor home
    write!(stdout, "\x1b[2J\x1b[H{frame}")?;
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use claude_hud_core::reducer::SessionState;
    use claude_hud_core::types::{HookEventKind, HudEvent};

    fn snapshot_with(events: &[HudEvent], connection: ConnectionStatus) -> HudSnapshot {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid datetime");
        let mut state = SessionState::new(None, t0);
        for ev in events {
            state.apply(ev, t0 + Duration::seconds(1));
        }
        HudSnapshot {
            session_id: "s".to_owned(),
            connection,
            last_fault: None,
            started_at: t0,
            elapsed_ms: 65_000,
            session: state.snapshot(),
        }
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(12_345), "12k");
        assert_eq!(format_number(1_250_000), "1.3M");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(4_400), "4s");
        assert_eq!(format_duration(65_000), "1m 5s");
        assert_eq!(format_duration(59_700), "60s");
        assert_eq!(format_duration(60_000), "1m 0s");
        assert_eq!(format_duration(119_700), "1m 59s");
        assert_eq!(format_duration(2 * 3_600_000 + 14 * 60_000), "2h 14m");
    }

    #[test]
    fn burn_rate_formatting() {
        assert_eq!(format_burn_rate(0), "--");
        assert_eq!(format_burn_rate(2_400), "2k/min");
        assert_eq!(format_burn_rate(-3_000), "-3k/min");
    }

    #[test]
    fn sparkline_pads_and_scales() {
        assert_eq!(sparkline(&[], 5), "─────");
        assert_eq!(sparkline(&[7, 7], 4), "──▁▁");
        assert_eq!(sparkline(&[0, 100], 2), "▁█");
        // Only the most recent `width` samples are drawn.
        assert_eq!(sparkline(&[0, 0, 0, 10], 2).chars().count(), 2);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }

    #[test]
    fn render_plain_has_no_escape_codes() {
        let snap = snapshot_with(&[], ConnectionStatus::Connecting);
        let frame = render(&snap, false);
        assert!(!frame.contains('\x1b'));
        assert!(frame.starts_with("Claude HUD (1m 5s) ◐"));
        assert!(frame.contains("Connecting to session..."));
        assert!(frame.contains("0 used • 200k left"));
        assert!(frame.contains("Burn: --"));
    }

    #[test]
    fn render_shows_tools_agents_todos() {
        let mut pre = HudEvent::new(HookEventKind::PreToolUse, 1.0);
        pre.tool = Some("Task".to_owned());
        pre.tool_use_id = Some("tu-1".to_owned());
        pre.permission_mode = Some("plan".to_owned());
        pre.input = Some(serde_json::json!({"subagent_type": "Explore", "description": "map crate"}));

        let mut todo = HudEvent::new(HookEventKind::PreToolUse, 2.0);
        todo.tool = Some("TodoWrite".to_owned());
        todo.tool_use_id = Some("tu-2".to_owned());
        todo.input = Some(serde_json::json!({"todos": [
            {"content": "write view", "status": "in_progress", "activeForm": "Writing view"},
            {"content": "ship", "status": "pending"},
        ]}));

        let snap = snapshot_with(&[pre, todo], ConnectionStatus::Connected);
        let frame = render(&snap, false);

        assert!(frame.contains("[plan]"));
        assert!(frame.contains("● Working"));
        assert!(frame.contains("Tools (2 running)"));
        assert!(frame.contains("Agents (0/1 done)"));
        assert!(frame.contains("Explore map crate"));
        assert!(frame.contains("Todos (0/2)"));
        assert!(frame.contains("▸ Writing view"));
        assert!(frame.contains("○ ship"));
    }

    #[test]
    fn render_flags_compaction() {
        let mut snap = snapshot_with(&[], ConnectionStatus::Connected);
        snap.session.context = ContextHealth::measure(
            190_000,
            200_000,
            HealthSource::Transcript,
            snap.started_at,
        );
        let frame = render(&snap, false);
        assert!(frame.contains("⚠ COMPACT"));
        assert!(frame.contains("95%"));
        assert!(frame.contains("████████████████████") || frame.contains("███████████████████░"));
    }

    #[test]
    fn render_totals_edits_across_files() {
        let edit = |id: &str, path: &str| {
            let mut ev = HudEvent::new(HookEventKind::PostToolUse, 1.0);
            ev.tool = Some("Edit".to_owned());
            ev.tool_use_id = Some(id.to_owned());
            ev.input = Some(serde_json::json!({
                "file_path": path, "old_string": "a", "new_string": "b\nc",
            }));
            ev.response = Some(serde_json::json!({"success": true}));
            ev
        };
        let snap = snapshot_with(
            &[edit("tu-1", "/a.rs"), edit("tu-2", "/b.rs"), edit("tu-3", "/a.rs")],
            ConnectionStatus::Connected,
        );
        let frame = render(&snap, false);
        assert!(frame.contains("Edits +6 -3 in 2 files"), "{frame}");
        assert!(frame.contains("Cost $0.00 (sonnet · in"));

        let empty = render(&snapshot_with(&[], ConnectionStatus::Connected), false);
        assert!(!empty.contains("Edits"));
    }

    #[test]
    fn render_color_wraps_in_ansi() {
        let snap = snapshot_with(&[], ConnectionStatus::Error);
        let frame = render(&snap, true);
        assert!(frame.contains("\x1b[31m✗\x1b[0m"));
    }
}
