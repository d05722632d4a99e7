//! `--json` output: one compact snapshot object per line.

use std::io::Write;

use crate::pipeline::HudSnapshot;

/// Serialize `snap` as a single JSON line onto `out`.
pub fn write_json_line(snap: &HudSnapshot, out: &mut impl Write) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, snap)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

pub fn print_json_line(snap: &HudSnapshot) -> anyhow::Result<()> {
    write_json_line(snap, &mut std::io::stdout().lock())
}
