//! Context-window health: the shared shape produced by both the live
//! estimator and the transcript reader.
//!
//! Status and the compact flag are pure functions of the fill percentage;
//! burn rate is derived from a bounded series of `(tokens, time)` samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Context window assumed when no model-specific size is known.
pub const DEFAULT_MAX_TOKENS: u64 = 200_000;

/// Fill percentage at which the status turns to warning.
pub const WARNING_PERCENT: f64 = 70.0;

/// Fill percentage at which the status turns critical and compaction is due.
pub const CRITICAL_PERCENT: f64 = 85.0;

/// Number of most recent samples considered for burn rate.
pub const BURN_RATE_WINDOW: usize = 10;

/// Burn rate is reported as 0 below this sample span.
pub const BURN_RATE_MIN_SPAN_MS: i64 = 6_000;

/// Sample history is trimmed once it grows past this size...
pub const SAMPLE_CAP: usize = 100;

/// ...down to this many of the most recent samples.
pub const SAMPLE_TRIM_TO: usize = 50;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
}

impl ContextStatus {
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        if percent >= CRITICAL_PERCENT {
            Self::Critical
        } else if percent >= WARNING_PERCENT {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Which component produced a [`ContextHealth`] value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthSource {
    #[default]
    Estimate,
    Transcript,
}

/// Token totals per bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBreakdown {
    pub tool_outputs: u64,
    pub tool_inputs: u64,
    pub messages: u64,
    pub other: u64,
}

impl ContextBreakdown {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.tool_outputs + self.tool_inputs + self.messages + self.other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSample {
    pub tokens: u64,
    pub at: DateTime<Utc>,
}

/// Bounded `(tokens, time)` series. Trims to the most recent
/// [`SAMPLE_TRIM_TO`] entries when it exceeds [`SAMPLE_CAP`], which keeps
/// enough recent samples for burn rate to stay continuous across a trim.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenHistory {
    samples: Vec<TokenSample>,
}

impl TokenHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tokens: u64, at: DateTime<Utc>) {
        self.samples.push(TokenSample { tokens, at });
        if self.samples.len() > SAMPLE_CAP {
            let excess = self.samples.len() - SAMPLE_TRIM_TO;
            self.samples.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&TokenSample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&TokenSample> {
        self.samples.last()
    }

    /// Token totals in insertion order, for sparkline rendering.
    pub fn totals(&self) -> Vec<u64> {
        self.samples.iter().map(|s| s.tokens).collect()
    }

    /// Tokens per minute over the last [`BURN_RATE_WINDOW`] samples.
    ///
    /// Returns 0 with fewer than two samples or when they span less than
    /// [`BURN_RATE_MIN_SPAN_MS`]; near-zero spans would otherwise divide
    /// into noise.
    #[must_use]
    pub fn burn_rate(&self) -> i64 {
        let start = self.samples.len().saturating_sub(BURN_RATE_WINDOW);
        let recent = &self.samples[start..];
        let (Some(first), Some(last)) = (recent.first(), recent.last()) else {
            return 0;
        };
        if recent.len() < 2 {
            return 0;
        }

        let span_ms = (last.at - first.at).num_milliseconds();
        if span_ms < BURN_RATE_MIN_SPAN_MS {
            return 0;
        }

        #[expect(clippy::cast_precision_loss)]
        let minutes = span_ms as f64 / 60_000.0;
        #[expect(clippy::cast_precision_loss)]
        let delta = last.tokens as f64 - first.tokens as f64;
        #[expect(clippy::cast_possible_truncation)]
        let rate = (delta / minutes).round() as i64;
        rate
    }
}

/// Point-in-time context window health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHealth {
    pub tokens: u64,
    /// Fill percentage, clamped to `0..=100`.
    pub percent: f64,
    pub remaining: u64,
    pub max_tokens: u64,
    /// Tokens per minute; negative when usage shrank (e.g. after compaction).
    pub burn_rate: i64,
    pub status: ContextStatus,
    pub should_compact: bool,
    pub breakdown: ContextBreakdown,
    pub session_start: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub token_history: Vec<u64>,
    pub source: HealthSource,
}

impl ContextHealth {
    /// Derive the threshold fields from `tokens` against `max_tokens`.
    /// Timeline fields start at `at`; breakdown, burn rate and history are
    /// left empty for the caller to fill.
    #[must_use]
    pub fn measure(tokens: u64, max_tokens: u64, source: HealthSource, at: DateTime<Utc>) -> Self {
        let percent = percent_of(tokens, max_tokens);
        Self {
            tokens,
            percent,
            remaining: max_tokens.saturating_sub(tokens),
            max_tokens,
            burn_rate: 0,
            status: ContextStatus::from_percent(percent),
            should_compact: should_compact(percent),
            breakdown: ContextBreakdown::default(),
            session_start: at,
            last_update: at,
            token_history: Vec::new(),
            source,
        }
    }

    /// Empty estimate: zero tokens against the default window.
    #[must_use]
    pub fn initial(at: DateTime<Utc>) -> Self {
        Self::measure(0, DEFAULT_MAX_TOKENS, HealthSource::Estimate, at)
    }

    /// Percentage rounded for display.
    #[must_use]
    pub fn percent_rounded(&self) -> u8 {
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = self.percent.round().clamp(0.0, 100.0) as u8;
        rounded
    }
}

#[must_use]
pub fn percent_of(tokens: u64, max_tokens: u64) -> f64 {
    if max_tokens == 0 {
        return 100.0;
    }
    #[expect(clippy::cast_precision_loss)]
    let raw = tokens as f64 / max_tokens as f64 * 100.0;
    raw.clamp(0.0, 100.0)
}

#[must_use]
pub fn should_compact(percent: f64) -> bool {
    percent >= CRITICAL_PERCENT
}
