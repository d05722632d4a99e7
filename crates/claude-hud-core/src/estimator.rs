//! Live context estimator.
//!
//! Counts tokens from the byte size of hook payloads as they stream in.
//! This is a deliberately cheap approximation (about four bytes per token),
//! not a tokenizer; the transcript reader periodically replaces its output
//! with the usage the API actually reported.

use chrono::{DateTime, Utc};

use crate::health::{
    ContextBreakdown, ContextHealth, DEFAULT_MAX_TOKENS, HealthSource, TokenHistory,
};
use crate::types::HudEvent;

/// Bytes per token assumed by [`estimate`].
pub const BYTES_PER_TOKEN: usize = 4;

/// Approximate token count of `text`: `ceil(bytes / 4)`, 0 when empty.
#[must_use]
pub fn estimate(text: &str) -> u64 {
    text.len().div_ceil(BYTES_PER_TOKEN) as u64
}

/// Approximate token count of a JSON payload in its compact serialized
/// form. Object keys serialize in sorted order, so the count does not
/// depend on how the record was produced.
#[must_use]
pub fn estimate_json(value: &serde_json::Value) -> u64 {
    serde_json::to_string(value)
        .map(|text| estimate(&text))
        .unwrap_or(0)
}

/// Running token estimate for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEstimator {
    total: u64,
    breakdown: ContextBreakdown,
    history: TokenHistory,
    session_start: DateTime<Utc>,
    last_update: DateTime<Utc>,
}

impl ContextEstimator {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            breakdown: ContextBreakdown::default(),
            history: TokenHistory::new(),
            session_start: now,
            last_update: now,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Account for the payloads of one event and record a history sample.
    pub fn process(&mut self, event: &HudEvent, now: DateTime<Utc>) {
        self.last_update = now;

        if let Some(input) = event.input_payload() {
            let tokens = estimate_json(input);
            self.breakdown.tool_inputs += tokens;
            self.total += tokens;
        }

        if let Some(response) = event.response_payload() {
            let tokens = estimate_json(response);
            self.breakdown.tool_outputs += tokens;
            self.total += tokens;
        }

        self.history.push(self.total, now);
    }

    /// Add message tokens reported through a channel other than tool
    /// payloads. Does not record a history sample.
    pub fn add_message_tokens(&mut self, tokens: u64, now: DateTime<Utc>) {
        self.breakdown.messages += tokens;
        self.total += tokens;
        self.last_update = now;
    }

    #[must_use]
    pub fn burn_rate(&self) -> i64 {
        self.history.burn_rate()
    }

    /// Current health against the default window. Calling this repeatedly
    /// without an intervening mutation yields identical values.
    #[must_use]
    pub fn health(&self) -> ContextHealth {
        let mut health = ContextHealth::measure(
            self.total,
            DEFAULT_MAX_TOKENS,
            HealthSource::Estimate,
            self.session_start,
        );
        health.burn_rate = self.burn_rate();
        health.breakdown = self.breakdown;
        health.last_update = self.last_update;
        health.token_history = self.history.totals();
        health
    }

    /// Zero all counters and history and restart the session clock.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }
}
