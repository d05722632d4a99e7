//! Rough session cost from estimated token counts.

use serde::{Deserialize, Serialize};

use crate::estimator::{estimate, estimate_json};
use crate::types::{HookEventKind, HudEvent};

/// Model family used to pick a price row.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    #[default]
    Sonnet,
    Opus,
    Haiku,
}

impl ModelFamily {
    /// Family by substring of the model name; unknown models price as sonnet.
    pub fn from_model(model: &str) -> Self {
        if model.contains("opus") {
            Self::Opus
        } else if model.contains("haiku") {
            Self::Haiku
        } else {
            Self::Sonnet
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
            Self::Haiku => "haiku",
        }
    }

    /// `(input, output)` USD per million tokens.
    pub fn pricing(self) -> (f64, f64) {
        match self {
            Self::Sonnet => (3.0, 15.0),
            Self::Opus => (15.0, 75.0),
            Self::Haiku => (0.25, 1.25),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Family the prices were taken from.
    pub model: ModelFamily,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CostTracker {
    input_tokens: u64,
    output_tokens: u64,
    family: ModelFamily,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_model(&mut self, model: &str) {
        self.family = ModelFamily::from_model(model);
    }

    /// Tool inputs and user prompts count as input; tool responses as output.
    pub fn process(&mut self, event: &HudEvent) {
        match event.event {
            HookEventKind::PostToolUse => {
                if let Some(input) = event.input_payload() {
                    self.input_tokens += estimate_json(input);
                }
                if let Some(response) = event.response_payload() {
                    self.output_tokens += estimate_json(response);
                }
            }
            HookEventKind::UserPromptSubmit => {
                if let Some(prompt) = event.prompt.as_deref() {
                    self.input_tokens += estimate(prompt);
                }
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn estimate(&self) -> CostEstimate {
        let (input_price, output_price) = self.family.pricing();
        #[expect(clippy::cast_precision_loss)]
        let input_cost = self.input_tokens as f64 / 1_000_000.0 * input_price;
        #[expect(clippy::cast_precision_loss)]
        let output_cost = self.output_tokens as f64 / 1_000_000.0 * output_price;

        CostEstimate {
            model: self.family,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}
