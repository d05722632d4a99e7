//! claude-hud-core: session event aggregation and context-health engine.
//! Pure, deterministic state: hook event types, the live context estimator,
//! the cost estimator, and the session reducer that folds events into the
//! dashboard view model.

pub mod cost;
pub mod estimator;
pub mod health;
pub mod reducer;
pub mod types;
