//! claude-hud-source-transcript: authoritative token usage from the agent's
//! JSONL transcript.
//! The live estimator guesses from payload sizes; this crate reads the
//! usage the API actually reported and turns it into context health that
//! overrides the estimate whenever it is available.

pub mod line;
pub mod oracle;

pub use oracle::{FsStore, TranscriptError, TranscriptOracle, TranscriptStore, TranscriptUsage};
