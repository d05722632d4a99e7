//! Transcript oracle: reported token usage, cached by file modification time.
//!
//! Each assistant line carries the usage of the whole conversation at that
//! turn, so the latest qualifying line wins; counts are overwritten, never
//! summed.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use claude_hud_core::health::{
    ContextBreakdown, ContextHealth, DEFAULT_MAX_TOKENS, HealthSource, TokenHistory,
};
use tracing::debug;

use crate::line::TranscriptLine;

/// Context window per model name fragment. The longest fragment contained
/// in the model name wins; no match means [`DEFAULT_MAX_TOKENS`].
const MODEL_CONTEXT_LIMITS: &[(&str, u64)] = &[
    ("claude-opus-4-5", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-haiku-3-5", 200_000),
];

/// Context window size for `model`.
pub fn context_limit(model: Option<&str>) -> u64 {
    let Some(model) = model else {
        return DEFAULT_MAX_TOKENS;
    };
    MODEL_CONTEXT_LIMITS
        .iter()
        .filter(|(key, _)| model.contains(key))
        .max_by_key(|(key, _)| key.len())
        .map_or(DEFAULT_MAX_TOKENS, |(_, limit)| *limit)
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Why a transcript could not be read. Logged, then collapsed to `None`.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("stat {} failed: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read {} failed: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} has no assistant usage records", .path.display())]
    NoUsage { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// File access used by the oracle.
pub trait TranscriptStore {
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// [`TranscriptStore`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl TranscriptStore for FsStore {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    /// Number of qualifying assistant lines.
    pub message_count: u64,
    /// Last model named by a qualifying line.
    pub model: Option<String>,
}

impl TranscriptUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }

    /// Fold transcript content. Malformed lines are skipped; `None` when no
    /// line qualifies.
    pub fn parse(content: &str) -> Option<Self> {
        let mut usage = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<TranscriptLine>(line) else {
                continue;
            };
            let Some((record, model)) = parsed.assistant_usage() else {
                continue;
            };

            usage.input_tokens = record.input_tokens.unwrap_or(0);
            usage.output_tokens = record.output_tokens.unwrap_or(0);
            usage.cache_creation_tokens = record.cache_creation_input_tokens.unwrap_or(0);
            usage.cache_read_tokens = record.cache_read_input_tokens.unwrap_or(0);
            usage.message_count += 1;
            if let Some(model) = model {
                usage.model = Some(model.to_owned());
            }
        }

        (usage.message_count > 0).then_some(usage)
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CacheEntry {
    path: PathBuf,
    modified: SystemTime,
    usage: Option<Arc<TranscriptUsage>>,
}

/// Reads transcript usage and derives context health from it.
///
/// Holds a single-entry cache keyed on `(path, mtime)` and its own token
/// history, so burn rate reflects reported usage rather than estimates.
#[derive(Debug)]
pub struct TranscriptOracle<S = FsStore> {
    store: S,
    cache: Option<CacheEntry>,
    history: TokenHistory,
}

impl TranscriptOracle<FsStore> {
    pub fn new() -> Self {
        Self::with_store(FsStore)
    }
}

impl Default for TranscriptOracle<FsStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TranscriptStore> TranscriptOracle<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            cache: None,
            history: TokenHistory::new(),
        }
    }

    /// Latest reported usage in `path`. An unchanged `(path, mtime)` returns
    /// the cached value without reading the file.
    pub fn read(&mut self, path: &str) -> Option<Arc<TranscriptUsage>> {
        if path.is_empty() {
            return None;
        }
        match self.load(Path::new(path)) {
            Ok(usage) => Some(usage),
            Err(e) => {
                debug!(path, error = %e, "transcript unavailable");
                None
            }
        }
    }

    fn load(&mut self, path: &Path) -> Result<Arc<TranscriptUsage>, TranscriptError> {
        let modified = self
            .store
            .modified(path)
            .map_err(|source| TranscriptError::Stat {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(entry) = &self.cache {
            if entry.path == path && entry.modified == modified {
                debug!(path = %path.display(), "transcript cache hit");
                return entry.usage.clone().ok_or_else(|| TranscriptError::NoUsage {
                    path: path.to_path_buf(),
                });
            }
        }

        debug!(path = %path.display(), "transcript cache miss");
        let content = self
            .store
            .read_to_string(path)
            .map_err(|source| TranscriptError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let usage = TranscriptUsage::parse(&content).map(Arc::new);

        self.cache = Some(CacheEntry {
            path: path.to_path_buf(),
            modified,
            usage: usage.clone(),
        });
        usage.ok_or_else(|| TranscriptError::NoUsage {
            path: path.to_path_buf(),
        })
    }

    /// Context health from the reported usage, or `None` when the
    /// transcript has nothing to offer.
    pub fn context_health(&mut self, path: &str, now: DateTime<Utc>) -> Option<ContextHealth> {
        let usage = self.read(path)?;
        let tokens = usage.total();

        if self.history.last().is_none_or(|s| s.tokens != tokens) {
            self.history.push(tokens, now);
        }
        let session_start = self.history.first().map_or(now, |s| s.at);

        let mut health = ContextHealth::measure(
            tokens,
            context_limit(usage.model.as_deref()),
            HealthSource::Transcript,
            session_start,
        );
        health.breakdown = ContextBreakdown {
            tool_outputs: usage.output_tokens,
            tool_inputs: usage.input_tokens,
            messages: usage.cache_creation_tokens + usage.cache_read_tokens,
            other: 0,
        };
        health.burn_rate = self.history.burn_rate();
        health.token_history = self.history.totals();
        health.last_update = now;
        Some(health)
    }

    /// Model named by the cached usage, if any.
    pub fn model(&self) -> Option<&str> {
        self.cache
            .as_ref()
            .and_then(|entry| entry.usage.as_deref())
            .and_then(|usage| usage.model.as_deref())
    }

    /// Forget the cached usage and the sample history.
    pub fn invalidate(&mut self) {
        self.cache = None;
        self.history.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use claude_hud_core::health::ContextStatus;
    use std::cell::{Cell, RefCell};
    use std::io::Write;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid datetime")
    }

    fn assistant(input: u64, output: u64, creation: u64, read: u64, model: Option<&str>) -> String {
        let mut message = serde_json::json!({
            "usage": {
                "input_tokens": input,
                "output_tokens": output,
                "cache_creation_input_tokens": creation,
                "cache_read_input_tokens": read,
            }
        });
        if let Some(model) = model {
            message["model"] = serde_json::json!(model);
        }
        serde_json::json!({"type": "assistant", "message": message}).to_string()
    }

    /// In-memory store that counts content reads.
    struct CountingStore {
        content: RefCell<String>,
        modified: Cell<SystemTime>,
        reads: Cell<usize>,
    }

    impl CountingStore {
        fn new(content: &str) -> Self {
            Self {
                content: RefCell::new(content.to_owned()),
                modified: Cell::new(SystemTime::UNIX_EPOCH),
                reads: Cell::new(0),
            }
        }

        fn rewrite(&self, content: &str, modified_secs: u64) {
            *self.content.borrow_mut() = content.to_owned();
            self.modified
                .set(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(modified_secs));
        }
    }

    impl TranscriptStore for &CountingStore {
        fn modified(&self, _path: &Path) -> io::Result<SystemTime> {
            Ok(self.modified.get())
        }

        fn read_to_string(&self, _path: &Path) -> io::Result<String> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.content.borrow().clone())
        }
    }

    #[test]
    fn context_limit_longest_match_wins() {
        assert_eq!(context_limit(None), DEFAULT_MAX_TOKENS);
        assert_eq!(context_limit(Some("claude-opus-4-5-20251101")), 200_000);
        assert_eq!(context_limit(Some("some-other-model")), DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn parse_overwrites_with_latest_line() {
        let content = [
            assistant(10, 20, 30, 40, Some("claude-sonnet-4")),
            r#"{"type":"user","message":{"content":"hi"}}"#.to_owned(),
            "{not json".to_owned(),
            String::new(),
            assistant(1, 2, 3, 4, None),
        ]
        .join("\n");

        let usage = TranscriptUsage::parse(&content).expect("has usage");
        assert_eq!(usage.input_tokens, 1);
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(usage.cache_creation_tokens, 3);
        assert_eq!(usage.cache_read_tokens, 4);
        assert_eq!(usage.total(), 10);
        assert_eq!(usage.message_count, 2);
        // Model sticks when a later line omits it.
        assert_eq!(usage.model.as_deref(), Some("claude-sonnet-4"));
    }

    #[test]
    fn parse_without_assistant_usage_is_none() {
        assert!(TranscriptUsage::parse("").is_none());
        assert!(TranscriptUsage::parse(r#"{"type":"user"}"#).is_none());
    }

    #[test]
    fn empty_or_missing_path_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut oracle = TranscriptOracle::new();
        assert!(oracle.read("").is_none());
        let missing = dir.path().join("nope.jsonl");
        assert!(oracle.read(&missing.display().to_string()).is_none());
    }

    #[test]
    fn reads_real_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.jsonl");
        let mut f = std::fs::File::create(&path).expect("create");
        writeln!(f, "{}", assistant(100, 200, 300, 400, Some("claude-opus-4-5"))).expect("write");
        drop(f);

        let mut oracle = TranscriptOracle::new();
        let usage = oracle.read(&path.display().to_string()).expect("usage");
        assert_eq!(usage.total(), 1_000);
        assert_eq!(oracle.model(), Some("claude-opus-4-5"));
    }

    #[test]
    fn unchanged_mtime_skips_reread() {
        let store = CountingStore::new(&assistant(1, 1, 1, 1, None));
        let mut oracle = TranscriptOracle::with_store(&store);

        let first = oracle.read("/t.jsonl").expect("usage");
        let second = oracle.read("/t.jsonl").expect("usage");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.reads.get(), 1);

        store.rewrite(&assistant(5, 5, 5, 5, None), 60);
        let third = oracle.read("/t.jsonl").expect("usage");
        assert_eq!(third.total(), 20);
        assert_eq!(store.reads.get(), 2);
    }

    #[test]
    fn path_change_rereads() {
        let store = CountingStore::new(&assistant(1, 1, 1, 1, None));
        let mut oracle = TranscriptOracle::with_store(&store);
        oracle.read("/a.jsonl");
        oracle.read("/b.jsonl");
        assert_eq!(store.reads.get(), 2);
    }

    #[test]
    fn usage_free_transcript_is_cached_too() {
        let store = CountingStore::new(r#"{"type":"user"}"#);
        let mut oracle = TranscriptOracle::with_store(&store);
        assert!(oracle.read("/t.jsonl").is_none());
        assert!(oracle.read("/t.jsonl").is_none());
        assert_eq!(store.reads.get(), 1);
    }

    #[test]
    fn context_health_maps_breakdown() {
        let store = CountingStore::new(&assistant(1_000, 2_000, 50_000, 127_000, None));
        let mut oracle = TranscriptOracle::with_store(&store);

        let health = oracle.context_health("/t.jsonl", t0()).expect("health");
        assert_eq!(health.tokens, 180_000);
        assert_eq!(health.max_tokens, 200_000);
        assert!((health.percent - 90.0).abs() < 1e-9);
        assert_eq!(health.remaining, 20_000);
        assert_eq!(health.status, ContextStatus::Critical);
        assert!(health.should_compact);
        assert_eq!(health.source, HealthSource::Transcript);
        assert_eq!(health.breakdown.tool_outputs, 2_000);
        assert_eq!(health.breakdown.tool_inputs, 1_000);
        assert_eq!(health.breakdown.messages, 177_000);
        assert_eq!(health.breakdown.other, 0);
        assert_eq!(health.token_history, vec![180_000]);
        assert_eq!(health.burn_rate, 0);
    }

    #[test]
    fn context_health_tracks_burn_rate_across_changes() {
        let store = CountingStore::new(&assistant(0, 0, 0, 10_000, None));
        let mut oracle = TranscriptOracle::with_store(&store);
        oracle.context_health("/t.jsonl", t0());

        // Same total again: no new sample.
        oracle.context_health("/t.jsonl", t0() + Duration::seconds(5));

        store.rewrite(&assistant(0, 0, 0, 16_000, None), 1);
        let health = oracle
            .context_health("/t.jsonl", t0() + Duration::minutes(1))
            .expect("health");
        assert_eq!(health.token_history, vec![10_000, 16_000]);
        assert_eq!(health.burn_rate, 6_000);
        assert_eq!(health.session_start, t0());
        assert_eq!(health.last_update, t0() + Duration::minutes(1));
    }

    #[test]
    fn invalidate_forces_reread_and_clears_history() {
        let store = CountingStore::new(&assistant(1, 1, 1, 1, None));
        let mut oracle = TranscriptOracle::with_store(&store);
        oracle.context_health("/t.jsonl", t0());

        oracle.invalidate();
        let health = oracle
            .context_health("/t.jsonl", t0() + Duration::minutes(3))
            .expect("health");
        assert_eq!(store.reads.get(), 2);
        assert_eq!(health.token_history, vec![4]);
        assert_eq!(health.session_start, t0() + Duration::minutes(3));
    }
}
