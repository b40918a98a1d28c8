//! Structured observability hooks for the sweep lifecycle.
//!
//! - a sweep-scoped span tagging every event with the sweep id
//! - emission functions for sweep start/finish, per-configuration
//!   start/finish, and degraded helper tools

use std::fmt;

use tracing::{info, warn, Span};

/// Step of a single configuration's iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Baseline,
    Build,
    Classify,
    Snapshot,
    Record,
    Cache,
    Backup,
}

impl SweepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepPhase::Baseline => "baseline",
            SweepPhase::Build => "build",
            SweepPhase::Classify => "classify",
            SweepPhase::Snapshot => "snapshot",
            SweepPhase::Record => "record",
            SweepPhase::Cache => "cache",
            SweepPhase::Backup => "backup",
        }
    }
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span tagging every event of one sweep with its id.
///
/// ```ignore
/// sweep.run_inner().instrument(sweep_span("7f9c...")).await
/// ```
pub fn sweep_span(sweep_id: &str) -> Span {
    tracing::info_span!("xbuilds.sweep", sweep_id = %sweep_id)
}

pub fn emit_sweep_started(source: &str, configs: usize, incremental: bool, cache: bool) {
    info!(
        event = "sweep.started",
        source = %source,
        configs = configs,
        incremental = incremental,
        cache = cache,
    );
}

pub fn emit_config_started(index: usize, total: usize, name: &str, digest: &str) {
    let short = digest.get(..12).unwrap_or(digest);
    info!(
        event = "config.started",
        config = %name,
        position = index + 1,
        total = total,
        digest = %short,
    );
}

pub fn emit_config_finished(name: &str, elapsed_seconds: f64, success: bool, binary: Option<u64>) {
    info!(
        event = "config.finished",
        config = %name,
        time_s = elapsed_seconds,
        success = success,
        binary = ?binary,
    );
}

/// A helper tool failed; the sweep continues without it.
pub fn emit_tool_degraded(phase: SweepPhase, config: &str, error: &dyn fmt::Display) {
    warn!(event = "tool.degraded", phase = %phase, config = %config, error = %error);
}

pub fn emit_sweep_finished(duration_ms: u64, total: usize, succeeded: usize) {
    info!(
        event = "sweep.finished",
        duration_ms = duration_ms,
        total = total,
        succeeded = succeeded,
        failed = total - succeeded,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_span_create() {
        let span = sweep_span("test-sweep-id");
        let _entered = span.enter();
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SweepPhase::Snapshot.to_string(), "snapshot");
        assert_eq!(SweepPhase::Backup.as_str(), "backup");
    }

    #[test]
    fn test_config_started_short_digest() {
        emit_config_started(0, 1, "tiny", "abc");
    }
}
