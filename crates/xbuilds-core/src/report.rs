//! Sweep report and the optional JSON summary artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::error::Result;
use crate::results::BuildOutcome;

pub const SUMMARY_SCHEMA_VERSION: &str = "1";

/// What a finished sweep hands back to its caller.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub sweep_id: String,
    /// One outcome per configuration, in sweep order.
    pub outcomes: Vec<BuildOutcome>,
    pub duration_ms: u64,
    pub results_path: PathBuf,
}

impl SweepReport {
    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.succeeded_count()
    }
}

/// One configuration's entry in the JSON summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeArtifact {
    pub config: String,
    pub config_digest: String,
    pub time_s: f64,
    pub success: bool,
    pub binary: Option<u64>,
}

/// Machine-readable counterpart of the result table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepSummaryArtifact {
    pub schema_version: String,
    pub sweep_id: String,
    pub generated_at: DateTime<Utc>,
    pub source_dir: String,
    pub incremental: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<OutcomeArtifact>,
}

impl SweepSummaryArtifact {
    /// Pair outcomes with their configurations by name.
    pub fn new(
        report: &SweepReport,
        configs: &[Configuration],
        source_dir: &Path,
        incremental: bool,
    ) -> Self {
        let outcomes = report
            .outcomes
            .iter()
            .map(|o| OutcomeArtifact {
                config: o.config_name().to_string(),
                config_digest: configs
                    .iter()
                    .find(|c| c.name == o.config_name())
                    .map(|c| c.digest.clone())
                    .unwrap_or_default(),
                time_s: o.elapsed_seconds(),
                success: o.succeeded(),
                binary: o.artifact_size(),
            })
            .collect();

        Self {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            sweep_id: report.sweep_id.clone(),
            generated_at: Utc::now(),
            source_dir: source_dir.display().to_string(),
            incremental,
            total: report.outcomes.len(),
            succeeded: report.succeeded_count(),
            failed: report.failed_count(),
            outcomes,
        }
    }
}

/// Write the summary as pretty JSON.
pub fn write_summary_json(path: &Path, artifact: &SweepSummaryArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact)?;
    std::fs::write(path, content)?;
    Ok(())
}
