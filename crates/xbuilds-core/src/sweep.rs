//! Configuration sweep orchestration.
//!
//! ```text
//! INIT -> REPO_READY -> (BASELINE -> BUILD -> CLASSIFY -> SNAPSHOT -> RECORD -> BACKUP?)* -> DONE
//! ```
//!
//! Configurations run strictly one after another in name order: each one
//! mutates the same working tree, active config file and git checkout.
//! A failed build is recorded and the sweep moves on. The sweep aborts
//! only on precondition failures, on git failures that would put the next
//! snapshot on the wrong branch, and on result-table I/O errors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::backup::BackupReplicator;
use crate::build::{read_build_time, BuildExecutor, BuildRun};
use crate::cache::CacheController;
use crate::classify::OutcomeClassifier;
use crate::config::{discover_configurations, Configuration, SweepOptions};
use crate::error::{Result, SweepError};
use crate::obs::{self, SweepPhase};
use crate::process::ProcessRunner;
use crate::report::{write_summary_json, SweepReport, SweepSummaryArtifact};
use crate::results::{BuildOutcome, ResultRecorder};
use crate::snapshot::SnapshotStore;

/// Label of the stats section written before the first build.
pub const INITIALIZATION_LABEL: &str = "Initialization";

/// Sweeps one source tree through every configuration in a directory.
pub struct Sweep {
    options: SweepOptions,
    runner: Arc<dyn ProcessRunner>,
}

/// Components wired up for one run.
struct Session<'a> {
    options: &'a SweepOptions,
    store: SnapshotStore,
    executor: BuildExecutor,
    classifier: OutcomeClassifier,
    cache: Option<CacheController>,
    backup: Option<BackupReplicator>,
}

impl Sweep {
    pub fn new(options: SweepOptions, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { options, runner }
    }

    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    /// Run the whole sweep.
    pub async fn run(&self) -> Result<SweepReport> {
        let sweep_id = Uuid::new_v4().to_string();
        let span = obs::sweep_span(&sweep_id);
        self.run_inner(sweep_id).instrument(span).await
    }

    async fn run_inner(&self, sweep_id: String) -> Result<SweepReport> {
        let start = Instant::now();
        let opts = &self.options;

        // INIT
        if !opts.source_dir.is_dir() {
            return Err(SweepError::DirectoryNotFound(opts.source_dir.clone()));
        }
        opts.validate_outputs()?;
        let configs = discover_configurations(&opts.configs_dir)?;
        let classifier = OutcomeClassifier::new(
            &opts.fatal_patterns,
            opts.source_dir.join(&opts.scratch.stderr),
        )?;

        obs::emit_sweep_started(
            &opts.source_dir.display().to_string(),
            configs.len(),
            opts.incremental,
            opts.cache_enabled(),
        );

        // REPO_READY
        let store = SnapshotStore::new(
            self.runner.clone(),
            &opts.source_dir,
            opts.identity.clone(),
        );
        store.ensure_repository().await?;
        if !opts.incremental {
            preflight_branches(&store, &configs).await?;
        }

        let cache = self.prepare_cache().await;
        let backup = match &opts.backup {
            Some(backup_opts) => {
                let mut replicator = BackupReplicator::new(
                    self.runner.clone(),
                    &backup_opts.directory,
                    &opts.scratch.trace_dir,
                    backup_opts.mirror_repository,
                );
                replicator.initialize(&opts.source_dir).await?;
                Some(replicator)
            }
            None => None,
        };

        let mut recorder = ResultRecorder::open(&opts.results_path)?;
        let session = Session {
            options: opts,
            store,
            executor: BuildExecutor::new(
                self.runner.clone(),
                &opts.source_dir,
                opts.build.clone(),
                opts.scratch.clone(),
            ),
            classifier,
            cache,
            backup,
        };

        info!(configs = configs.len(), "=== Starting builds ===");
        let mut outcomes = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            obs::emit_config_started(index, configs.len(), &config.name, &config.digest);
            let outcome = session.iterate(config, &mut recorder).await?;
            outcomes.push(outcome);
        }

        // DONE
        recorder.close()?;
        session.finalize_backup();

        let report = SweepReport {
            sweep_id,
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
            results_path: opts.results_path.clone(),
        };
        if let Some(path) = &opts.summary_path {
            let artifact =
                SweepSummaryArtifact::new(&report, &configs, &opts.source_dir, opts.incremental);
            write_summary_json(path, &artifact)?;
        }
        obs::emit_sweep_finished(
            report.duration_ms,
            report.outcomes.len(),
            report.succeeded_count(),
        );
        Ok(report)
    }

    /// Configure ccache, clean it unless asked to keep it, and write the
    /// initialization stats. Returns `None` when caching is disabled.
    async fn prepare_cache(&self) -> Option<CacheController> {
        let Some(cache_opts) = &self.options.cache else {
            info!("ccache disabled");
            return None;
        };

        let cache = CacheController::new(self.runner.clone(), &self.options.source_dir);
        info!(
            directory = %cache_opts.directory.display(),
            max_size = %cache_opts.max_size,
            "ccache enabled"
        );
        if let Err(e) = cache
            .configure(&cache_opts.directory, &cache_opts.max_size)
            .await
        {
            obs::emit_tool_degraded(SweepPhase::Cache, INITIALIZATION_LABEL, &e);
        }
        if cache_opts.debug {
            if let Err(e) = cache.set_debug(true).await {
                obs::emit_tool_degraded(SweepPhase::Cache, INITIALIZATION_LABEL, &e);
            }
        }
        if !cache_opts.keep_existing {
            info!("ccache deep clean");
            if let Err(e) = cache.clean().await {
                obs::emit_tool_degraded(SweepPhase::Cache, INITIALIZATION_LABEL, &e);
            }
        }
        if let Err(e) = cache
            .dump_stats(INITIALIZATION_LABEL, &cache_opts.stats_log)
            .await
        {
            obs::emit_tool_degraded(SweepPhase::Cache, INITIALIZATION_LABEL, &e);
        }
        Some(cache)
    }
}

/// Refuse to start when a configuration's branch could not be created.
async fn preflight_branches(store: &SnapshotStore, configs: &[Configuration]) -> Result<()> {
    let existing = store.list_branches().await?;
    for config in configs {
        store.validate_branch_name(&config.name).await?;
        if existing.iter().any(|b| b == &config.name) {
            return Err(SweepError::BranchExists(config.name.clone()));
        }
    }
    Ok(())
}

impl Session<'_> {
    async fn iterate(
        &self,
        config: &Configuration,
        recorder: &mut ResultRecorder,
    ) -> Result<BuildOutcome> {
        let opts = self.options;
        let name = config.name.as_str();

        // BASELINE
        debug!(config = %name, phase = %SweepPhase::Baseline);
        if opts.incremental {
            if let Err(e) = self.executor.clear_captures() {
                obs::emit_tool_degraded(SweepPhase::Baseline, name, &e);
            }
        } else {
            self.store.reset_to_baseline().await?;
            self.store.create_branch(name).await?;
        }

        // BUILD
        debug!(config = %name, phase = %SweepPhase::Build);
        let run = self
            .executor
            .run(Some(&config.path), None, true, self.cache.is_some())
            .await?;
        debug!(config = %name, exit_code = ?run.exit_code, "Build returned");

        // CLASSIFY
        debug!(config = %name, phase = %SweepPhase::Classify);
        let elapsed = read_build_time(&opts.source_dir, &opts.scratch);
        let outcome = self.classify(name, &run, elapsed);
        obs::emit_config_finished(
            name,
            outcome.elapsed_seconds(),
            outcome.succeeded(),
            outcome.artifact_size(),
        );

        // SNAPSHOT
        debug!(config = %name, phase = %SweepPhase::Snapshot);
        if let Err(e) = self.store.commit_all(&opts.identity.build_message).await {
            obs::emit_tool_degraded(SweepPhase::Snapshot, name, &e);
        }

        // RECORD
        debug!(config = %name, phase = %SweepPhase::Record);
        recorder.append(&outcome)?;

        if let (Some(cache), Some(cache_opts)) = (&self.cache, &opts.cache) {
            if let Err(e) = cache.dump_stats(name, &cache_opts.stats_log).await {
                obs::emit_tool_degraded(SweepPhase::Cache, name, &e);
            }
        }

        if let Some(backup) = &self.backup {
            debug!(config = %name, phase = %SweepPhase::Backup);
            if let Err(e) = backup.sync_repository().await {
                obs::emit_tool_degraded(SweepPhase::Backup, name, &e);
            }
            if let Err(e) = backup.archive(name, &self.trace_files()) {
                obs::emit_tool_degraded(SweepPhase::Backup, name, &e);
            }
        }

        Ok(outcome)
    }

    /// A build that never reached an exit status fails without looking at
    /// the tree: in incremental mode the artifact there is the previous one.
    fn classify(&self, name: &str, run: &BuildRun, elapsed: f64) -> BuildOutcome {
        if !run.completed() {
            debug!(config = %name, "Build did not complete");
            return BuildOutcome::failure(name, elapsed);
        }
        let target = self.options.target_path();
        if !self.classifier.is_success(&target) {
            return BuildOutcome::failure(name, elapsed);
        }
        match std::fs::metadata(&target) {
            Ok(meta) => BuildOutcome::success(name, elapsed, meta.len()),
            Err(e) => {
                warn!(config = %name, error = %e, "Artifact vanished after classification");
                BuildOutcome::failure(name, elapsed)
            }
        }
    }

    /// Captures and artifact copied to the backup after each iteration.
    fn trace_files(&self) -> Vec<PathBuf> {
        let scratch = &self.options.scratch;
        vec![
            self.executor.capture_path(&scratch.stdout),
            self.executor.capture_path(&scratch.stderr),
            self.executor.capture_path(&scratch.exit_status),
            self.options.target_path(),
        ]
    }

    fn finalize_backup(&self) {
        let Some(backup) = &self.backup else {
            return;
        };
        let cache = self.options.cache.as_ref();
        if let Err(e) = backup.finalize(
            &self.options.results_path,
            cache.map(|c| c.stats_log.as_path()),
            cache.map(|c| c.directory.as_path()),
        ) {
            obs::emit_tool_degraded(SweepPhase::Backup, "finalize", &e);
        }
    }
}
