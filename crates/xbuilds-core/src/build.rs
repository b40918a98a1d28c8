//! Build execution.
//!
//! [`BuildExecutor`] installs a configuration as the active config file,
//! runs the build system once, and leaves the captures (`stdout`, `stderr`,
//! `exit_status`, `time`) in the source tree where the classifier and the
//! snapshot commit pick them up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{BuildOptions, ScratchFiles};
use crate::error::{Result, SweepError};
use crate::process::{Invocation, ProcessRunner};

/// Exit status written when the build never produced one.
pub const NO_EXIT_STATUS: i32 = -1;

/// Result of one build invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRun {
    /// Exit code (`None` if the build was killed, timed out or never started).
    pub exit_code: Option<i32>,

    /// Wall-clock seconds, when measured.
    pub elapsed_seconds: Option<f64>,

    /// Captured stdout.
    pub stdout: Vec<u8>,

    /// Captured stderr.
    pub stderr: Vec<u8>,
}

impl BuildRun {
    /// Whether the build system ran to an exit status.
    ///
    /// Unspawnable, timed-out and signal-killed builds did not; whatever
    /// artifact is on disk belongs to an earlier build.
    pub fn completed(&self) -> bool {
        self.exit_code.is_some()
    }
}

/// Runs the external build system inside the source tree.
pub struct BuildExecutor {
    runner: Arc<dyn ProcessRunner>,
    source_dir: PathBuf,
    options: BuildOptions,
    scratch: ScratchFiles,
}

impl BuildExecutor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        source_dir: impl Into<PathBuf>,
        options: BuildOptions,
        scratch: ScratchFiles,
    ) -> Self {
        Self {
            runner,
            source_dir: source_dir.into(),
            options,
            scratch,
        }
    }

    /// Build once.
    ///
    /// * `config`: installed as the active config file first; the previous
    ///   one is kept under the `.old` suffix.
    /// * `jobs`: overrides [`BuildOptions::jobs`]; defaults to CPU count + 1.
    /// * `measure_time`: persist elapsed seconds to the `time` capture.
    /// * `use_cache`: compile through `ccache`.
    ///
    /// A failing, killed or unspawnable build is a normal result. Only a
    /// missing source directory or configuration file is an error.
    pub async fn run(
        &self,
        config: Option<&Path>,
        jobs: Option<usize>,
        measure_time: bool,
        use_cache: bool,
    ) -> Result<BuildRun> {
        if !self.source_dir.is_dir() {
            return Err(SweepError::DirectoryNotFound(self.source_dir.clone()));
        }
        if let Some(config) = config {
            self.install_config(config)?;
        }

        let jobs = jobs.or(self.options.jobs).unwrap_or_else(default_jobs);
        let mut invocation = Invocation::new(&self.options.program, &self.source_dir)
            .args(self.options.extra_args.iter().cloned())
            .timeout(self.options.timeout);
        if use_cache {
            invocation = invocation.arg(format!("CC=ccache {}", self.options.compiler));
        }
        invocation = invocation.arg(format!("-j{jobs}"));

        debug!(command = %invocation.display(), "Running build");
        let run = match self.runner.run(&invocation).await {
            Ok(output) => BuildRun {
                exit_code: output.exit_code,
                elapsed_seconds: Some(output.elapsed.as_secs_f64()),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Err(e) => {
                warn!(command = %invocation.display(), error = %e, "Build did not complete");
                BuildRun {
                    exit_code: None,
                    elapsed_seconds: None,
                    stdout: Vec::new(),
                    stderr: format!("xbuilds: {e}\n").into_bytes(),
                }
            }
        };

        self.write_captures(&run, measure_time)?;
        Ok(run)
    }

    /// Remove build captures left by a previous configuration.
    pub fn clear_captures(&self) -> Result<()> {
        for name in self.scratch.build_captures() {
            let path = self.source_dir.join(name);
            if path.is_file() {
                debug!(path = %path.display(), "Removing stale capture");
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    pub fn capture_path(&self, name: &str) -> PathBuf {
        self.source_dir.join(name)
    }

    fn install_config(&self, config: &Path) -> Result<()> {
        if !config.is_file() {
            return Err(SweepError::ConfigurationNotFound(config.to_path_buf()));
        }
        let active = self.source_dir.join(&self.scratch.active_config);
        if active.is_file() {
            std::fs::rename(&active, self.source_dir.join(self.scratch.old_config()))?;
        }
        std::fs::copy(config, &active)?;
        Ok(())
    }

    fn write_captures(&self, run: &BuildRun, measure_time: bool) -> Result<()> {
        let exit_status = run.exit_code.unwrap_or(NO_EXIT_STATUS);
        std::fs::write(
            self.capture_path(&self.scratch.exit_status),
            exit_status.to_string(),
        )?;
        std::fs::write(self.capture_path(&self.scratch.stdout), &run.stdout)?;
        std::fs::write(self.capture_path(&self.scratch.stderr), &run.stderr)?;

        if measure_time {
            if let Some(secs) = run.elapsed_seconds {
                std::fs::write(self.capture_path(&self.scratch.time), format!("{secs:.2}\n"))?;
            }
        }
        Ok(())
    }
}

/// Read the elapsed time persisted by the last build.
///
/// Returns `0.0` when the file is missing or unreadable.
pub fn read_build_time(source_dir: &Path, scratch: &ScratchFiles) -> f64 {
    let path = source_dir.join(&scratch.time);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return 0.0;
    };
    match content.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => line.trim().parse().unwrap_or_else(|_| {
            warn!(path = %path.display(), "Unparseable build time");
            0.0
        }),
        None => 0.0,
    }
}

/// Detected CPU count + 1.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}
