//! Compiler object cache (ccache) control.
//!
//! Every operation here is advisory: callers log failures and keep going.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SweepError};
use crate::process::{Invocation, ProcessOutput, ProcessRunner};

/// Drives the `ccache` CLI.
pub struct CacheController {
    runner: Arc<dyn ProcessRunner>,
    cwd: PathBuf,
    program: String,
}

impl CacheController {
    pub fn new(runner: Arc<dyn ProcessRunner>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            cwd: cwd.into(),
            program: "ccache".to_string(),
        }
    }

    /// Point the cache at `directory` and cap it at `max_size` (e.g. `1T`).
    pub async fn configure(&self, directory: &Path, max_size: &str) -> Result<()> {
        debug!(directory = %directory.display(), max_size = %max_size, "Configuring ccache");
        self.ccache(&[
            "--set-config".to_string(),
            format!("cache_dir={}", directory.display()),
        ])
        .await?;
        self.ccache(&["-M".to_string(), max_size.to_string()]).await?;
        Ok(())
    }

    /// Toggle ccache's own debug logging.
    pub async fn set_debug(&self, enabled: bool) -> Result<()> {
        self.ccache(&["--set-config".to_string(), format!("debug={enabled}")])
            .await?;
        Ok(())
    }

    /// Clear the cache and zero its counters.
    pub async fn clean(&self) -> Result<()> {
        self.ccache(&["-cCz".to_string()]).await?;
        Ok(())
    }

    /// Append a `======= <label> =======` section with `ccache -s` output.
    ///
    /// The header is written even if `ccache -s` fails, so the log still
    /// shows where the gap is.
    pub async fn dump_stats(&self, label: &str, destination: &Path) -> Result<()> {
        let mut log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)?;
        writeln!(log, "======= {label} =======")?;

        let output = self.ccache(&["-s".to_string()]).await?;
        log.write_all(&output.stdout)?;
        Ok(())
    }

    async fn ccache(&self, args: &[String]) -> Result<ProcessOutput> {
        let invocation = Invocation::new(&self.program, &self.cwd).args(args.iter().cloned());
        let output = self.runner.run(&invocation).await.map_err(|e| match e {
            SweepError::Spawn { source, .. } => SweepError::Cache(format!(
                "{}: {source}",
                invocation.display()
            )),
            other => other,
        })?;
        if !output.success() {
            return Err(SweepError::Cache(format!(
                "{} exited with {:?}: {}",
                invocation.display(),
                output.exit_code,
                output.stderr_lossy().trim()
            )));
        }
        Ok(output)
    }
}
