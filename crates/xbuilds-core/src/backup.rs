//! Backup replication.
//!
//! Layout under the backup directory:
//!
//! ```text
//! <backup>/<source-name>/          git clone of the snapshot repository (optional)
//! <backup>/tracefiles/<cfg>_<file> per-iteration captures and artifacts
//! <backup>/results.csv             copied at the end of the sweep
//! <backup>/ccache-stats.txt        copied at the end when caching is enabled
//! <backup>/cache/                  full copy of the cache directory
//! ```
//!
//! Writes only go into the backup directory; the source tree is read-only
//! from this module's point of view.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, SweepError};
use crate::process::ProcessRunner;
use crate::snapshot::Git;

/// Mirrors the snapshot repository and per-iteration files to a second location.
pub struct BackupReplicator {
    runner: Arc<dyn ProcessRunner>,
    destination: PathBuf,
    trace_dir: PathBuf,
    mirror: Option<Git>,
    mirror_repository: bool,
}

impl BackupReplicator {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        destination: impl Into<PathBuf>,
        trace_dir_name: &str,
        mirror_repository: bool,
    ) -> Self {
        let destination = destination.into();
        let trace_dir = destination.join(trace_dir_name);
        Self {
            runner,
            destination,
            trace_dir,
            mirror: None,
            mirror_repository,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn trace_dir(&self) -> &Path {
        &self.trace_dir
    }

    /// Directory of the repository clone, once initialized.
    pub fn mirror_dir(&self) -> Option<&Path> {
        self.mirror.as_ref().map(Git::dir)
    }

    /// Clone `source` (no hardlinks) into the destination and create the
    /// trace directory.
    pub async fn initialize(&mut self, source: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.destination)?;

        if self.mirror_repository {
            let name = source
                .file_name()
                .ok_or_else(|| SweepError::DirectoryNotFound(source.to_path_buf()))?;
            let clone_dir = self.destination.join(name);
            info!(
                source = %source.display(),
                clone = %clone_dir.display(),
                "Cloning snapshot repository into backup"
            );
            let source_arg = source.to_string_lossy();
            let clone_arg = clone_dir.to_string_lossy();
            Git::new(self.runner.clone(), &self.destination)
                .run(&["clone", "--no-hardlinks", &source_arg, &clone_arg])
                .await?;
            self.mirror = Some(Git::new(self.runner.clone(), clone_dir));
        }

        std::fs::create_dir_all(&self.trace_dir)?;
        Ok(())
    }

    /// Pull the latest snapshot commits into the clone. No-op without a mirror.
    pub async fn sync_repository(&self) -> Result<()> {
        if let Some(mirror) = &self.mirror {
            debug!(clone = %mirror.dir().display(), "Pulling snapshots into backup");
            mirror.run(&["pull", "--ff-only"]).await?;
        }
        Ok(())
    }

    /// Copy each existing file to `<trace_dir>/<config_name>_<file name>`.
    ///
    /// Missing files are skipped. Returns the paths written.
    pub fn archive(&self, config_name: &str, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for file in files.iter().filter(|f| f.is_file()) {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = self
                .trace_dir
                .join(format!("{config_name}_{}", name.to_string_lossy()));
            std::fs::copy(file, &target)?;
            written.push(target);
        }
        debug!(config = %config_name, files = written.len(), "Archived trace files");
        Ok(written)
    }

    /// Copy the final reports (and the cache directory) into the backup.
    pub fn finalize(
        &self,
        result_table: &Path,
        cache_stats_log: Option<&Path>,
        cache_dir: Option<&Path>,
    ) -> Result<()> {
        copy_into(result_table, &self.destination)?;
        if let Some(log) = cache_stats_log {
            if log.is_file() {
                copy_into(log, &self.destination)?;
            }
        }
        if let Some(dir) = cache_dir {
            if dir.is_dir() {
                let name = dir.file_name().unwrap_or(dir.as_os_str());
                copy_dir_recursive(dir, &self.destination.join(name))?;
            }
        }
        info!(destination = %self.destination.display(), "Backup finalized");
        Ok(())
    }
}

fn copy_into(file: &Path, dir: &Path) -> Result<()> {
    let name = file
        .file_name()
        .ok_or_else(|| SweepError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no file name",
        )))?;
    std::fs::copy(file, dir.join(name))?;
    Ok(())
}

/// Recursive copy; symlinks are followed.
fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        let target = to.join(entry.file_name());
        if path.is_dir() {
            copy_dir_recursive(&path, &target)?;
        } else {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}
