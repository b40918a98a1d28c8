//! Sweep session configuration.
//!
//! Everything a sweep needs to know is collected into [`SweepOptions`] once,
//! up front, and handed to each component at construction. File names and
//! the snapshot identity live in [`ScratchFiles`] and [`SnapshotIdentity`]
//! rather than in process-wide constants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SweepError};

/// Well-known file names written inside the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchFiles {
    /// Active configuration consumed by the build system.
    pub active_config: String,
    /// Suffix the previous active configuration is preserved under.
    pub old_suffix: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_status: String,
    /// Elapsed build time in seconds.
    pub time: String,
    /// Per-iteration trace directory inside the backup location.
    pub trace_dir: String,
}

impl Default for ScratchFiles {
    fn default() -> Self {
        Self {
            active_config: ".config".to_string(),
            old_suffix: ".old".to_string(),
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
            exit_status: "exit_status".to_string(),
            time: "time".to_string(),
            trace_dir: "tracefiles".to_string(),
        }
    }
}

impl ScratchFiles {
    /// Build captures that must not leak from one configuration to the next.
    pub fn build_captures(&self) -> [&str; 4] {
        [
            self.stdout.as_str(),
            self.stderr.as_str(),
            self.exit_status.as_str(),
            self.time.as_str(),
        ]
    }

    pub fn old_config(&self) -> String {
        format!("{}{}", self.active_config, self.old_suffix)
    }
}

/// Fixed, non-identifying committer used for every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotIdentity {
    pub name: String,
    pub email: String,
    /// Message of the rollback-point commit.
    pub baseline_message: String,
    /// Message of every per-configuration commit.
    pub build_message: String,
    /// Branch holding the baseline commit.
    pub baseline_branch: String,
}

impl Default for SnapshotIdentity {
    fn default() -> Self {
        Self {
            name: "Tux".to_string(),
            email: "tux@tux.com".to_string(),
            baseline_message: "source".to_string(),
            build_message: "Clean build".to_string(),
            baseline_branch: "master".to_string(),
        }
    }
}

/// Compiler object cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub directory: PathBuf,
    /// Passed verbatim to `ccache -M`, e.g. `1T` or `20G`.
    pub max_size: String,
    /// Skip the deep clean at sweep start.
    pub keep_existing: bool,
    /// Turn on ccache's own debug logging.
    pub debug: bool,
    /// Append-only stats narrative.
    pub stats_log: PathBuf,
}

/// Backup target settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub directory: PathBuf,
    /// Clone and keep pulling the snapshot repository; when `false` only
    /// trace files and final reports are copied.
    pub mirror_repository: bool,
}

/// How the build system is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub program: String,
    pub extra_args: Vec<String>,
    /// Compiler wrapped by ccache (`CC="ccache <compiler>"`).
    pub compiler: String,
    /// `None` means detected CPU count + 1.
    pub jobs: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            extra_args: Vec::new(),
            compiler: "gcc".to_string(),
            jobs: None,
            timeout: None,
        }
    }
}

/// Fatal-error signatures used when no patterns are configured.
pub const DEFAULT_FATAL_PATTERNS: &[&str] = &[
    r"fatal error:",
    r"collect2: error: ld returned \d+ exit status",
];

/// Immutable description of one sweep run.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub source_dir: PathBuf,
    pub configs_dir: PathBuf,
    /// Expected build artifact, relative to `source_dir`.
    pub target: PathBuf,
    pub incremental: bool,
    pub results_path: PathBuf,
    /// Optional JSON summary written at the end of the sweep.
    pub summary_path: Option<PathBuf>,
    pub cache: Option<CacheOptions>,
    pub backup: Option<BackupOptions>,
    pub build: BuildOptions,
    pub fatal_patterns: Vec<String>,
    pub scratch: ScratchFiles,
    pub identity: SnapshotIdentity,
}

impl SweepOptions {
    /// Options with defaults for everything but the three required inputs.
    ///
    /// Results land next to the source tree (`<src>/../results.csv`).
    pub fn new(
        source_dir: impl Into<PathBuf>,
        configs_dir: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        let source_dir = source_dir.into();
        let results_path = sibling_of(&source_dir, "results.csv");
        Self {
            source_dir,
            configs_dir: configs_dir.into(),
            target: target.into(),
            incremental: false,
            results_path,
            summary_path: None,
            cache: None,
            backup: None,
            build: BuildOptions::default(),
            fatal_patterns: DEFAULT_FATAL_PATTERNS.iter().map(|p| p.to_string()).collect(),
            scratch: ScratchFiles::default(),
            identity: SnapshotIdentity::default(),
        }
    }

    pub fn target_path(&self) -> PathBuf {
        self.source_dir.join(&self.target)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Every file or directory the sweep writes outside the source tree.
    pub fn output_paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.results_path.as_path()];
        paths.extend(self.summary_path.as_deref());
        if let Some(cache) = &self.cache {
            paths.push(&cache.directory);
            paths.push(&cache.stats_log);
        }
        if let Some(backup) = &self.backup {
            paths.push(&backup.directory);
        }
        paths
    }

    /// Reject outputs placed inside the source tree.
    ///
    /// `git add -fA` would snapshot them, and a live result table then blocks
    /// the checkout back to the baseline branch.
    pub fn validate_outputs(&self) -> Result<()> {
        let source = resolve_path(&self.source_dir);
        for path in self.output_paths() {
            if resolve_path(path).starts_with(&source) {
                return Err(SweepError::OutputInsideSource(path.to_path_buf()));
            }
        }
        Ok(())
    }
}

/// Canonical form of the longest existing prefix of `path`, with the
/// missing remainder appended unchanged.
///
/// Resolves `..` and symlinks in paths whose leaf does not exist yet.
pub fn resolve_path(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(mut resolved) = existing.canonicalize() {
            resolved.extend(missing.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// `<dir>/../<name>`, falling back to `<dir>/<name>` at the filesystem root.
///
/// `dir` is resolved first, so `linux/arch/..` yields a sibling of `linux`.
pub fn sibling_of(dir: &Path, name: &str) -> PathBuf {
    let dir = resolve_path(dir);
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => dir.join(name),
    }
}

/// A caller-supplied configuration file. Identity is the file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// File name; also the branch name and trace-file prefix.
    pub name: String,
    pub path: PathBuf,
    /// SHA-256 hex digest of the file content.
    pub digest: String,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| SweepError::ConfigurationNotFound(path.to_path_buf()))?;
        let content = std::fs::read(path)
            .map_err(|_| SweepError::ConfigurationNotFound(path.to_path_buf()))?;
        Ok(Self {
            name,
            path: path.to_path_buf(),
            digest: compute_digest(&content),
        })
    }
}

/// Regular files in `dir`, sorted by name.
pub fn discover_configurations(dir: &Path) -> Result<Vec<Configuration>> {
    if !dir.is_dir() {
        return Err(SweepError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut configs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "Skipping non-file entry in configs directory");
            continue;
        }
        configs.push(Configuration::load(&path)?);
    }
    configs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(configs)
}

fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_files_default() {
        let scratch = ScratchFiles::default();
        assert_eq!(scratch.active_config, ".config");
        assert_eq!(scratch.old_config(), ".config.old");
        assert_eq!(
            scratch.build_captures(),
            ["stdout", "stderr", "exit_status", "time"]
        );
    }

    #[test]
    fn test_sweep_options_defaults() {
        let opts = SweepOptions::new("/work/linux", "/work/configs", "vmlinux");
        assert_eq!(opts.results_path, PathBuf::from("/work/results.csv"));
        assert_eq!(opts.target_path(), PathBuf::from("/work/linux/vmlinux"));
        assert!(!opts.incremental);
        assert!(!opts.cache_enabled());
        assert_eq!(opts.fatal_patterns.len(), DEFAULT_FATAL_PATTERNS.len());
        assert_eq!(opts.identity.baseline_branch, "master");
    }

    #[test]
    fn test_sibling_of_resolves_parent_components() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("linux");
        std::fs::create_dir_all(src.join("arch")).unwrap();

        let canonical_root = root.path().canonicalize().unwrap();
        assert_eq!(
            sibling_of(&src.join("arch").join(".."), "results.csv"),
            canonical_root.join("results.csv")
        );
        assert_eq!(
            resolve_path(&src.join("missing/results.csv")),
            canonical_root.join("linux/missing/results.csv")
        );
    }

    #[test]
    fn test_validate_outputs_rejects_paths_inside_source() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("linux");
        std::fs::create_dir_all(src.join("arch")).unwrap();
        let base = SweepOptions::new(&src, root.path().join("configs"), "vmlinux");
        base.validate_outputs().unwrap();

        let cache = |directory: PathBuf, stats_log: PathBuf| CacheOptions {
            directory,
            max_size: "1T".to_string(),
            keep_existing: false,
            debug: false,
            stats_log,
        };
        let outside = root.path().join("out");

        let mut results = base.clone();
        results.results_path = src.join("results.csv");
        let mut dotted = base.clone();
        dotted.results_path = src.join("arch/../results.csv");
        let mut summary = base.clone();
        summary.summary_path = Some(src.join("summary.json"));
        let mut cache_dir = base.clone();
        cache_dir.cache = Some(cache(src.join("cache"), outside.join("stats.txt")));
        let mut stats_log = base.clone();
        stats_log.cache = Some(cache(outside.join("cache"), src.join("stats.txt")));
        let mut backup = base.clone();
        backup.backup = Some(BackupOptions {
            directory: src.join("backup"),
            mirror_repository: true,
        });

        for opts in [results, dotted, summary, cache_dir, stats_log, backup] {
            let err = opts.validate_outputs().unwrap_err();
            assert!(matches!(err, SweepError::OutputInsideSource(_)), "{err}");
        }
    }

    #[test]
    fn test_validate_outputs_accepts_sibling_outputs() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("linux");
        std::fs::create_dir_all(&src).unwrap();
        let mut opts = SweepOptions::new(&src, root.path().join("configs"), "vmlinux");
        opts.results_path = root.path().join("linux-results.csv");
        opts.backup = Some(BackupOptions {
            directory: root.path().join("backup"),
            mirror_repository: false,
        });
        opts.validate_outputs().unwrap();
    }

    #[test]
    fn test_discover_configurations_sorted_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cfgB"), "CONFIG_B=y\n").unwrap();
        std::fs::write(dir.path().join("cfgA"), "CONFIG_A=y\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let configs = discover_configurations(dir.path()).unwrap();
        let names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["cfgA", "cfgB"]);
        assert_eq!(configs[0].digest.len(), 64);
        assert_ne!(configs[0].digest, configs[1].digest);
    }

    #[test]
    fn test_discover_configurations_missing_dir() {
        let err = discover_configurations(Path::new("/nonexistent/xbuilds/configs")).unwrap_err();
        assert!(matches!(err, SweepError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_configuration_load_missing_file() {
        let err = Configuration::load(Path::new("/nonexistent/cfg")).unwrap_err();
        assert!(matches!(err, SweepError::ConfigurationNotFound(_)));
    }
}
