//! xbuilds - configuration sweep over a source tree
//!
//! Builds one source tree once per configuration file, records time,
//! outcome and artifact size per configuration, and keeps a git branch
//! (or commit, in incremental mode) of the tree after every build.
//!
//! ```text
//! xbuilds --src linux --configs randconfigs --target vmlinux --ccache --backup /mnt/backup
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use xbuilds_core::config::{resolve_path, sibling_of};
use xbuilds_core::{
    BackupOptions, CacheOptions, Sweep, SweepOptions, SweepReport, SystemRunner,
};

#[derive(Parser, Debug)]
#[command(name = "xbuilds")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build a source tree once per configuration and record the outcomes", long_about = None)]
struct Cli {
    /// Source tree to build (must exist)
    #[arg(long, env = "XBUILDS_SRC")]
    src: PathBuf,

    /// Directory of configuration files, one build per file
    #[arg(long, env = "XBUILDS_CONFIGS")]
    configs: PathBuf,

    /// Expected build artifact, relative to the source tree
    #[arg(long, env = "XBUILDS_TARGET")]
    target: PathBuf,

    /// Build every configuration on top of the previous one, on a single branch
    #[arg(long)]
    incremental: bool,

    /// Compile through ccache
    #[arg(long)]
    ccache: bool,

    /// Keep the existing cache contents instead of wiping them first
    #[arg(long)]
    keep_cache: bool,

    /// Cache directory (default: <src>/../cache)
    #[arg(long, env = "XBUILDS_CCACHE_DIR")]
    ccache_dir: Option<PathBuf>,

    /// Cache statistics log (default: <src>/../ccache-stats.txt)
    #[arg(long, env = "XBUILDS_CCACHE_STATS")]
    ccache_stats: Option<PathBuf>,

    /// Maximum cache size
    #[arg(long, default_value = "1T")]
    ccache_size: String,

    /// Enable ccache debug logging
    #[arg(long)]
    debug: bool,

    /// Mirror results and trace files into this directory
    #[arg(long, env = "XBUILDS_BACKUP")]
    backup: Option<PathBuf>,

    /// Copy files only; do not clone the source repository into the backup
    #[arg(long)]
    no_git_backup: bool,

    /// Result table (default: <src>/../results.csv)
    #[arg(long, env = "XBUILDS_RESULTS")]
    results: Option<PathBuf>,

    /// Also write a JSON summary of the sweep
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Parallel build jobs (default: CPU count + 1)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Build command
    #[arg(long, default_value = "make")]
    make: String,

    /// Extra argument passed to the build command (repeatable)
    #[arg(long = "make-arg", allow_hyphen_values = true)]
    make_args: Vec<String>,

    /// Compiler wrapped by ccache
    #[arg(long, default_value = "gcc")]
    cc: String,

    /// Per-build timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Regex marking a build log as failed (repeatable, replaces the defaults)
    #[arg(long = "fatal-pattern")]
    fatal_patterns: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Resolve paths against the working directory and fill in defaults.
    fn sweep_options(&self) -> Result<SweepOptions> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let src = resolve_path(&absolute(&cwd, &self.src));
        let configs = absolute(&cwd, &self.configs);

        let mut opts = SweepOptions::new(&src, configs, &self.target);
        opts.incremental = self.incremental;
        if let Some(results) = &self.results {
            opts.results_path = absolute(&cwd, results);
        }
        opts.summary_path = self.summary.as_ref().map(|p| absolute(&cwd, p));

        if self.ccache {
            opts.cache = Some(CacheOptions {
                directory: self
                    .ccache_dir
                    .as_ref()
                    .map(|p| absolute(&cwd, p))
                    .unwrap_or_else(|| sibling_of(&src, "cache")),
                max_size: self.ccache_size.clone(),
                keep_existing: self.keep_cache,
                debug: self.debug,
                stats_log: self
                    .ccache_stats
                    .as_ref()
                    .map(|p| absolute(&cwd, p))
                    .unwrap_or_else(|| sibling_of(&src, "ccache-stats.txt")),
            });
        }

        opts.backup = self.backup.as_ref().map(|dir| BackupOptions {
            directory: absolute(&cwd, dir),
            mirror_repository: !self.no_git_backup,
        });

        opts.build.program = self.make.clone();
        opts.build.extra_args = self.make_args.clone();
        opts.build.compiler = self.cc.clone();
        opts.build.jobs = self.jobs;
        opts.build.timeout = self.timeout.map(Duration::from_secs);

        if !self.fatal_patterns.is_empty() {
            opts.fatal_patterns = self.fatal_patterns.clone();
        }
        Ok(opts)
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    xbuilds_core::init_tracing(cli.json, level);

    let opts = cli.sweep_options()?;
    info!(version = xbuilds_core::VERSION, "xbuilds starting");

    let report = Sweep::new(opts, Arc::new(SystemRunner))
        .run()
        .await
        .context("Sweep aborted")?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &SweepReport) {
    println!("Sweep ID: {}", report.sweep_id);
    println!("Duration: {}ms", report.duration_ms);
    println!(
        "Builds: {} ({} succeeded, {} failed)",
        report.outcomes.len(),
        report.succeeded_count(),
        report.failed_count()
    );
    println!();

    for outcome in &report.outcomes {
        let status = if outcome.succeeded() { "✓" } else { "✗" };
        match outcome.artifact_size() {
            Some(size) => println!(
                "  {} {} ({:.2}s, {} bytes)",
                status,
                outcome.config_name(),
                outcome.elapsed_seconds(),
                size
            ),
            None => println!(
                "  {} {} ({:.2}s)",
                status,
                outcome.config_name(),
                outcome.elapsed_seconds()
            ),
        }
    }
    println!();
    println!("Results: {}", report.results_path.display());
}
