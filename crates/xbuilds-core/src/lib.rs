//! xbuilds core library
//!
//! Sweeps a source tree through a directory of build configurations. For
//! every configuration it installs the config file, runs the build,
//! classifies the outcome, commits a git snapshot of the whole tree and
//! appends a row to the result table. Compiler cache statistics and a
//! backup mirror are optional side channels.

pub mod backup;
pub mod build;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod process;
pub mod report;
pub mod results;
pub mod snapshot;
pub mod sweep;
pub mod telemetry;

pub use backup::BackupReplicator;
pub use build::{default_jobs, read_build_time, BuildExecutor, BuildRun};
pub use cache::CacheController;
pub use classify::OutcomeClassifier;
pub use config::{
    discover_configurations, BackupOptions, BuildOptions, CacheOptions, Configuration,
    ScratchFiles, SnapshotIdentity, SweepOptions, DEFAULT_FATAL_PATTERNS,
};
pub use error::{ErrorClass, Result, SweepError};
pub use process::{Invocation, ProcessOutput, ProcessRunner, SystemRunner};
pub use report::{write_summary_json, SweepReport, SweepSummaryArtifact};
pub use results::{BuildOutcome, ResultRecorder, RESULT_HEADER};
pub use snapshot::{Git, SnapshotStore};
pub use sweep::Sweep;
pub use telemetry::init_tracing;

/// xbuilds version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
