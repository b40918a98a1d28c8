//! Error taxonomy for configuration sweeps.
//!
//! A failed build is never an error: it is recorded as a `BuildOutcome`
//! with `succeeded = false`. Errors here are either precondition failures
//! (abort before or during the sweep) or helper-tool failures (surfaced as
//! warnings by the orchestrator unless snapshot integrity is at stake).

use std::path::PathBuf;

/// Coarse classification of a [`SweepError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing directories/files or an unusable configuration name.
    Precondition,
    /// A helper command (git, ccache, build wrapper) failed or could not run.
    ToolInvocation,
    /// Local I/O or serialization problems.
    Internal,
}

/// Sweep errors.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("no such directory: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no such configuration: {}", .0.display())]
    ConfigurationNotFound(PathBuf),

    #[error("branch already exists: {0} (remove it before re-running this configuration)")]
    BranchExists(String),

    #[error("configuration name is not a valid branch name: {0}")]
    InvalidBranchName(String),

    /// An output would be swept into the snapshots and block the next checkout.
    #[error("output path lies inside the source tree: {}", .0.display())]
    OutputInsideSource(PathBuf),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("ccache error: {0}")]
    Cache(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("invalid fatal pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    /// Which side of the error taxonomy this error falls on.
    pub fn class(&self) -> ErrorClass {
        match self {
            SweepError::DirectoryNotFound(_)
            | SweepError::ConfigurationNotFound(_)
            | SweepError::BranchExists(_)
            | SweepError::InvalidBranchName(_)
            | SweepError::OutputInsideSource(_)
            | SweepError::InvalidPattern(_) => ErrorClass::Precondition,
            SweepError::Git { .. }
            | SweepError::Cache(_)
            | SweepError::Spawn { .. }
            | SweepError::Timeout { .. } => ErrorClass::ToolInvocation,
            SweepError::Serialization(_) | SweepError::Io(_) => ErrorClass::Internal,
        }
    }

    pub fn is_precondition(&self) -> bool {
        self.class() == ErrorClass::Precondition
    }
}

/// Result type for sweep operations.
pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_not_found_display() {
        let err = SweepError::DirectoryNotFound(PathBuf::from("/nope/src"));
        assert_eq!(err.to_string(), "no such directory: /nope/src");
        assert!(err.is_precondition());
    }

    #[test]
    fn test_git_error_is_tool_invocation() {
        let err = SweepError::Git {
            command: "commit".to_string(),
            stderr: "nothing to commit".to_string(),
        };
        assert!(err.to_string().contains("git commit failed"));
        assert_eq!(err.class(), ErrorClass::ToolInvocation);
    }

    #[test]
    fn test_branch_exists_is_precondition() {
        let err = SweepError::BranchExists("defconfig".to_string());
        assert!(err.to_string().contains("defconfig"));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_output_inside_source_is_precondition() {
        let err = SweepError::OutputInsideSource(PathBuf::from("/work/linux/results.csv"));
        assert_eq!(
            err.to_string(),
            "output path lies inside the source tree: /work/linux/results.csv"
        );
        assert!(err.is_precondition());
    }

    #[test]
    fn test_io_error_is_internal() {
        let err = SweepError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(err.class(), ErrorClass::Internal);
    }
}
