//! Build outcome classification.
//!
//! A build succeeded when BOTH hold:
//! 1. the expected artifact exists on disk, and
//! 2. no line of the captured stderr matches a fatal-error pattern.
//!
//! The exit code is not consulted. A missing stderr capture counts as
//! "no fatal pattern found"; one that exists but cannot be read fails.

use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;

/// Two-factor success check over a build's artifact and stderr capture.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    matchers: Vec<Regex>,
    stderr_path: PathBuf,
}

impl OutcomeClassifier {
    /// Compile `patterns` into fatal-error matchers.
    pub fn new<S: AsRef<str>>(patterns: &[S], stderr_path: impl Into<PathBuf>) -> Result<Self> {
        let matchers = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            matchers,
            stderr_path: stderr_path.into(),
        })
    }

    /// Whether the last build produced `artifact` without fatal errors.
    pub fn is_success(&self, artifact: &Path) -> bool {
        if !artifact.is_file() {
            debug!(artifact = %artifact.display(), "Expected artifact missing");
            return false;
        }
        match self.scan_log() {
            LogScan::Clean => true,
            LogScan::Fatal(line) => {
                debug!(line = %line, "Fatal error signature in build log");
                false
            }
            LogScan::Unreadable(e) => {
                warn!(path = %self.stderr_path.display(), error = %e, "Build log unreadable");
                false
            }
        }
    }

    /// First stderr line matching any fatal pattern.
    pub fn first_fatal_line(&self) -> Option<String> {
        match self.scan_log() {
            LogScan::Fatal(line) => Some(line),
            LogScan::Clean | LogScan::Unreadable(_) => None,
        }
    }

    fn scan_log(&self) -> LogScan {
        let bytes = match std::fs::read(&self.stderr_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LogScan::Clean,
            Err(e) => return LogScan::Unreadable(e),
        };
        let log = String::from_utf8_lossy(&bytes);
        log.lines()
            .find(|line| self.matchers.iter().any(|m| m.is_match(line)))
            .map(|line| LogScan::Fatal(line.to_string()))
            .unwrap_or(LogScan::Clean)
    }
}

enum LogScan {
    Clean,
    Fatal(String),
    Unreadable(io::Error),
}
