//! Per-configuration outcomes and the result table.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Header row of the result table.
pub const RESULT_HEADER: &str = "config,time(s),success,binary";

/// Outcome of one configuration's build.
///
/// `artifact_size` is `Some` exactly when `succeeded` is true; the two
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutcome {
    config_name: String,
    elapsed_seconds: f64,
    succeeded: bool,
    artifact_size: Option<u64>,
}

impl BuildOutcome {
    pub fn success(config_name: impl Into<String>, elapsed_seconds: f64, artifact_size: u64) -> Self {
        Self {
            config_name: config_name.into(),
            elapsed_seconds,
            succeeded: true,
            artifact_size: Some(artifact_size),
        }
    }

    pub fn failure(config_name: impl Into<String>, elapsed_seconds: f64) -> Self {
        Self {
            config_name: config_name.into(),
            elapsed_seconds,
            succeeded: false,
            artifact_size: None,
        }
    }

    pub fn config_name(&self) -> &str {
        &self.config_name
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn artifact_size(&self) -> Option<u64> {
        self.artifact_size
    }

    /// `config,time(s),success,binary` row, without the newline.
    pub fn to_row(&self) -> String {
        let size = self
            .artifact_size
            .map(|s| s.to_string())
            .unwrap_or_default();
        format!(
            "{},{},{},{}",
            csv_field(&self.config_name),
            self.elapsed_seconds,
            self.succeeded,
            size
        )
    }
}

/// Quote a field when it holds a comma, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Owns the result table for the duration of a sweep.
///
/// Every row is flushed as soon as it is appended, and the buffered writer
/// is flushed again when the recorder is dropped, so an aborted sweep still
/// leaves a valid prefix on disk.
#[derive(Debug)]
pub struct ResultRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl ResultRecorder {
    /// Create (or truncate) the table and write the header.
    pub fn open(path: &Path) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{RESULT_HEADER}")?;
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn append(&mut self, outcome: &BuildOutcome) -> Result<()> {
        writeln!(self.writer, "{}", outcome.to_row())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and release the file.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_size_failure_does_not() {
        let ok = BuildOutcome::success("cfgA", 12.5, 4096);
        assert!(ok.succeeded());
        assert_eq!(ok.artifact_size(), Some(4096));

        let failed = BuildOutcome::failure("cfgB", 3.0);
        assert!(!failed.succeeded());
        assert_eq!(failed.artifact_size(), None);
    }

    #[test]
    fn test_rows() {
        assert_eq!(
            BuildOutcome::success("cfgA", 12.5, 4096).to_row(),
            "cfgA,12.5,true,4096"
        );
        assert_eq!(BuildOutcome::failure("cfgB", 0.0).to_row(), "cfgB,0,false,");
        assert_eq!(
            BuildOutcome::failure("a,b", 1.25).to_row(),
            "\"a,b\",1.25,false,"
        );
    }

    #[test]
    fn test_recorder_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let mut recorder = ResultRecorder::open(&path).unwrap();
        recorder.append(&BuildOutcome::success("cfgA", 1.5, 10)).unwrap();
        recorder.append(&BuildOutcome::failure("cfgB", 2.0)).unwrap();
        assert_eq!(recorder.rows(), 2);
        recorder.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "config,time(s),success,binary\ncfgA,1.5,true,10\ncfgB,2,false,\n"
        );
    }

    #[test]
    fn test_dropped_recorder_leaves_valid_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        {
            let mut recorder = ResultRecorder::open(&path).unwrap();
            recorder.append(&BuildOutcome::success("cfgA", 1.0, 1)).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with("cfgA,1,true,1\n"));
    }

    #[test]
    fn test_open_fails_in_missing_directory() {
        assert!(ResultRecorder::open(Path::new("/nonexistent/xbuilds/results.csv")).is_err());
    }
}
