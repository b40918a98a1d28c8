//! Git snapshot store.
//!
//! Wraps the `git` CLI into the primitives the sweep needs: ensure a
//! repository with a baseline commit, fork one branch per configuration,
//! and commit the whole tree (artifacts and logs included) after each build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SnapshotIdentity;
use crate::error::{Result, SweepError};
use crate::process::{Invocation, ProcessRunner};

/// Thin `git` command wrapper bound to one working tree.
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn ProcessRunner>,
    dir: PathBuf,
}

impl Git {
    pub fn new(runner: Arc<dyn ProcessRunner>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `git <args>` and return trimmed stdout; non-zero exit is an error.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let invocation = Invocation::new("git", &self.dir).args(args.iter().copied());
        debug!(command = %invocation.display(), cwd = %self.dir.display(), "git");

        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(SweepError::Git {
                command: args.join(" "),
                stderr: output.stderr_lossy().trim().to_string(),
            });
        }
        Ok(output.stdout_lossy().trim().to_string())
    }
}

/// Version-controlled snapshots of the source tree.
pub struct SnapshotStore {
    git: Git,
    identity: SnapshotIdentity,
}

impl SnapshotStore {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        repo_dir: impl Into<PathBuf>,
        identity: SnapshotIdentity,
    ) -> Self {
        Self {
            git: Git::new(runner, repo_dir),
            identity,
        }
    }

    pub fn repo_dir(&self) -> &Path {
        self.git.dir()
    }

    /// Create the repository and its baseline commit unless one exists.
    ///
    /// Returns `true` when a new repository was initialized.
    pub async fn ensure_repository(&self) -> Result<bool> {
        if self.repo_dir().join(".git").exists() {
            info!(repo = %self.repo_dir().display(), "Already a git repository");
            return Ok(false);
        }

        info!(repo = %self.repo_dir().display(), "Initializing git repository");
        self.git.run(&["init"]).await?;
        let head = format!("refs/heads/{}", self.identity.baseline_branch);
        self.git.run(&["symbolic-ref", "HEAD", &head]).await?;
        self.git
            .run(&["config", "user.email", &self.identity.email])
            .await?;
        self.git
            .run(&["config", "user.name", &self.identity.name])
            .await?;
        debug!(
            name = %self.identity.name,
            email = %self.identity.email,
            "Configured snapshot identity"
        );

        let baseline = self.identity.baseline_message.clone();
        self.commit_all(&baseline).await?;
        Ok(true)
    }

    /// Stage the entire tree, ignored files included, and commit.
    pub async fn commit_all(&self, message: &str) -> Result<()> {
        self.git.run(&["add", "-fA"]).await?;
        self.git
            .run(&["commit", "--allow-empty", "--no-gpg-sign", "-m", message])
            .await?;
        Ok(())
    }

    pub async fn checkout(&self, reference: &str) -> Result<()> {
        self.git.run(&["checkout", reference]).await?;
        Ok(())
    }

    /// Return to the baseline commit's branch.
    pub async fn reset_to_baseline(&self) -> Result<()> {
        let branch = self.identity.baseline_branch.clone();
        self.checkout(&branch).await
    }

    /// Fork `name` from HEAD and switch to it.
    ///
    /// Fails if the branch already exists; history is never overwritten.
    pub async fn create_branch(&self, name: &str) -> Result<()> {
        self.git.run(&["checkout", "-b", name]).await?;
        Ok(())
    }

    /// Local branch names.
    pub async fn list_branches(&self) -> Result<Vec<String>> {
        let out = self
            .git
            .run(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list_branches().await?.iter().any(|b| b == name))
    }

    /// Reject names git would not accept as a branch.
    pub async fn validate_branch_name(&self, name: &str) -> Result<()> {
        match self.git.run(&["check-ref-format", "--branch", name]).await {
            Ok(_) => Ok(()),
            Err(SweepError::Git { .. }) => Err(SweepError::InvalidBranchName(name.to_string())),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{exit_with, ScriptedRunner};
    use crate::process::{ProcessOutput, SystemRunner};
    use std::process::Command as StdCommand;

    fn git_out(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn store(dir: &Path) -> SnapshotStore {
        SnapshotStore::new(Arc::new(SystemRunner), dir, SnapshotIdentity::default())
    }

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "all:\n\ttouch vmlinux\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_ensure_repository_creates_baseline() {
        let src = source_tree();
        let store = store(src.path());
        assert!(store.ensure_repository().await.unwrap());

        assert_eq!(git_out(src.path(), &["rev-list", "--count", "HEAD"]), "1");
        assert_eq!(git_out(src.path(), &["log", "-1", "--format=%s"]), "source");
        assert_eq!(
            git_out(src.path(), &["log", "-1", "--format=%an <%ae>"]),
            "Tux <tux@tux.com>"
        );
        assert_eq!(store.list_branches().await.unwrap(), vec!["master".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_repository_is_idempotent() {
        let src = source_tree();
        let store = store(src.path());
        assert!(store.ensure_repository().await.unwrap());
        assert!(!store.ensure_repository().await.unwrap());
        assert_eq!(git_out(src.path(), &["rev-list", "--count", "HEAD"]), "1");
    }

    #[tokio::test]
    async fn test_branch_per_configuration() {
        let src = source_tree();
        let store = store(src.path());
        store.ensure_repository().await.unwrap();

        store.create_branch("tinyconfig").await.unwrap();
        std::fs::write(src.path().join("vmlinux"), "ELF").unwrap();
        store.commit_all("Clean build").await.unwrap();
        store.reset_to_baseline().await.unwrap();

        assert!(store.branch_exists("tinyconfig").await.unwrap());
        assert!(!src.path().join("vmlinux").exists());
        assert_eq!(
            git_out(src.path(), &["rev-list", "--count", "master..tinyconfig"]),
            "1"
        );
    }

    #[tokio::test]
    async fn test_create_existing_branch_fails() {
        let src = source_tree();
        let store = store(src.path());
        store.ensure_repository().await.unwrap();
        store.create_branch("allnoconfig").await.unwrap();
        store.reset_to_baseline().await.unwrap();

        let err = store.create_branch("allnoconfig").await.unwrap_err();
        assert!(matches!(err, SweepError::Git { .. }));
    }

    #[tokio::test]
    async fn test_commit_all_includes_ignored_files() {
        let src = source_tree();
        std::fs::write(src.path().join(".gitignore"), "*.o\n").unwrap();
        let store = store(src.path());
        store.ensure_repository().await.unwrap();

        std::fs::write(src.path().join("main.o"), "obj").unwrap();
        store.commit_all("Clean build").await.unwrap();
        let files = git_out(src.path(), &["ls-files"]);
        assert!(files.lines().any(|f| f == "main.o"));
    }

    #[tokio::test]
    async fn test_validate_branch_name() {
        let src = source_tree();
        let store = store(src.path());
        store.ensure_repository().await.unwrap();
        store.validate_branch_name("x86_64_defconfig").await.unwrap();
        let err = store.validate_branch_name("bad..name").await.unwrap_err();
        assert!(matches!(err, SweepError::InvalidBranchName(_)));
    }

    #[tokio::test]
    async fn test_git_failure_surfaces_stderr() {
        let runner = ScriptedRunner::new().respond(
            "git",
            ProcessOutput {
                stderr: b"fatal: not a git repository\n".to_vec(),
                ..exit_with(128)
            },
        );
        let git = Git::new(Arc::new(runner), "/tmp");
        let err = git.run(&["status"]).await.unwrap_err();
        match err {
            SweepError::Git { command, stderr } => {
                assert_eq!(command, "status");
                assert_eq!(stderr, "fatal: not a git repository");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
