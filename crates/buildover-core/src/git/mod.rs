//! Git operations for session branches.
//!
//! # Overview
//!
//! Every assistant-driven edit session lives on its own branch. This module
//! wraps the `git` CLI (rather than libgit2) so the user's own configuration,
//! hooks and credentials apply unchanged.
//!
//! # Modules
//!
//! - [`branch`] - Create, list, switch and force-delete branches
//! - [`commit`] - Auto-commit pending working tree changes
//! - [`diff`] - Per-file insertion/deletion counts
//! - [`merge`] - Merge a session branch back with a chosen strategy
//!
//! # Error Handling
//!
//! Every operation returns `Result<T, GitError>` except
//! [`VersionControl::merge`], which folds failures into a [`MergeResult`]
//! so that a conflicting merge never aborts the caller.

pub mod branch;
pub mod commit;
pub mod diff;
pub mod merge;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

pub use branch::GitBranch;
pub use diff::{parse_numstat, DiffSummary, FileDiffStat, GitDiff};
pub use merge::{MergeResult, MergeStrategy};

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Error type for git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Command failed to execute (e.g., git not found)
    #[error("Failed to run git: {0}")]
    CommandFailed(#[from] std::io::Error),

    /// Git command returned non-zero exit code
    #[error("Git error: {stderr}")]
    GitFailed {
        /// The stderr output from git
        stderr: String,
        /// The stdout output (sometimes contains useful info)
        stdout: String,
    },

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

// ============================================================================
// OUTPUT TYPE
// ============================================================================

/// Output from a git command.
#[derive(Debug)]
pub struct GitOutput {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl GitOutput {
    /// Get stdout as a string (lossy UTF-8 conversion)
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string (lossy UTF-8 conversion)
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

// ============================================================================
// COMMON UTILITIES
// ============================================================================

/// Run a git command asynchronously and return the output.
///
/// A non-zero exit is not an error here; callers inspect `success`.
pub async fn run_git(args: &[&str], cwd: &Path) -> Result<GitOutput, GitError> {
    log::debug!("git {}", args.join(" "));

    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Run a git command and return trimmed stdout, or `GitFailed` with stderr.
pub async fn run_git_success(args: &[&str], cwd: &Path) -> Result<String, GitError> {
    let output = run_git(args, cwd).await?;

    if output.success {
        Ok(output.stdout_str().trim().to_string())
    } else {
        Err(GitError::GitFailed {
            stderr: output.stderr_str().trim().to_string(),
            stdout: output.stdout_str().trim().to_string(),
        })
    }
}

/// Get the current branch name, or "HEAD" when detached.
pub async fn get_current_branch(cwd: &Path) -> Result<String, GitError> {
    run_git_success(&["rev-parse", "--abbrev-ref", "HEAD"], cwd).await
}

/// Check if a path is inside a git repository (`.git` dir or worktree file).
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Branch-level operations the session lifecycle depends on.
///
/// Only `merge` swallows failures; everything else propagates to the caller.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Create `name` from the current HEAD and check it out.
    async fn create_branch(&self, name: &str) -> Result<(), GitError>;

    /// Stage everything and commit. Returns `false` when there was nothing to commit.
    async fn auto_commit(&self, message: &str) -> Result<bool, GitError>;

    /// Diff the working tree against `base` (or HEAD).
    async fn get_diff(&self, base: Option<&str>) -> Result<GitDiff, GitError>;

    /// Merge `branch` into the primary branch.
    async fn merge(&self, branch: &str, strategy: MergeStrategy) -> MergeResult;

    /// Force-delete `branch`, switching to the primary branch first if needed.
    async fn discard(&self, branch: &str) -> Result<(), GitError>;

    async fn current_branch(&self) -> Result<String, GitError>;

    async fn list_branches(&self) -> Result<Vec<GitBranch>, GitError>;
}

/// CLI-backed [`VersionControl`] rooted at the project directory.
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
    primary_branch: String,
}

impl GitRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            primary_branch: "main".to_string(),
        }
    }

    /// Override the branch that merges land on and discards switch back to.
    pub fn with_primary_branch(mut self, name: impl Into<String>) -> Self {
        self.primary_branch = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn primary_branch(&self) -> &str {
        &self.primary_branch
    }
}

#[async_trait]
impl VersionControl for GitRepository {
    async fn create_branch(&self, name: &str) -> Result<(), GitError> {
        branch::create_branch(&self.root, name).await
    }

    async fn auto_commit(&self, message: &str) -> Result<bool, GitError> {
        commit::auto_commit(&self.root, message).await
    }

    async fn get_diff(&self, base: Option<&str>) -> Result<GitDiff, GitError> {
        diff::get_diff(&self.root, base).await
    }

    async fn merge(&self, branch: &str, strategy: MergeStrategy) -> MergeResult {
        merge::merge_branch(&self.root, &self.primary_branch, branch, strategy).await
    }

    async fn discard(&self, branch: &str) -> Result<(), GitError> {
        branch::discard_branch(&self.root, &self.primary_branch, branch).await
    }

    async fn current_branch(&self) -> Result<String, GitError> {
        get_current_branch(&self.root).await
    }

    async fn list_branches(&self) -> Result<Vec<GitBranch>, GitError> {
        branch::list_branches(&self.root).await
    }
}

// ============================================================================
// TEST HELPERS
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
