//! Git merge operations.
//!
//! # Overview
//!
//! When a session ends with `shouldMerge`, its branch is folded back into
//! the primary branch:
//!
//! 1. Check out the primary branch
//! 2. Apply the session branch with the chosen [`MergeStrategy`]
//! 3. On failure, collect conflicting paths and abort so the working tree
//!    is left clean
//!
//! # Strategies
//!
//! - **Merge**: `git merge --no-edit <branch>`
//! - **Squash**: `git merge --squash <branch>` followed by a single commit
//! - **Rebase**: `git rebase <branch>` run from the primary branch
//!
//! # Failure Handling
//!
//! [`merge_branch`] never returns an error. Every failure, including a
//! failed checkout, is folded into a [`MergeResult`] with `success: false`.

use super::{run_git, run_git_success, GitError, GitOutput};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// TYPES
// ============================================================================

/// How a session branch is applied to the primary branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Merge,
    Squash,
    Rebase,
}

/// Result of a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,

    /// Human-readable message describing the result
    pub message: String,

    /// Conflicting paths. Empty on success and on non-conflict failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

impl MergeResult {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
            conflicts: vec![],
        }
    }

    fn failed(message: String, conflicts: Vec<String>) -> Self {
        Self {
            success: false,
            message,
            conflicts,
        }
    }
}

// ============================================================================
// PERFORMING MERGES
// ============================================================================

/// Merge `branch` into `primary_branch` using `strategy`.
pub async fn merge_branch(
    repo_path: &Path,
    primary_branch: &str,
    branch: &str,
    strategy: MergeStrategy,
) -> MergeResult {
    match try_merge(repo_path, primary_branch, branch, strategy).await {
        Ok(result) => result,
        Err(e) => {
            log::warn!("Merge of {} into {} failed: {}", branch, primary_branch, e);
            MergeResult::failed(e.to_string(), vec![])
        }
    }
}

async fn try_merge(
    repo_path: &Path,
    primary_branch: &str,
    branch: &str,
    strategy: MergeStrategy,
) -> Result<MergeResult, GitError> {
    run_git_success(&["checkout", primary_branch], repo_path).await?;

    let output = match strategy {
        MergeStrategy::Merge => run_git(&["merge", "--no-edit", branch], repo_path).await?,
        MergeStrategy::Squash => {
            let output = run_git(&["merge", "--squash", branch], repo_path).await?;
            if output.success {
                // Nothing staged means the branch had no new commits
                let staged = run_git(&["diff", "--cached", "--quiet"], repo_path).await?;
                if staged.success {
                    return Ok(MergeResult::ok(format!(
                        "Nothing to merge from {branch}"
                    )));
                }
                let message = format!("Merge branch '{branch}' (squashed)");
                run_git(&["commit", "-q", "-m", &message], repo_path).await?
            } else {
                output
            }
        }
        MergeStrategy::Rebase => run_git(&["rebase", branch], repo_path).await?,
    };

    if output.success {
        log::info!("Merged {} into {} ({:?})", branch, primary_branch, strategy);
        return Ok(MergeResult::ok(format!("Successfully merged {branch}")));
    }

    let conflicts = collect_conflicts(repo_path, &output).await;
    abort(repo_path, strategy).await;

    if !conflicts.is_empty() {
        return Ok(MergeResult::failed(
            format!("Merge of '{branch}' into '{primary_branch}' has conflicts"),
            conflicts,
        ));
    }

    let detail = match output.stderr_str().trim() {
        "" => output.stdout_str().trim().to_string(),
        stderr => stderr.to_string(),
    };
    Ok(MergeResult::failed(format!("Merge failed: {detail}"), vec![]))
}

/// Conflicting paths from `CONFLICT` lines plus any unmerged index entries.
async fn collect_conflicts(repo_path: &Path, output: &GitOutput) -> Vec<String> {
    let mut conflicts = parse_conflict_paths(&output.stdout_str());

    if let Ok(unmerged) =
        run_git_success(&["diff", "--name-only", "--diff-filter=U"], repo_path).await
    {
        for path in unmerged.lines() {
            if !conflicts.iter().any(|c| c == path) {
                conflicts.push(path.to_string());
            }
        }
    }

    conflicts
}

/// Leave the repository clean after a failed attempt. Errors are ignored
/// since there may be nothing in progress to abort.
async fn abort(repo_path: &Path, strategy: MergeStrategy) {
    let args: &[&str] = match strategy {
        MergeStrategy::Merge => &["merge", "--abort"],
        MergeStrategy::Squash => &["reset", "--merge"],
        MergeStrategy::Rebase => &["rebase", "--abort"],
    };
    let _ = run_git(args, repo_path).await;
}

// ============================================================================
// PARSING
// ============================================================================

/// Extract file paths from `CONFLICT (...)` lines of merge output.
///
/// Lines of the form `CONFLICT (content): Merge conflict in <path>` yield
/// `<path>`; any other `CONFLICT` line is kept verbatim.
pub fn parse_conflict_paths(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|l| l.starts_with("CONFLICT"))
        .map(|l| match l.split_once("Merge conflict in ") {
            Some((_, path)) => path.trim().to_string(),
            None => l.to_string(),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
