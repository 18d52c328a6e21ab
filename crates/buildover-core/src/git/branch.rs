//! Git branch operations.
//!
//! - [`create_branch`] - Create and check out a new branch
//! - [`discard_branch`] - Switch away if needed, then force-delete
//! - [`list_branches`] - Local branches with their tip commit
//!
//! Discarding uses `-D`: session branches are thrown away whether or not
//! their commits were merged.

use super::{get_current_branch, run_git_success, GitError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A local branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitBranch {
    pub name: String,
    /// Whether this branch is checked out
    pub is_current: bool,
    /// Abbreviated hash of the branch tip
    pub commit_hash: String,
}

/// Create `branch_name` from HEAD and check it out.
///
/// Fails if the branch already exists.
pub async fn create_branch(repo_path: &Path, branch_name: &str) -> Result<(), GitError> {
    run_git_success(&["checkout", "-b", branch_name], repo_path).await?;
    log::info!("Created branch {}", branch_name);
    Ok(())
}

/// Force-delete a branch.
///
/// If `branch_name` is checked out, switches to `primary_branch` first since
/// git refuses to delete the current branch. Uncommitted changes travel
/// with the checkout.
pub async fn discard_branch(
    repo_path: &Path,
    primary_branch: &str,
    branch_name: &str,
) -> Result<(), GitError> {
    let current = get_current_branch(repo_path).await?;

    if current == branch_name {
        run_git_success(&["checkout", primary_branch], repo_path).await?;
    }

    run_git_success(&["branch", "-D", branch_name], repo_path).await?;
    log::info!("Discarded branch {}", branch_name);
    Ok(())
}

/// List local branches.
pub async fn list_branches(repo_path: &Path) -> Result<Vec<GitBranch>, GitError> {
    let stdout = run_git_success(
        &[
            "for-each-ref",
            "--format=%(HEAD)%09%(refname:short)%09%(objectname:short)",
            "refs/heads",
        ],
        repo_path,
    )
    .await?;

    Ok(parse_branch_list(&stdout))
}

/// Parse `for-each-ref` output of the form `<*| >\t<name>\t<hash>`.
pub fn parse_branch_list(stdout: &str) -> Vec<GitBranch> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let head = parts.next()?;
            let name = parts.next()?;
            let hash = parts.next().unwrap_or("");
            if name.is_empty() {
                return None;
            }
            Some(GitBranch {
                name: name.to_string(),
                is_current: head.trim() == "*",
                commit_hash: hash.trim().to_string(),
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_repo;
    use tempfile::tempdir;

    #[test]
    fn parse_branch_list_marks_current() {
        let output = "*\tmain\tabc1234\n \tbuildover/1f2e/fix-bug\tdef5678\n";
        let branches = parse_branch_list(output);

        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name, "main");
        assert!(branches[0].is_current);
        assert_eq!(branches[0].commit_hash, "abc1234");
        assert_eq!(branches[1].name, "buildover/1f2e/fix-bug");
        assert!(!branches[1].is_current);
    }

    #[test]
    fn parse_branch_list_skips_garbage() {
        assert!(parse_branch_list("").is_empty());
        assert!(parse_branch_list("nonsense\n").is_empty());
    }

    #[test]
    fn branch_serializes_camel_case() {
        let branch = GitBranch {
            name: "main".to_string(),
            is_current: true,
            commit_hash: "abc".to_string(),
        };
        let json = serde_json::to_string(&branch).unwrap();
        assert!(json.contains("\"isCurrent\":true"));
        assert!(json.contains("\"commitHash\":\"abc\""));
    }

    #[tokio::test]
    async fn create_then_discard_current_branch() {
        if !test_repo::git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        test_repo::init(dir.path());

        create_branch(dir.path(), "buildover/abc/test").await.unwrap();
        assert_eq!(
            get_current_branch(dir.path()).await.unwrap(),
            "buildover/abc/test"
        );

        discard_branch(dir.path(), "main", "buildover/abc/test")
            .await
            .unwrap();
        assert_eq!(get_current_branch(dir.path()).await.unwrap(), "main");

        let branches = list_branches(dir.path()).await.unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "main");
    }

    #[tokio::test]
    async fn discard_missing_branch_fails() {
        if !test_repo::git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        test_repo::init(dir.path());

        let result = discard_branch(dir.path(), "main", "does-not-exist").await;
        assert!(matches!(result, Err(GitError::GitFailed { .. })));
    }
}
