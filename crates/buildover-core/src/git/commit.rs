//! Auto-commit of agent edits.

use super::{run_git, run_git_success, GitError};
use std::path::Path;

/// Stage all pending changes and commit them with `message`.
///
/// Returns `Ok(false)` without committing when the working tree is clean.
pub async fn auto_commit(repo_path: &Path, message: &str) -> Result<bool, GitError> {
    let status = run_git_success(&["status", "--porcelain"], repo_path).await?;
    if status.is_empty() {
        return Ok(false);
    }

    run_git_success(&["add", "-A"], repo_path).await?;

    let output = run_git(&["commit", "-q", "-m", message], repo_path).await?;
    if !output.success {
        return Err(GitError::GitFailed {
            stderr: output.stderr_str().trim().to_string(),
            stdout: output.stdout_str().trim().to_string(),
        });
    }

    log::info!("Auto-committed pending changes: {}", message);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_repo;
    use tempfile::tempdir;

    #[tokio::test]
    async fn clean_tree_is_not_committed() {
        if !test_repo::git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        test_repo::init(dir.path());

        assert!(!auto_commit(dir.path(), "nothing").await.unwrap());
    }

    #[tokio::test]
    async fn pending_changes_are_committed() {
        if !test_repo::git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        test_repo::init(dir.path());
        std::fs::write(dir.path().join("new.txt"), "content\n").unwrap();

        assert!(auto_commit(dir.path(), "add new file").await.unwrap());

        let status = run_git_success(&["status", "--porcelain"], dir.path())
            .await
            .unwrap();
        assert!(status.is_empty());
        let log = run_git_success(&["log", "-1", "--format=%s"], dir.path())
            .await
            .unwrap();
        assert_eq!(log, "add new file");
    }
}
