//! Git diff statistics.
//!
//! # Overview
//!
//! [`get_diff`] compares the working tree against a base ref (HEAD by
//! default) and reports per-file line counts plus an aggregate summary.
//!
//! # Numstat Format
//!
//! ```text
//! 3\t1\tsrc/app.ts
//! -\t-\tlogo.png
//! ```
//!
//! Binary files report `-` and are counted as zero lines.

use super::{run_git_success, GitError};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// TYPES
// ============================================================================

/// Line counts for one changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffStat {
    /// Path relative to the repository root
    pub path: String,
    pub insertions: u32,
    pub deletions: u32,
    /// `insertions + deletions`
    pub changes: u32,
}

/// Totals across all changed files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub insertions: u32,
    pub deletions: u32,
    pub files_changed: u32,
}

/// Result of [`get_diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitDiff {
    pub files: Vec<FileDiffStat>,
    pub summary: DiffSummary,
}

impl GitDiff {
    /// Build a diff, computing the summary from the file list.
    pub fn from_files(files: Vec<FileDiffStat>) -> Self {
        let summary = DiffSummary {
            insertions: files.iter().map(|f| f.insertions).sum(),
            deletions: files.iter().map(|f| f.deletions).sum(),
            files_changed: files.len() as u32,
        };
        Self { files, summary }
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse the output of `git diff --numstat`.
pub fn parse_numstat(stdout: &str) -> Vec<FileDiffStat> {
    let mut files = Vec::new();

    for line in stdout.lines() {
        let parts: Vec<&str> = line.splitn(3, '\t').collect();
        if parts.len() != 3 {
            continue;
        }

        // "-" marks a binary file
        let insertions = parts[0].parse::<u32>().unwrap_or(0);
        let deletions = parts[1].parse::<u32>().unwrap_or(0);

        files.push(FileDiffStat {
            path: parts[2].to_string(),
            insertions,
            deletions,
            changes: insertions + deletions,
        });
    }

    files
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Diff the working tree against `base`, or against HEAD when `None`.
pub async fn get_diff(repo_path: &Path, base: Option<&str>) -> Result<GitDiff, GitError> {
    let base = base.unwrap_or("HEAD");
    let stdout = run_git_success(&["diff", "--numstat", base, "--"], repo_path).await?;
    Ok(GitDiff::from_files(parse_numstat(&stdout)))
}

// ============================================================================
// TESTS
// ============================================================================
