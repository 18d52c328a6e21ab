//! SessionManager - session records and their branches.
//!
//! # Lifecycle
//!
//! ```text
//! create(description) ──► active ──► end(id, should_merge) ──► ended
//! ```
//!
//! `ended` is terminal. Ending always discards the session branch, even
//! when the requested merge failed; the merge outcome is returned to the
//! caller instead.

use super::state::{branch_name, slugify, Session, SessionId, SessionStatus};
use super::store::SessionStore;
use crate::git::{GitError, MergeResult, MergeStrategy, VersionControl};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Namespace used for session branches unless configured otherwise.
pub const DEFAULT_BRANCH_NAMESPACE: &str = "buildover";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Owns all sessions and drives the version-control adapter for them.
///
/// The store lock is never held across an `.await`.
pub struct SessionManager {
    store: RwLock<SessionStore>,
    git: Arc<dyn VersionControl>,
    namespace: String,
}

impl SessionManager {
    pub fn new(git: Arc<dyn VersionControl>) -> Self {
        Self::with_namespace(git, DEFAULT_BRANCH_NAMESPACE)
    }

    pub fn with_namespace(git: Arc<dyn VersionControl>, namespace: impl Into<String>) -> Self {
        Self {
            store: RwLock::new(SessionStore::new()),
            git,
            namespace: namespace.into(),
        }
    }

    pub fn git(&self) -> &Arc<dyn VersionControl> {
        &self.git
    }

    /// Create a session and check out its new branch.
    pub async fn create(&self, description: &str) -> Result<Session, SessionError> {
        let id = loop {
            let id = SessionId::generate();
            if !self.read().contains(&id) {
                break id;
            }
        };
        let branch = branch_name(&self.namespace, &id, &slugify(description));

        self.git.create_branch(&branch).await?;

        let session = self.write().create(id, branch);
        log::info!("Created session {} on {}", session.id, session.branch_name);
        Ok(session)
    }

    /// End a session: optionally merge, then discard its branch.
    ///
    /// Unknown ids are a no-op returning `Ok(None)`. Returns the merge result
    /// when a merge was attempted. A failed merge is not an error; a failed
    /// discard is, though the session is marked ended either way.
    pub async fn end(
        &self,
        id: &SessionId,
        should_merge: bool,
        strategy: MergeStrategy,
    ) -> Result<Option<MergeResult>, SessionError> {
        let Some(branch) = self.read().get(id).map(|s| s.branch_name.clone()) else {
            log::debug!("Ignoring end for unknown session {}", id);
            return Ok(None);
        };

        let merge = if should_merge {
            Some(self.merge_session(id, &branch, strategy).await)
        } else {
            None
        };

        if let Some(ref result) = merge {
            if !result.success {
                log::warn!(
                    "Merge of {} failed, discarding anyway: {}",
                    branch,
                    result.message
                );
            }
        }

        let discarded = self.git.discard(&branch).await;
        self.write().update(id, |s| s.status = SessionStatus::Ended);
        discarded?;

        log::info!("Ended session {}", id);
        Ok(merge)
    }

    /// Commit pending edits on the session branch, then merge it.
    async fn merge_session(
        &self,
        id: &SessionId,
        branch: &str,
        strategy: MergeStrategy,
    ) -> MergeResult {
        let on_branch = matches!(self.git.current_branch().await, Ok(ref b) if b == branch);
        if on_branch {
            let message = format!("{}: session {}", self.namespace, id);
            if let Err(e) = self.git.auto_commit(&message).await {
                return MergeResult {
                    success: false,
                    message: format!("Failed to commit session changes: {e}"),
                    conflicts: vec![],
                };
            }
        }

        self.git.merge(branch, strategy).await
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Session> {
        self.read().list()
    }

    pub fn list_active(&self) -> Vec<Session> {
        self.read().list_active()
    }

    /// Refresh `last_activity`. Returns `false` for unknown ids.
    pub fn touch(&self, id: &SessionId) -> bool {
        self.write().update(id, |_| {}).is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionStore> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// TESTS
// ============================================================================
