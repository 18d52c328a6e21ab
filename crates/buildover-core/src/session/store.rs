//! In-memory session records. Nothing survives a restart.

use super::state::{Session, SessionId, SessionStatus};
use chrono::Utc;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new active session.
    pub fn create(&mut self, id: SessionId, branch_name: String) -> Session {
        let session = Session::new(id.clone(), branch_name);
        self.sessions.insert(id, session.clone());
        session
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Apply `f` to a session and refresh its `last_activity`.
    pub fn update(&mut self, id: &SessionId, f: impl FnOnce(&mut Session)) -> Option<Session> {
        let session = self.sessions.get_mut(id)?;
        f(session);
        session.last_activity = Utc::now();
        Some(session.clone())
    }

    /// All sessions, oldest first.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        sessions
    }

    pub fn list_active(&self) -> Vec<Session> {
        self.list()
            .into_iter()
            .filter(|s| s.status == SessionStatus::Active)
            .collect()
    }
}
