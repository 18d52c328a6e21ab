//! Live agent adapters, one per session id.

use buildover_core::{AgentAdapter, AgentSettings};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AgentRegistry {
    settings: Arc<AgentSettings>,
    agents: Mutex<HashMap<String, Arc<AgentAdapter>>>,
}

impl AgentRegistry {
    pub fn new(settings: Arc<AgentSettings>) -> Self {
        Self {
            settings,
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Arc<AgentSettings> {
        &self.settings
    }

    /// The adapter for `session_id`, created on first use.
    ///
    /// Lookup and insert happen under one lock, so racing callers share
    /// a single adapter.
    pub fn get_or_create(&self, session_id: &str) -> Arc<AgentAdapter> {
        let mut agents = self.lock();
        let adapter = agents.entry(session_id.to_string()).or_insert_with(|| {
            log::debug!("Creating agent adapter for session {}", session_id);
            Arc::new(AgentAdapter::new(session_id, Arc::clone(&self.settings)))
        });
        Arc::clone(adapter)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<AgentAdapter>> {
        self.lock().get(session_id).cloned()
    }

    /// Stop and forget the adapter for `session_id`. Returns whether one existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.lock().remove(session_id);
        match removed {
            Some(adapter) => {
                adapter.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every adapter and clear the registry.
    pub fn stop_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (session_id, adapter) in drained {
            log::debug!("Stopping agent for session {}", session_id);
            adapter.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<AgentAdapter>>> {
        self.agents.lock().unwrap_or_else(|e| e.into_inner())
    }
}
