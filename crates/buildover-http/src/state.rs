//! Shared state for the HTTP server.
//!
//! Wraps the session manager, the live-agent registry and the upstream
//! client needed by every handler.

use crate::config::ServerConfig;
use crate::registry::AgentRegistry;
use buildover_core::{GitRepository, SessionManager, VersionControl};
use std::sync::Arc;

/// Shared state available to all HTTP handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: SessionManager,
    pub agents: AgentRegistry,
    /// Client for upstream requests. Never follows redirects.
    pub client: reqwest::Client,
}

impl AppState {
    /// State backed by the git repository at the project root.
    pub fn new(config: ServerConfig) -> Result<Self, reqwest::Error> {
        let git = GitRepository::new(&config.project_root)
            .with_primary_branch(config.primary_branch.clone());
        Self::with_version_control(config, Arc::new(git))
    }

    pub fn with_version_control(
        config: ServerConfig,
        git: Arc<dyn VersionControl>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let sessions = SessionManager::with_namespace(git, config.branch_namespace.clone());
        let agents = AgentRegistry::new(Arc::new(config.agent.clone()));

        Ok(Self {
            config,
            sessions,
            agents,
            client,
        })
    }

    pub fn git(&self) -> &Arc<dyn VersionControl> {
        self.sessions.git()
    }
}
