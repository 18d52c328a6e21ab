//! Server configuration.

use buildover_core::session::DEFAULT_BRANCH_NAMESPACE;
use buildover_core::AgentSettings;
use std::path::{Path, PathBuf};

/// Every control route and the control WebSocket live under this prefix.
pub const CONTROL_PREFIX: &str = "/buildover";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4100;
pub const DEFAULT_TARGET: &str = "http://localhost:3000";
pub const DEFAULT_PRIMARY_BRANCH: &str = "main";

/// Everything needed to start a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upstream origin, already normalized
    pub target_url: String,
    /// Repository root and agent working directory
    pub project_root: PathBuf,
    pub widget_path: PathBuf,
    /// How agent processes are launched. The API key lives here too.
    pub agent: AgentSettings,
    pub branch_namespace: String,
    pub primary_branch: String,
}

impl ServerConfig {
    /// Defaults for everything except the project root and upstream.
    pub fn new(project_root: impl Into<PathBuf>, target_url: &str) -> Self {
        let project_root = project_root.into();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            target_url: normalize_target_url(target_url),
            widget_path: default_widget_path(&project_root),
            agent: AgentSettings::new(&project_root),
            project_root,
            branch_namespace: DEFAULT_BRANCH_NAMESPACE.to_string(),
            primary_branch: DEFAULT_PRIMARY_BRANCH.to_string(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Widget bundle location inside the project's dependencies.
pub fn default_widget_path(project_root: &Path) -> PathBuf {
    project_root
        .join("node_modules")
        .join("buildover-widget")
        .join("dist")
        .join("widget.js")
}

/// Turn user input into an origin URL.
///
/// A bare port becomes `http://localhost:<port>`, a missing scheme gets
/// `http://`, and trailing slashes are dropped.
pub fn normalize_target_url(raw: &str) -> String {
    let raw = raw.trim();
    let url = if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("http://localhost:{raw}")
    } else if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    url.trim_end_matches('/').to_string()
}

/// `ws://` or `wss://` form of an `http(s)://` origin.
pub fn websocket_origin(target_url: &str) -> String {
    if let Some(rest) = target_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = target_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        target_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_targets_localhost() {
        assert_eq!(normalize_target_url("5173"), "http://localhost:5173");
    }

    #[test]
    fn missing_scheme_gets_http() {
        assert_eq!(normalize_target_url("localhost:8080"), "http://localhost:8080");
        assert_eq!(normalize_target_url(" example.test/ "), "http://example.test");
    }

    #[test]
    fn full_url_is_kept() {
        assert_eq!(normalize_target_url("https://app.test:8443/"), "https://app.test:8443");
    }

    #[test]
    fn websocket_origin_swaps_scheme() {
        assert_eq!(websocket_origin("http://localhost:3000"), "ws://localhost:3000");
        assert_eq!(websocket_origin("https://app.test"), "wss://app.test");
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::new("/srv/app", "3000");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.target_url, "http://localhost:3000");
        assert_eq!(config.branch_namespace, "buildover");
        assert_eq!(config.primary_branch, "main");
        assert_eq!(config.agent.working_dir, PathBuf::from("/srv/app"));
        assert_eq!(
            config.widget_path,
            PathBuf::from("/srv/app/node_modules/buildover-widget/dist/widget.js")
        );
        assert_eq!(config.bind_addr(), "127.0.0.1:4100");
    }
}
