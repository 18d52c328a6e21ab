//! BuildOver daemon.
//!
//! Runs the proxy in front of a dev server:
//!
//! ```text
//! buildover --target 3000 --project-root ~/code/my-app
//! ```
//!
//! then open `http://localhost:4100` instead of the app's own port.

use buildover_http::config::{
    default_widget_path, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PRIMARY_BRANCH, DEFAULT_TARGET,
};
use buildover_http::ServerConfig;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "buildover")]
#[command(version)]
#[command(about = "Chat with a coding agent from inside your running app")]
struct Cli {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Upstream dev server: a URL, host:port, or bare port
    #[arg(short, long, default_value = DEFAULT_TARGET, env = "BUILDOVER_TARGET")]
    target: String,

    /// Repository root and agent working directory (defaults to the current directory)
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Widget bundle to serve at /buildover/widget.js
    #[arg(long)]
    widget_path: Option<PathBuf>,

    /// API key exported to the agent
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Agent binary (defaults to ~/.claude/local/claude, then claude on PATH)
    #[arg(long)]
    agent_path: Option<String>,

    /// Run the agent through a login shell, e.g. "/bin/zsh -l -c"
    #[arg(long)]
    agent_shell: Option<String>,

    /// Model passed to the agent
    #[arg(long)]
    model: Option<String>,

    /// Directory for per-session agent transcripts
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Prefix for session branch names
    #[arg(long)]
    branch_namespace: Option<String>,

    /// Branch that merges land on
    #[arg(long, default_value = DEFAULT_PRIMARY_BRANCH)]
    primary_branch: String,
}

impl Cli {
    fn into_config(self) -> std::io::Result<ServerConfig> {
        let project_root = match self.project_root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };

        let mut config = ServerConfig::new(&project_root, &self.target);
        config.host = self.host;
        config.port = self.port;
        config.widget_path = self
            .widget_path
            .unwrap_or_else(|| default_widget_path(&project_root));
        config.primary_branch = self.primary_branch;
        if let Some(namespace) = self.branch_namespace {
            config.branch_namespace = namespace;
        }

        config.agent.api_key = self.api_key;
        config.agent.shell_prefix = self.agent_shell;
        config.agent.model = self.model;
        config.agent.log_dir = self.log_dir;
        if let Some(path) = self.agent_path {
            config.agent.binary_path = path;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to resolve project root: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !buildover_core::git::is_git_repo(&config.project_root) {
        log::warn!(
            "{} is not a git repository; session branches will fail",
            config.project_root.display()
        );
    }

    let mut handle = match buildover_http::start(config).await {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
    }

    log::info!("Shutting down");
    handle.stop().await;
    ExitCode::SUCCESS
}
