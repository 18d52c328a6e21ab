//! Claude agent spawn configuration.

use crate::spawn::SpawnConfig;
use std::path::PathBuf;

/// Tools the agent may use without asking.
pub const DEFAULT_ALLOWED_TOOLS: &str = "Read,Edit,Write,Glob,Grep";

/// Configuration options for one Claude invocation.
#[derive(Debug, Clone, Default)]
pub struct ClaudeConfig {
    pub binary_path: String,
    /// Arguments placed before the generated ones (e.g. a script run by an interpreter)
    pub binary_args: Vec<String>,
    pub working_dir: PathBuf,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub allowed_tools: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub shell_prefix: Option<String>,
}

impl ClaudeConfig {
    /// Build a SpawnConfig for the Claude CLI in print mode.
    pub fn build(self) -> SpawnConfig {
        let tools = self
            .allowed_tools
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_TOOLS.to_string());

        let mut args = self.binary_args;
        args.extend([
            "-p".to_string(),
            self.prompt,
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--allowedTools".to_string(),
            tools,
        ]);

        if let Some(system_prompt) = self.system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(system_prompt);
        }

        if let Some(ref model) = self.model {
            if !model.is_empty() {
                args.push("--model".to_string());
                args.push(model.clone());
            }
        }

        let mut config = SpawnConfig::new(self.binary_path, args).working_dir(self.working_dir);

        if let Some(key) = self.api_key {
            config = config.env("ANTHROPIC_API_KEY", key);
        }

        if let Some(ref shell) = self.shell_prefix {
            config = config.shell_prefix(shell);
        }

        config
    }
}
