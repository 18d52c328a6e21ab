//! Per-session agent adapter.
//!
//! # Overview
//!
//! An [`AgentAdapter`] belongs to one session and runs at most one agent
//! process at a time. Each [`AgentAdapter::send_message`] spawns a fresh
//! process for that turn and returns a channel of [`AgentOutput`]s:
//!
//! ```text
//! Text / ToolUse / FileChange / Error ... (in stream order)
//! Complete                                 (exactly once, on process exit)
//! ```
//!
//! A message sent while a turn is still running is dropped, not queued.
//!
//! # State
//!
//! [`AdapterState`] is either `Idle` or `Running`. The running state carries
//! a generation number so a turn that was stopped (and possibly replaced by
//! a newer one) cannot reset the state of its successor when it finally
//! exits.

use super::claude::{ClaudeConfig, ClaudeParser};
use super::event::{AgentOutput, AgentResponse};
use super::prompt::{build_system_prompt, format_user_message};
use crate::logging::{log_line, open_log_file, LogHandle};
use crate::spawn::{AgentProcess, ProcessEvent};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

// ============================================================================
// SETTINGS
// ============================================================================

/// How agent processes are launched. Shared by every adapter.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub binary_path: String,
    /// Launcher arguments placed before the generated ones
    pub binary_args: Vec<String>,
    /// Project root; the agent's working directory
    pub working_dir: PathBuf,
    /// Exported to the agent as `ANTHROPIC_API_KEY`
    pub api_key: Option<String>,
    pub allowed_tools: Option<String>,
    pub model: Option<String>,
    /// Login shell prefix such as `/bin/zsh -l -c`
    pub shell_prefix: Option<String>,
    /// Directory for per-session transcripts
    pub log_dir: Option<PathBuf>,
}

impl AgentSettings {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: resolve_agent_binary(),
            binary_args: Vec::new(),
            working_dir: working_dir.into(),
            api_key: None,
            allowed_tools: None,
            model: None,
            shell_prefix: None,
            log_dir: None,
        }
    }

    fn claude_config(&self, prompt: String) -> ClaudeConfig {
        ClaudeConfig {
            binary_path: self.binary_path.clone(),
            binary_args: self.binary_args.clone(),
            working_dir: self.working_dir.clone(),
            prompt,
            system_prompt: Some(build_system_prompt(&self.working_dir)),
            allowed_tools: self.allowed_tools.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            shell_prefix: self.shell_prefix.clone(),
        }
    }
}

/// `~/.claude/local/claude` when installed there, otherwise `claude` from PATH.
pub fn resolve_agent_binary() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let local = Path::new(&home).join(".claude").join("local").join("claude");
        if local.exists() {
            return local.to_string_lossy().into_owned();
        }
    }
    "claude".to_string()
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Whether a process is running for this adapter.
#[derive(Debug)]
pub enum AdapterState {
    Idle,
    Running {
        generation: u64,
        process: AgentProcess,
    },
}

/// Drives the agent process for one session.
pub struct AgentAdapter {
    session_id: String,
    settings: Arc<AgentSettings>,
    state: Arc<Mutex<AdapterState>>,
    next_generation: AtomicU64,
    turns_started: AtomicUsize,
}

impl AgentAdapter {
    pub fn new(session_id: impl Into<String>, settings: Arc<AgentSettings>) -> Self {
        Self {
            session_id: session_id.into(),
            settings,
            state: Arc::new(Mutex::new(AdapterState::Idle)),
            next_generation: AtomicU64::new(0),
            turns_started: AtomicUsize::new(0),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_running(&self) -> bool {
        matches!(*lock(&self.state), AdapterState::Running { .. })
    }

    /// Number of processes this adapter has spawned.
    pub fn turns_started(&self) -> usize {
        self.turns_started.load(Ordering::SeqCst)
    }

    /// Start a turn for `message`.
    ///
    /// Returns `None` (and logs) when a turn is already running. If the
    /// process cannot be spawned the returned channel yields a single
    /// `Error` and then closes. Must be called within a tokio runtime.
    pub fn send_message(&self, message: &str) -> Option<mpsc::UnboundedReceiver<AgentOutput>> {
        let mut state = lock(&self.state);
        if matches!(*state, AdapterState::Running { .. }) {
            log::warn!(
                "Agent for session {} is already processing a message",
                self.session_id
            );
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let prompt = format_user_message(message);
        let transcript = open_log_file(self.settings.log_dir.as_deref(), &self.session_id);
        log_line(&transcript, "STDIN", &prompt);

        let spawn_config = self.settings.claude_config(prompt).build();
        log::info!(
            "Starting agent for session {} ({})",
            self.session_id,
            spawn_config.binary_path
        );

        let (process, events) = match AgentProcess::spawn(spawn_config) {
            Ok(spawned) => spawned,
            Err(e) => {
                log::error!("Failed to start agent for session {}: {}", self.session_id, e);
                log_line(&transcript, "ERROR", &e.to_string());
                let _ = tx.send(AgentOutput::error(e.to_string()));
                return Some(rx);
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        *state = AdapterState::Running {
            generation,
            process,
        };
        self.turns_started.fetch_add(1, Ordering::SeqCst);
        drop(state);

        tokio::spawn(relay_turn(
            self.session_id.clone(),
            Arc::clone(&self.state),
            generation,
            events,
            tx,
            transcript,
        ));

        Some(rx)
    }

    /// Kill the running process, if any, and return to idle.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *lock(&self.state), AdapterState::Idle);
        if let AdapterState::Running { mut process, .. } = previous {
            log::info!("Stopping agent for session {}", self.session_id);
            process.kill();
        }
    }
}

impl std::fmt::Debug for AgentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentAdapter")
            .field("session_id", &self.session_id)
            .field("running", &self.is_running())
            .finish()
    }
}

fn lock(state: &Mutex<AdapterState>) -> MutexGuard<'_, AdapterState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parse process events into outputs until the process exits.
async fn relay_turn(
    session_id: String,
    state: Arc<Mutex<AdapterState>>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    tx: mpsc::UnboundedSender<AgentOutput>,
    transcript: LogHandle,
) {
    let mut parser = ClaudeParser::new();
    let mut last_stderr: Option<String> = None;
    let mut exit = None;

    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Stdout(chunk) => {
                log_line(&transcript, "STDOUT", String::from_utf8_lossy(&chunk).trim_end());
                for output in parser.feed(&chunk) {
                    let _ = tx.send(output);
                }
            }
            ProcessEvent::Stderr(line) => {
                log::debug!("[agent {}] {}", session_id, line);
                log_line(&transcript, "STDERR", &line);
                if !line.trim().is_empty() {
                    last_stderr = Some(line);
                }
            }
            ProcessEvent::Exit(status) => {
                exit = Some(status);
                break;
            }
        }
    }

    for output in parser.flush() {
        let _ = tx.send(output);
    }

    // Only this turn's own state is reset; a stopped turn reports nothing extra
    let still_current = {
        let mut state = lock(&state);
        let current = matches!(
            *state,
            AdapterState::Running { generation: g, .. } if g == generation
        );
        if current {
            *state = AdapterState::Idle;
        }
        current
    };

    if let Some(exit) = exit {
        log_line(&transcript, "EXIT", &exit.code.to_string());
        log::info!("Agent for session {} exited with code {}", session_id, exit.code);

        if still_current && !exit.success() && !parser.saw_result() {
            let message = match last_stderr {
                Some(detail) => format!("Agent exited with code {}: {}", exit.code, detail),
                None => format!("Agent exited with code {}", exit.code),
            };
            let _ = tx.send(AgentOutput::error(message));
        }
    }

    let _ = tx.send(AgentResponse::Complete.into());
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::event::FileChangeKind;
    use tempfile::{tempdir, TempDir};

    /// Settings that run `script` through `sh`; the script sees the generated
    /// arguments as `$1...`.
    fn fake_agent(script: &str) -> (TempDir, Arc<AgentSettings>) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.sh");
        std::fs::write(&path, script).unwrap();

        let mut settings = AgentSettings::new(dir.path());
        settings.binary_path = "sh".to_string();
        settings.binary_args = vec![path.to_string_lossy().into_owned()];
        (dir, Arc::new(settings))
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<AgentOutput>) -> Vec<AgentOutput> {
        let mut outputs = Vec::new();
        while let Some(output) = rx.recv().await {
            outputs.push(output);
        }
        outputs
    }

    const SUCCESS_SCRIPT: &str = r#"cat <<'JSON'
{"type":"system","subtype":"init","session_id":"s"}
{"type":"assistant","message":{"content":[{"type":"text","text":"A"}]}}
{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Edit","input":{"file_path":"f.txt","old_string":"a","new_string":"b"}}]}}
JSON
printf '%s' '{"type":"result","is_error":false,"result":"ok"}'
"#;

    #[test]
    fn settings_default_to_claude_binary() {
        let settings = AgentSettings::new("/tmp/site");
        assert!(settings.binary_path.ends_with("claude"));
        let config = settings.claude_config("hello".to_string());
        assert_eq!(config.prompt, "hello");
        assert!(config.system_prompt.unwrap().contains("/tmp/site"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn successful_turn_streams_in_order_then_completes() {
        let (_dir, settings) = fake_agent(SUCCESS_SCRIPT);
        let adapter = AgentAdapter::new("s1", settings);

        let outputs = collect(adapter.send_message("  edit f  ").unwrap()).await;

        assert_eq!(outputs.len(), 4, "{outputs:?}");
        assert_eq!(outputs[0], AgentOutput::text("A"));
        assert!(matches!(
            &outputs[1],
            AgentOutput::Response(AgentResponse::ToolUse { name, .. }) if name == "Edit"
        ));
        assert!(matches!(
            &outputs[2],
            AgentOutput::FileChange(change) if change.path == "f.txt" && change.kind == FileChangeKind::Modified
        ));
        assert!(outputs[3].is_complete());
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn prompt_is_passed_trimmed() {
        let (_dir, settings) = fake_agent(
            r#"printf '{"type":"assistant","message":{"content":[{"type":"text","text":"%s"}]}}\n' "$2""#,
        );
        let adapter = AgentAdapter::new("s1", settings);

        let outputs = collect(adapter.send_message("  make it blue \n").unwrap()).await;
        assert_eq!(outputs[0], AgentOutput::text("make it blue"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn error_result_then_complete() {
        let (_dir, settings) = fake_agent(
            r#"echo '{"type":"result","is_error":true,"result":"boom"}'; exit 1"#,
        );
        let adapter = AgentAdapter::new("s1", settings);

        let outputs = collect(adapter.send_message("x").unwrap()).await;
        // A result was seen, so the non-zero exit adds nothing
        assert_eq!(
            outputs,
            vec![
                AgentOutput::error("boom"),
                AgentResponse::Complete.into()
            ]
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn crash_without_result_reports_exit_code() {
        let (_dir, settings) = fake_agent("echo 'bad thing' >&2; exit 2");
        let adapter = AgentAdapter::new("s1", settings);

        let outputs = collect(adapter.send_message("x").unwrap()).await;
        assert_eq!(
            outputs,
            vec![
                AgentOutput::error("Agent exited with code 2: bad thing"),
                AgentResponse::Complete.into()
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_yields_only_error() {
        let mut settings = AgentSettings::new(std::env::temp_dir());
        settings.binary_path = "/nonexistent/buildover-agent".to_string();
        let adapter = AgentAdapter::new("s1", Arc::new(settings));

        let outputs = collect(adapter.send_message("x").unwrap()).await;
        assert_eq!(outputs.len(), 1);
        assert!(matches!(&outputs[0], AgentOutput::Response(AgentResponse::Error { .. })));
        assert!(!adapter.is_running());
        assert_eq!(adapter.turns_started(), 0);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn busy_adapter_drops_message() {
        let (_dir, settings) = fake_agent("sleep 30");
        let adapter = AgentAdapter::new("s1", settings);

        let rx = adapter.send_message("first").unwrap();
        assert!(adapter.is_running());
        assert!(adapter.send_message("second").is_none());
        assert_eq!(adapter.turns_started(), 1);

        adapter.stop();
        assert!(!adapter.is_running());

        // A stopped turn still completes, without an exit error
        let outputs = collect(rx).await;
        assert_eq!(outputs, vec![AgentResponse::Complete.into()]);
    }

    #[tokio::test]
    async fn stop_when_idle_is_noop() {
        let adapter = AgentAdapter::new("s1", Arc::new(AgentSettings::new("/tmp")));
        adapter.stop();
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn sequential_turns_reuse_adapter() {
        let (_dir, settings) = fake_agent(SUCCESS_SCRIPT);
        let adapter = AgentAdapter::new("s1", settings);

        collect(adapter.send_message("one").unwrap()).await;
        collect(adapter.send_message("two").unwrap()).await;

        assert_eq!(adapter.turns_started(), 2);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn transcript_is_written() {
        let (dir, settings) = fake_agent(SUCCESS_SCRIPT);
        let mut settings = (*settings).clone();
        settings.log_dir = Some(dir.path().join("logs"));
        let adapter = AgentAdapter::new("abc", Arc::new(settings));

        collect(adapter.send_message("hello").unwrap()).await;

        let log = std::fs::read_to_string(dir.path().join("logs").join("abc.log")).unwrap();
        assert!(log.contains("STDIN: hello"));
        assert!(log.contains("STDOUT: "));
        assert!(log.contains("EXIT: 0"));
    }
}
