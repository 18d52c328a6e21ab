//! Agent process spawning and I/O management.
//!
//! One [`AgentProcess`] runs one agent turn. Output is delivered over a
//! channel as [`ProcessEvent`]s:
//!
//! - stdout as raw byte chunks, exactly as read (line framing is the
//!   parser's job, see [`crate::agents::claude::ClaudeParser`])
//! - stderr as lines
//! - a single `Exit` once the process has terminated and stdout has been
//!   drained
//!
//! Agent-specific spawn configurations live with the agent, see
//! [`crate::agents::claude::ClaudeConfig`].

use crate::shell::{build_command, AgentExit};
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

const READ_CHUNK: usize = 8 * 1024;

/// Events emitted by an agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of stdout bytes, with arbitrary boundaries
    Stdout(Vec<u8>),
    /// A line read from stderr
    Stderr(String),
    /// The process exited. Always the last event.
    Exit(AgentExit),
}

/// Error type for spawning agent processes.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture {0}")]
    MissingPipe(&'static str),
}

/// Configuration for spawning an agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Path to the agent binary
    pub binary_path: String,
    /// Arguments to pass to the binary
    pub args: Vec<String>,
    /// Working directory for the process
    pub working_dir: Option<PathBuf>,
    /// Login shell prefix (e.g., "/bin/zsh -l -c"); `None` executes directly
    pub shell_prefix: Option<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl SpawnConfig {
    pub fn new(binary_path: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            args,
            working_dir: None,
            shell_prefix: None,
            env: Vec::new(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Handle to a running agent process.
///
/// Dropping the handle does not stop the process; call [`AgentProcess::kill`].
#[derive(Debug)]
pub struct AgentProcess {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl AgentProcess {
    /// Spawn a process and start the background reader and exit monitor tasks.
    ///
    /// Must be called from within a tokio runtime. stdin is closed.
    pub fn spawn(
        config: SpawnConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProcessEvent>), SpawnError> {
        let mut cmd = build_command(
            &config.binary_path,
            &config.args,
            config.working_dir.as_deref(),
            config.shell_prefix.as_deref(),
        )
        .map_err(SpawnError::InvalidCommand)?;

        cmd.envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            binary: config.binary_path.clone(),
            source,
        })?;

        let mut stdout = child.stdout.take().ok_or(SpawnError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SpawnError::MissingPipe("stderr"))?;
        let pid = child.id();

        let (tx, rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let tx_stdout = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx_stdout.send(ProcessEvent::Stdout(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Agent stdout read failed: {}", e);
                        break;
                    }
                }
            }
        });

        let tx_stderr = tx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx_stderr.send(ProcessEvent::Stderr(line)).is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => {
                    // Drain output before reporting the exit
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    status
                }
                Ok(()) = kill_rx => {
                    let _ = child.start_kill();
                    // Orphaned grandchildren may hold the pipes open
                    stdout_task.abort();
                    stderr_task.abort();
                    child.wait().await
                }
            };

            let exit = match status {
                Ok(status) => AgentExit::from_status(status),
                Err(e) => {
                    log::warn!("Failed to wait for agent process: {}", e);
                    AgentExit {
                        code: -1,
                        signal: None,
                    }
                }
            };
            let _ = tx.send(ProcessEvent::Exit(exit));
        });

        Ok((
            Self {
                pid,
                kill_tx: Some(kill_tx),
            },
            rx,
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the exit monitor is still waiting on the process.
    pub fn is_running(&self) -> bool {
        self.kill_tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Force kill the process. No-op if it already exited.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
