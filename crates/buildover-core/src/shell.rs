//! Command building for the agent subprocess.
//!
//! The agent runs either directly or wrapped in a login shell
//! (`<shell> -l -c '<agent> <args…>'`) so that a version-manager PATH from
//! the user's profile applies. Wrapping is opt-in through a shell prefix.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Shells whose `-c` syntax is not POSIX; a login shell falls back to bash.
const NON_POSIX_SHELLS: &[&str] = &["fish", "nu", "nushell", "elvish", "xonsh", "ion"];

/// How an agent process ended.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AgentExit {
    pub code: i32,
    pub signal: Option<i32>,
}

impl AgentExit {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code().unwrap_or(-1),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

/// PATH with the agent's own directory in front, for agents that shell out
/// to a sibling interpreter. `None` for bare command names.
pub fn agent_path_env(binary_path: &str) -> Option<OsString> {
    let dir = Path::new(binary_path).parent()?;
    if dir.as_os_str().is_empty() {
        return None;
    }

    let mut dirs: Vec<PathBuf> = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(dirs).ok()
}

/// Command for `binary_path args…`, run from `working_dir`.
///
/// With a shell prefix the whole invocation is quoted into one string and
/// handed to that shell.
pub fn build_command(
    binary_path: &str,
    args: &[String],
    working_dir: Option<&Path>,
    shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let mut cmd = match shell_prefix {
        Some(prefix) if cfg!(unix) => login_shell_command(prefix, binary_path, args)?,
        _ => {
            let mut cmd = Command::new(binary_path);
            cmd.args(args);
            cmd
        }
    };

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    if let Some(path) = agent_path_env(binary_path) {
        cmd.env("PATH", path);
    }
    Ok(cmd)
}

fn login_shell_command(prefix: &str, binary_path: &str, args: &[String]) -> Result<Command, String> {
    let prefix = if prefix.trim().is_empty() {
        default_login_prefix()
    } else {
        prefix.to_string()
    };

    let mut words = prefix.split_whitespace();
    let shell = words.next().ok_or("Empty shell prefix")?;

    let mut cmd = Command::new(shell);
    cmd.args(words).arg(quote_invocation(binary_path, args)?);
    Ok(cmd)
}

/// `binary args…` as a single shell-safe string.
fn quote_invocation(binary_path: &str, args: &[String]) -> Result<String, String> {
    std::iter::once(binary_path)
        .chain(args.iter().map(String::as_str))
        .map(|word| {
            shlex::try_quote(word)
                .map(|quoted| quoted.into_owned())
                .map_err(|_| format!("Cannot quote {word:?} for the shell"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|words| words.join(" "))
}

/// `$SHELL -l -c`, swapping a non-POSIX shell for bash (or sh).
fn default_login_prefix() -> String {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let name = Path::new(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let shell = if !NON_POSIX_SHELLS.contains(&name) {
        shell
    } else if Path::new("/bin/bash").exists() {
        "/bin/bash".to_string()
    } else {
        "/bin/sh".to_string()
    };
    format!("{shell} -l -c")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn exit_status_flags() {
        let crashed = AgentExit {
            code: 1,
            signal: Some(9),
        };
        assert!(!crashed.success());
        assert_eq!(
            serde_json::to_value(&crashed).unwrap(),
            serde_json::json!({"code": 1, "signal": 9})
        );
        assert!(AgentExit { code: 0, signal: None }.success());
    }

    #[test]
    fn direct_command_without_prefix() {
        let cmd = build_command(
            "/usr/local/bin/claude",
            &["-p".to_string(), "hi there".to_string()],
            Some(Path::new("/tmp")),
            None,
        )
        .unwrap();

        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "/usr/local/bin/claude");
        assert_eq!(args_of(&cmd), vec!["-p", "hi there"]);
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/tmp")));
    }

    #[test]
    fn agent_dir_leads_path() {
        let path = agent_path_env("/opt/agent/bin/claude").unwrap();
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, PathBuf::from("/opt/agent/bin"));

        assert!(agent_path_env("claude").is_none());
    }

    #[test]
    #[cfg(unix)]
    fn login_shell_quotes_the_invocation() {
        let cmd = build_command(
            "/path/with spaces/claude",
            &["-p".to_string(), "it's done".to_string()],
            None,
            Some("/bin/bash -c"),
        )
        .unwrap();

        assert_eq!(cmd.as_std().get_program(), "/bin/bash");
        let args = args_of(&cmd);
        assert_eq!(args[0], "-c");
        assert_eq!(
            shlex::split(&args[1]).unwrap(),
            vec!["/path/with spaces/claude", "-p", "it's done"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn blank_prefix_uses_login_shell() {
        let cmd = build_command("claude", &[], None, Some("  ")).unwrap();
        let args = args_of(&cmd);
        assert_eq!(&args[..2], &["-l", "-c"]);
        assert_eq!(args[2], "claude");
        assert!(default_login_prefix().ends_with(" -l -c"));
    }
}
