//! Per-session agent transcripts.
//!
//! Every turn of a session appends to `{log_dir}/{session_id}.log`:
//!
//! ```text
//! [2026-02-04T10:15:30.123Z] STDIN: fix the header
//! [2026-02-04T10:15:31.004Z] STDOUT: {"type":"assistant",...}
//! [2026-02-04T10:15:40.517Z] EXIT: 0
//! ```
//!
//! A transcript that cannot be opened is silently disabled; it never fails
//! the turn it belongs to.

use chrono::{SecondsFormat, Utc};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

/// Thread-safe handle to an append-only log file.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// Current UTC time as RFC 3339 with milliseconds (e.g. 2026-02-04T10:15:30.123Z).
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write a timestamped line to the log file (if present).
pub fn log_line(handle: &LogHandle, direction: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "[{}] {}: {}", utc_timestamp(), direction, data);
            let _ = file.flush();
        }
    }
}

/// Open (or create) `{log_dir}/{log_id}.log` and return a shared handle.
///
/// Returns a handle holding `None` when `log_dir` is unset or unusable.
pub fn open_log_file(log_dir: Option<&Path>, log_id: &str) -> LogHandle {
    let file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", log_id)))
            .map_err(|e| log::warn!("Transcript disabled for {}: {}", log_id, e))
            .ok()
    });
    Arc::new(Mutex::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn utc_timestamp_format() {
        let ts = utc_timestamp();
        // YYYY-MM-DDTHH:MM:SS.mmmZ
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 24);
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn open_log_file_creates_nested_dir() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs").join("agents");

        let handle = open_log_file(Some(&log_dir), "abc123");
        assert!(handle.lock().unwrap().is_some());
        assert!(log_dir.join("abc123.log").exists());
    }

    #[test]
    fn open_log_file_none_dir() {
        let handle = open_log_file(None, "test");
        assert!(handle.lock().unwrap().is_none());
    }

    #[test]
    fn log_line_appends() {
        let dir = tempdir().unwrap();

        let handle = open_log_file(Some(dir.path()), "session");
        log_line(&handle, "STDIN", "hello world");
        log_line(&handle, "EXIT", "0");

        // Reopening appends rather than truncating
        let handle = open_log_file(Some(dir.path()), "session");
        log_line(&handle, "STDERR", "warning");

        let contents = std::fs::read_to_string(dir.path().join("session.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("STDIN: hello world"));
        assert!(lines[1].ends_with("EXIT: 0"));
        assert!(lines[2].ends_with("STDERR: warning"));
    }

    #[test]
    fn log_line_handles_none_file() {
        let handle: LogHandle = Arc::new(Mutex::new(None));
        log_line(&handle, "STDIN", "test");
    }
}
