//! Claude stream parser.
//!
//! # How This Parser Works
//!
//! Claude outputs JSON objects, one per line. This parser:
//! 1. Buffers incoming bytes (which may arrive in chunks, not complete lines)
//! 2. Splits on newlines to get complete JSON lines
//! 3. Deserializes each line into a [`ClaudeStreamEvent`]
//! 4. Translates that into [`AgentOutput`]s via [`translate_event`]
//!
//! `translate_event` is a pure function so the normalization rules can be
//! tested without a process.
//!
//! # Rust Concept: Bytes vs Strings
//!
//! The buffer holds raw bytes rather than a `String`: a chunk boundary may
//! fall inside a multi-byte UTF-8 character. Once a full line has been cut
//! at `b'\n'` it is always whole, so decoding happens per line.

use crate::agents::event::{AgentOutput, AgentResponse, FileChange, FileChangeKind};

use super::types::{ClaudeStreamEvent, ContentBlock};

/// Parser state for one agent turn.
#[derive(Debug, Default)]
pub struct ClaudeParser {
    /// Session ID reported by the agent, if any
    session_id: Option<String>,

    /// Bytes after the last newline seen so far
    buffer: Vec<u8>,

    /// Whether a "result" event has been parsed
    saw_result: bool,
}

impl ClaudeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// The agent's own session ID, if it reported one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the stream contained a "result" event.
    pub fn saw_result(&self) -> bool {
        self.saw_result
    }

    /// Feed a chunk of stdout and collect the outputs of every completed line.
    ///
    /// The final fragment (no trailing newline yet) stays buffered until the
    /// next call or [`ClaudeParser::flush`].
    pub fn feed(&mut self, data: &[u8]) -> Vec<AgentOutput> {
        let mut outputs = Vec::new();

        self.buffer.extend_from_slice(data);

        // Take ownership so we can split the buffer while refilling it
        let buffer = std::mem::take(&mut self.buffer);
        let mut lines: Vec<&[u8]> = buffer.split(|b| *b == b'\n').collect();

        if let Some(incomplete) = lines.pop() {
            self.buffer = incomplete.to_vec();
        }

        for line in lines {
            outputs.extend(self.parse_line(line));
        }

        outputs
    }

    /// Process any remaining buffered content.
    ///
    /// Call this when the stream ends; the last line may lack a newline.
    pub fn flush(&mut self) -> Vec<AgentOutput> {
        let remaining = std::mem::take(&mut self.buffer);
        self.parse_line(&remaining)
    }

    fn parse_line(&mut self, line: &[u8]) -> Vec<AgentOutput> {
        let line = String::from_utf8_lossy(line);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let event: ClaudeStreamEvent = match serde_json::from_str(trimmed) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Dropping unparseable agent line ({}): {}", e, trimmed);
                return Vec::new();
            }
        };

        if self.session_id.is_none() {
            self.session_id = event.session_id.clone();
        }
        if event.event_type == "result" {
            self.saw_result = true;
        }

        translate_event(&event)
    }
}

/// Translate one Claude stream event into zero or more outputs.
///
/// - `assistant`: each non-empty `text` block (whitespace counts) becomes
///   `Text`; each `tool_use` block becomes `ToolUse`, followed by a
///   `FileChange` for Edit (modified) and Write (added)
/// - `result` with `is_error`: `Error` carrying the result text
/// - everything else: nothing
///
/// `Complete` is never produced here; it comes from process exit.
pub fn translate_event(event: &ClaudeStreamEvent) -> Vec<AgentOutput> {
    match event.event_type.as_str() {
        "assistant" => {
            let Some(ref message) = event.message else {
                return Vec::new();
            };

            let mut outputs = Vec::new();
            for block in &message.content {
                match block.block_type.as_str() {
                    "text" => {
                        if let Some(ref text) = block.text {
                            if !text.is_empty() {
                                outputs.push(AgentOutput::text(text.clone()));
                            }
                        }
                    }
                    "tool_use" => outputs.extend(translate_tool_use(block)),
                    _ => {}
                }
            }
            outputs
        }

        "result" if event.is_error => {
            let content = event
                .result
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "Agent reported an error".to_string());
            vec![AgentOutput::error(content)]
        }

        _ => Vec::new(),
    }
}

fn translate_tool_use(block: &ContentBlock) -> Vec<AgentOutput> {
    let name = block.name.clone().unwrap_or_else(|| "Unknown".to_string());
    let input = match block.input {
        Some(serde_json::Value::Object(ref map)) => map.clone(),
        _ => serde_json::Map::new(),
    };

    let change = file_change_for(&name, &input);

    let mut outputs = vec![AgentOutput::Response(AgentResponse::ToolUse { name, input })];
    if let Some(change) = change {
        outputs.push(AgentOutput::FileChange(change));
    }
    outputs
}

/// Build the file change for a file-mutating tool, or `None` for any other tool.
///
/// Line counts are estimated from the tool input: Edit counts the lines of
/// `new_string`/`old_string`, Write counts the lines of `content`.
fn file_change_for(
    tool_name: &str,
    input: &serde_json::Map<String, serde_json::Value>,
) -> Option<FileChange> {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str()).unwrap_or("");

    let (kind, additions, deletions) = if tool_name.eq_ignore_ascii_case("edit") {
        (
            FileChangeKind::Modified,
            count_lines(field("new_string")),
            count_lines(field("old_string")),
        )
    } else if tool_name.eq_ignore_ascii_case("write") {
        (FileChangeKind::Added, count_lines(field("content")), 0)
    } else {
        return None;
    };

    let path = match field("file_path") {
        "" => "unknown",
        path => path,
    };

    Some(FileChange {
        path: path.to_string(),
        kind,
        additions,
        deletions,
        diff: None,
    })
}

fn count_lines(text: &str) -> u32 {
    if text.is_empty() {
        0
    } else {
        text.trim_end_matches('\n').split('\n').count() as u32
    }
}

// ============================================================================
// TESTS
// ============================================================================
