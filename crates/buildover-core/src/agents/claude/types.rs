//! Claude-specific JSON types for stream parsing.
//!
//! With `--output-format stream-json` the agent prints one JSON object per
//! line:
//!
//! ```json
//! {"type":"system","subtype":"init","session_id":"sess-123"}
//! {"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Looking at the header."}]}}
//! {"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu_1","name":"Edit","input":{"file_path":"src/Header.tsx","old_string":"red","new_string":"blue"}}]}}
//! {"type":"result","subtype":"success","is_error":false,"result":"Changed the header to blue."}
//! ```
//!
//! # Rust Concept: Optional Fields
//!
//! Different event types populate different fields, so everything beyond
//! `type` is an `Option` with `#[serde(default)]`. A missing key becomes
//! `None` instead of a parse failure.

use serde::Deserialize;

/// A Claude stream event (one line of output).
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeStreamEvent {
    /// The event type ("system", "assistant", "user", "result", ...)
    ///
    /// `type` is a Rust keyword, hence the rename.
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,

    /// Assistant message with content blocks.
    #[serde(default)]
    pub message: Option<AssistantMessage>,

    /// Final text of a "result" event.
    #[serde(default)]
    pub result: Option<String>,

    /// Set on a "result" event when the turn failed.
    #[serde(default)]
    pub is_error: bool,
}

/// Assistant message with content blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A content block in a message.
///
/// - `text`: only `text` is set
/// - `tool_use`: `id`, `name` and `input` are set
/// - anything else (e.g. `thinking`) is ignored
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub id: Option<String>,

    /// Tool name, e.g. "Read", "Edit", "Write", "Glob", "Grep"
    #[serde(default)]
    pub name: Option<String>,

    /// Tool input. The structure varies by tool:
    /// - Read: `{"file_path": "..."}`
    /// - Edit: `{"file_path": "...", "old_string": "...", "new_string": "..."}`
    /// - Write: `{"file_path": "...", "content": "..."}`
    /// - Glob/Grep: `{"pattern": "..."}`
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assistant_event() {
        let json = r#"{"type":"assistant","session_id":"s1","message":{"role":"assistant","content":[{"type":"text","text":"Hello"}]}}"#;
        let event: ClaudeStreamEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, "assistant");
        assert_eq!(event.session_id.as_deref(), Some("s1"));
        let message = event.message.unwrap();
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.content[0].block_type, "text");
        assert_eq!(message.content[0].text.as_deref(), Some("Hello"));
        assert!(!event.is_error);
    }

    #[test]
    fn parse_tool_use_block() {
        let json = r#"{"type":"tool_use","id":"tu_1","name":"Write","input":{"file_path":"a.txt","content":"x"}}"#;
        let block: ContentBlock = serde_json::from_str(json).unwrap();

        assert_eq!(block.name.as_deref(), Some("Write"));
        assert_eq!(block.input.unwrap()["file_path"], "a.txt");
    }

    #[test]
    fn parse_error_result() {
        let json = r#"{"type":"result","subtype":"error_during_execution","is_error":true,"result":"boom"}"#;
        let event: ClaudeStreamEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, "result");
        assert!(event.is_error);
        assert_eq!(event.result.as_deref(), Some("boom"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"type":"system","subtype":"init","tools":["Read"],"model":"x"}"#;
        let event: ClaudeStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.subtype.as_deref(), Some("init"));
        assert!(event.message.is_none());
    }
}
