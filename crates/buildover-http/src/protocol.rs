//! Control-channel wire protocol.
//!
//! # Client → server
//!
//! ```json
//! {"type":"init","sessionId":"0123456789abcdef"}
//! {"type":"chat","content":"Make the header blue","createBranch":true}
//! ```
//!
//! # Server → client, one turn
//!
//! ```text
//! status(analyzing) ─► stream* ─► status(editing) ─► file.changed* ─► ... ─┬─► stream.end ─► status(done)
//!                                                                         └─► error
//! ```
//!
//! [`TurnRelay`] turns adapter output into these messages and enforces the
//! single terminal event.

use buildover_core::{AgentOutput, AgentResponse, FileChange};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ANALYZING_MESSAGE: &str = "AI is analyzing your request...";
pub const DONE_MESSAGE: &str = "Done";

/// Messages sent by the widget.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Init {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Chat {
        content: String,
        #[serde(default, rename = "createBranch")]
        create_branch: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Analyzing,
    Editing,
    Done,
}

/// Messages sent to the widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "stream")]
    Stream {
        content: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },
    #[serde(rename = "stream.end")]
    StreamEnd {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    #[serde(rename = "file.changed")]
    FileChanged {
        path: String,
        additions: u32,
        deletions: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
    },
    #[serde(rename = "status")]
    Status {
        status: TurnStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn status(status: TurnStatus, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn analyzing() -> Self {
        Self::status(TurnStatus::Analyzing, ANALYZING_MESSAGE)
    }

    /// True for the events that close a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Error { .. }
                | Self::Status {
                    status: TurnStatus::Done,
                    ..
                }
        )
    }
}

impl From<FileChange> for ServerMessage {
    fn from(change: FileChange) -> Self {
        Self::FileChanged {
            path: change.path,
            additions: change.additions,
            deletions: change.deletions,
            diff: change.diff,
        }
    }
}

/// Id for a new turn's stream: `msg-<unix millis>`.
pub fn new_message_id() -> String {
    format!("msg-{}", chrono::Utc::now().timestamp_millis())
}

/// Human-readable progress line for a tool call.
pub fn describe_tool(name: &str, input: &Map<String, Value>) -> String {
    let file_name = string_field(input, "file_path").map(|p| p.rsplit('/').next().unwrap_or(p));
    let pattern = string_field(input, "pattern").unwrap_or("");

    match name.to_ascii_lowercase().as_str() {
        "read" => file_name.map(|f| format!("Reading {f}")),
        "edit" => file_name.map(|f| format!("Editing {f}")),
        "write" => file_name.map(|f| format!("Creating {f}")),
        "glob" => Some(format!("Searching files: {pattern}")),
        "grep" => Some(format!("Searching for: {pattern}")),
        _ => None,
    }
    .unwrap_or_else(|| format!("Using tool: {name}"))
}

fn string_field<'a>(input: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

// ============================================================================
// TURN RELAY
// ============================================================================

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Streaming,
    Finished,
}

/// Maps one turn's adapter output to wire messages.
///
/// Once a terminal event has been produced every further output is ignored,
/// so a turn ends with either `stream.end` + `done` or a single `error`.
#[derive(Debug)]
pub struct TurnRelay {
    message_id: String,
    phase: TurnPhase,
}

impl TurnRelay {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            phase: TurnPhase::Streaming,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn is_finished(&self) -> bool {
        self.phase == TurnPhase::Finished
    }

    pub fn handle(&mut self, output: AgentOutput) -> Vec<ServerMessage> {
        if self.is_finished() {
            return Vec::new();
        }

        match output {
            AgentOutput::FileChange(change) => vec![change.into()],
            AgentOutput::Response(AgentResponse::Text { content }) => vec![ServerMessage::Stream {
                content,
                message_id: self.message_id.clone(),
            }],
            AgentOutput::Response(AgentResponse::ToolUse { name, input }) => vec![
                ServerMessage::status(TurnStatus::Editing, describe_tool(&name, &input)),
            ],
            AgentOutput::Response(AgentResponse::Error { content }) => {
                self.phase = TurnPhase::Finished;
                vec![ServerMessage::error(content)]
            }
            AgentOutput::Response(AgentResponse::Complete) => {
                self.phase = TurnPhase::Finished;
                vec![
                    ServerMessage::StreamEnd {
                        message_id: self.message_id.clone(),
                    },
                    ServerMessage::status(TurnStatus::Done, DONE_MESSAGE),
                ]
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use buildover_core::agents::FileChangeKind;
    use serde_json::json;

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    mod wire {
        use super::*;

        #[test]
        fn parses_init_and_chat() {
            let init: ClientMessage =
                serde_json::from_str(r#"{"type":"init","sessionId":"abc"}"#).unwrap();
            assert_eq!(
                init,
                ClientMessage::Init {
                    session_id: "abc".to_string()
                }
            );

            let chat: ClientMessage =
                serde_json::from_str(r#"{"type":"chat","content":"hi"}"#).unwrap();
            assert_eq!(
                chat,
                ClientMessage::Chat {
                    content: "hi".to_string(),
                    create_branch: false
                }
            );

            let chat: ClientMessage =
                serde_json::from_str(r#"{"type":"chat","content":"hi","createBranch":true}"#)
                    .unwrap();
            assert!(matches!(chat, ClientMessage::Chat { create_branch: true, .. }));
        }

        #[test]
        fn rejects_unknown_and_malformed() {
            assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).is_err());
            assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"chat"}"#).is_err());
            assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
        }

        #[test]
        fn server_messages_use_wire_names() {
            let stream = ServerMessage::Stream {
                content: "A".to_string(),
                message_id: "msg-1".to_string(),
            };
            assert_eq!(
                serde_json::to_value(&stream).unwrap(),
                json!({"type": "stream", "content": "A", "messageId": "msg-1"})
            );

            let end = ServerMessage::StreamEnd {
                message_id: "msg-1".to_string(),
            };
            assert_eq!(
                serde_json::to_value(&end).unwrap(),
                json!({"type": "stream.end", "messageId": "msg-1"})
            );

            assert_eq!(
                serde_json::to_value(ServerMessage::analyzing()).unwrap(),
                json!({"type": "status", "status": "analyzing", "message": ANALYZING_MESSAGE})
            );

            let changed = ServerMessage::FileChanged {
                path: "f.txt".to_string(),
                additions: 1,
                deletions: 0,
                diff: None,
            };
            assert_eq!(
                serde_json::to_value(&changed).unwrap(),
                json!({"type": "file.changed", "path": "f.txt", "additions": 1, "deletions": 0})
            );
        }

        #[test]
        fn message_id_format() {
            let id = new_message_id();
            let millis = id.strip_prefix("msg-").unwrap();
            assert!(millis.parse::<i64>().is_ok());
        }
    }

    mod tool_description {
        use super::*;

        #[test]
        fn file_tools_show_last_segment() {
            let file = input(json!({"file_path": "/repo/src/components/Header.tsx"}));
            assert_eq!(describe_tool("Read", &file), "Reading Header.tsx");
            assert_eq!(describe_tool("Edit", &file), "Editing Header.tsx");
            assert_eq!(describe_tool("Write", &file), "Creating Header.tsx");
        }

        #[test]
        fn search_tools_show_pattern() {
            let pattern = input(json!({"pattern": "**/*.css"}));
            assert_eq!(describe_tool("Glob", &pattern), "Searching files: **/*.css");
            assert_eq!(describe_tool("Grep", &pattern), "Searching for: **/*.css");
        }

        #[test]
        fn other_tools_are_named_verbatim() {
            assert_eq!(describe_tool("Bash", &Map::new()), "Using tool: Bash");
            assert_eq!(describe_tool("Read", &Map::new()), "Using tool: Read");
        }
    }

    mod relay {
        use super::*;

        #[test]
        fn successful_turn_order() {
            let mut relay = TurnRelay::new("msg-1");
            let outputs = vec![
                AgentOutput::text("A"),
                AgentResponse::ToolUse {
                    name: "Edit".to_string(),
                    input: input(json!({"file_path": "f.txt"})),
                }
                .into(),
                FileChange {
                    path: "f.txt".to_string(),
                    kind: FileChangeKind::Modified,
                    additions: 1,
                    deletions: 1,
                    diff: None,
                }
                .into(),
                AgentResponse::Complete.into(),
            ];

            let messages: Vec<ServerMessage> =
                outputs.into_iter().flat_map(|o| relay.handle(o)).collect();

            assert_eq!(
                messages,
                vec![
                    ServerMessage::Stream {
                        content: "A".to_string(),
                        message_id: "msg-1".to_string()
                    },
                    ServerMessage::status(TurnStatus::Editing, "Editing f.txt"),
                    ServerMessage::FileChanged {
                        path: "f.txt".to_string(),
                        additions: 1,
                        deletions: 1,
                        diff: None
                    },
                    ServerMessage::StreamEnd {
                        message_id: "msg-1".to_string()
                    },
                    ServerMessage::status(TurnStatus::Done, DONE_MESSAGE),
                ]
            );
            assert!(relay.is_finished());
        }

        #[test]
        fn error_suppresses_completion() {
            let mut relay = TurnRelay::new("msg-2");
            let mut messages = relay.handle(AgentOutput::text("A"));
            messages.extend(relay.handle(AgentOutput::error("boom")));
            messages.extend(relay.handle(AgentResponse::Complete.into()));

            assert_eq!(messages.len(), 2);
            assert_eq!(messages[1], ServerMessage::error("boom"));
            assert!(messages[1].is_terminal());
        }

        #[test]
        fn nothing_after_completion() {
            let mut relay = TurnRelay::new("msg-3");
            assert_eq!(relay.handle(AgentResponse::Complete.into()).len(), 2);
            assert!(relay.handle(AgentOutput::text("late")).is_empty());
            assert!(relay.handle(AgentOutput::error("late")).is_empty());
        }
    }
}
