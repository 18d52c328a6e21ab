//! Normalized events emitted by the agent adapter.

use serde::{Deserialize, Serialize};

/// A response produced while an agent turn runs.
///
/// Every turn that spawned a process ends with exactly one `Complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResponse {
    /// Assistant text, in the order the agent produced it.
    Text { content: String },

    /// The agent invoked a tool.
    ToolUse {
        name: String,
        input: serde_json::Map<String, serde_json::Value>,
    },

    /// The turn failed.
    Error { content: String },

    /// The agent process exited.
    Complete,
}

/// How a tool call affected a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A file touched by a file-mutating tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
    /// Estimated from the tool input, not from the working tree
    pub additions: u32,
    pub deletions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Everything an adapter emits for one turn, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    Response(AgentResponse),
    FileChange(FileChange),
}

impl AgentOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Response(AgentResponse::Text {
            content: content.into(),
        })
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Response(AgentResponse::Error {
            content: content.into(),
        })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Response(AgentResponse::Complete))
    }
}

impl From<AgentResponse> for AgentOutput {
    fn from(response: AgentResponse) -> Self {
        Self::Response(response)
    }
}

impl From<FileChange> for AgentOutput {
    fn from(change: FileChange) -> Self {
        Self::FileChange(change)
    }
}
