//! The external coding agent.
//!
//! - [`adapter`] - Per-session process lifecycle and output channel
//! - [`claude`] - Claude CLI arguments and stream-json parsing
//! - [`event`] - Normalized outputs shared with the control gateway
//! - [`prompt`] - System prompt and user message formatting

pub mod adapter;
pub mod claude;
pub mod event;
pub mod prompt;

pub use adapter::{AdapterState, AgentAdapter, AgentSettings};
pub use event::{AgentOutput, AgentResponse, FileChange, FileChangeKind};
