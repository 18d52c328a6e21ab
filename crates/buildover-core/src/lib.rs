//! # buildover-core
//!
//! Core logic for BuildOver, the development-time overlay that lets you chat
//! with a coding agent from inside your running app.
//!
//! This crate knows nothing about HTTP. It is used by:
//! - `buildover-http` (proxy, control routes, WebSocket gateway)
//! - `buildover-daemon` (via `buildover-http`)
//!
//! ## Key Concepts
//!
//! - **Session**: One agent-driven editing conversation, backed by its own git branch
//! - **Turn**: One chat message and the agent process that answers it
//! - **AgentOutput**: Normalized event stream produced by a turn

pub mod agents;
pub mod git;
pub mod logging;
pub mod session;
pub mod shell;
pub mod spawn;

// Re-export commonly used types
pub use agents::{AgentAdapter, AgentOutput, AgentResponse, AgentSettings, FileChange};
pub use git::{GitRepository, MergeResult, MergeStrategy, VersionControl};
pub use session::{Session, SessionId, SessionManager};
