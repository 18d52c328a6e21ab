//! Claude protocol parser and spawn configuration.
//!
//! Parses Claude's stream-json output format and converts it to
//! [`AgentOutput`](crate::agents::AgentOutput)s.

mod parser;
pub mod spawn;
mod types;

pub use parser::{translate_event, ClaudeParser};
pub use spawn::{ClaudeConfig, DEFAULT_ALLOWED_TOOLS};
pub use types::*;
