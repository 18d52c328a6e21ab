//! Session and branch lifecycle.

mod manager;
mod state;
mod store;

pub use manager::{SessionError, SessionManager, DEFAULT_BRANCH_NAMESPACE};
pub use state::{branch_name, slugify, Session, SessionId, SessionStatus, MAX_SLUG_LEN};
pub use store::SessionStore;
