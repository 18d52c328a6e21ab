//! Per-session state.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Longest slug kept in a branch name.
pub const MAX_SLUG_LEN: usize = 50;

/// Runs of characters that are not allowed in a slug
static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Unique identifier for a session: 8 random bytes as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        let bytes: [u8; 8] = rand::random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle status. `Paused` has no transition leading to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
}

/// One assistant-driven editing conversation and its branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub branch_name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(id: SessionId, branch_name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            branch_name,
            created_at: now,
            last_activity: now,
            status: SessionStatus::Active,
        }
    }
}

/// Branch-safe form of a free-text description.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single `-`, trims leading and trailing `-`, then keeps at most
/// [`MAX_SLUG_LEN`] characters. An empty result becomes `session`.
pub fn slugify(description: &str) -> String {
    let lowered = description.to_lowercase();
    let collapsed = NON_ALNUM.replace_all(&lowered, "-");
    // Only ASCII remains, so byte and char lengths agree
    let slug: String = collapsed.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();

    if slug.is_empty() {
        "session".to_string()
    } else {
        slug
    }
}

/// `<namespace>/<id>/<slug>`
pub fn branch_name(namespace: &str, id: &SessionId, slug: &str) -> String {
    format!("{}/{}/{}", namespace, id, slug)
}
