use serde::{Deserialize, Serialize};

/// Unique identifier for a connection, stable for the connection's lifetime.
pub type PlayerId = u64;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// A participant joined to a Crossplay room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    /// Identity provider the player signed in with, if any.
    pub provider: Option<String>,
    pub round_score: u32,
    pub total_score: u32,
    /// Unix seconds at join time.
    pub joined_at: u64,
}

impl Player {
    pub fn new(id: PlayerId, display_name: String, provider: Option<String>) -> Self {
        Self {
            id,
            display_name,
            provider,
            round_score: 0,
            total_score: 0,
            joined_at: crate::time::unix_now(),
        }
    }

    /// Case-insensitive display name comparison.
    pub fn has_name(&self, name: &str) -> bool {
        self.display_name.to_lowercase() == name.to_lowercase()
    }
}

/// Trim and validate a display name. Returns `None` if it is empty, too long,
/// or contains control characters.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN || name.chars().any(char::is_control)
    {
        return None;
    }
    Some(name.to_string())
}
