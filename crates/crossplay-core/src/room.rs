use rand::Rng;
use serde::{Deserialize, Serialize};

/// Room codes avoid glyphs that read alike (0/O, 1/I/L).
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 5;

/// Generate a random room code. Uniqueness is checked by the registry.
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of a user-typed room code.
pub fn normalize_room_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

/// Current state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Lobby,
    Playing,
    Ended,
}

/// When a game transitions to `Ended`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndCondition {
    #[default]
    Infinite,
    /// Ends at a round boundary once this many rounds have been played.
    Rounds(u32),
    /// Ends as soon as any participant's total score reaches this value.
    Score(u32),
}

/// Identity-provider constraint fixed when the first owner is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Open,
    Provider(String),
}

impl AuthMode {
    /// Auth mode implied by an owner's provider tag.
    pub fn for_owner(provider: Option<&str>) -> Self {
        match provider {
            Some(p) => Self::Provider(p.to_string()),
            None => Self::Open,
        }
    }

    pub fn admits(&self, provider: Option<&str>) -> bool {
        match self {
            Self::Open => true,
            Self::Provider(required) => provider == Some(required.as_str()),
        }
    }
}

/// Per-room game settings, changeable by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub language: String,
    pub round_duration_secs: u32,
    pub end_condition: EndCondition,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            round_duration_secs: 120,
            end_condition: EndCondition::Infinite,
        }
    }
}

/// Partial settings change requested by the owner. `None` fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub language: Option<String>,
    pub round_duration_secs: Option<u32>,
    pub end_condition: Option<EndCondition>,
    pub max_participants: Option<u32>,
}

/// Bounds that settings changes are validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsBounds {
    pub min_round_secs: u32,
    pub max_round_secs: u32,
}

impl Default for SettingsBounds {
    fn default() -> Self {
        Self {
            min_round_secs: 30,
            max_round_secs: 600,
        }
    }
}

impl SettingsBounds {
    pub fn duration_in_range(&self, secs: u32) -> bool {
        (self.min_round_secs..=self.max_round_secs).contains(&secs)
    }
}
