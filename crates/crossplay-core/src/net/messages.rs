use serde::{Deserialize, Serialize};

use crate::layout::{Direction, PlacedWord};
use crate::player::{Player, PlayerId};
use crate::room::{AuthMode, RoomSettings, RoomState, SettingsUpdate};
use crate::session::{LastHit, ScoreEntry, Session};

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    CreateRoom = 0x01,
    JoinRoom = 0x02,
    GetRoomInfo = 0x03,
    LeaveRoom = 0x04,
    Control = 0x05,
    Guess = 0x06,
    UpdateSettings = 0x07,

    // Server -> Client (room)
    RoomCreated = 0x10,
    RoomJoined = 0x11,
    RoomInfo = 0x12,
    PlayerJoined = 0x13,
    PlayerLeft = 0x14,
    PlayerList = 0x15,
    Status = 0x16,
    SettingsUpdated = 0x17,

    // Server -> Client (round)
    LoadingState = 0x20,
    NewRound = 0x21,
    Tick = 0x22,
    GuessResult = 0x23,
    WordRevealed = 0x24,
    LevelComplete = 0x25,
    Ended = 0x26,

    Error = 0x30,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::CreateRoom),
            0x02 => Some(Self::JoinRoom),
            0x03 => Some(Self::GetRoomInfo),
            0x04 => Some(Self::LeaveRoom),
            0x05 => Some(Self::Control),
            0x06 => Some(Self::Guess),
            0x07 => Some(Self::UpdateSettings),
            0x10 => Some(Self::RoomCreated),
            0x11 => Some(Self::RoomJoined),
            0x12 => Some(Self::RoomInfo),
            0x13 => Some(Self::PlayerJoined),
            0x14 => Some(Self::PlayerLeft),
            0x15 => Some(Self::PlayerList),
            0x16 => Some(Self::Status),
            0x17 => Some(Self::SettingsUpdated),
            0x20 => Some(Self::LoadingState),
            0x21 => Some(Self::NewRound),
            0x22 => Some(Self::Tick),
            0x23 => Some(Self::GuessResult),
            0x24 => Some(Self::WordRevealed),
            0x25 => Some(Self::LevelComplete),
            0x26 => Some(Self::Ended),
            0x30 => Some(Self::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared views
// ---------------------------------------------------------------------------

/// A placed word as seen by clients. Letters are withheld until revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleWord {
    pub id: u32,
    pub direction: Direction,
    pub row: u32,
    pub col: u32,
    pub length: u32,
    pub text: Option<String>,
    pub revealed_by: Option<PlayerId>,
}

impl From<&PlacedWord> for PuzzleWord {
    fn from(w: &PlacedWord) -> Self {
        Self {
            id: w.id,
            direction: w.direction,
            row: w.row as u32,
            col: w.col as u32,
            length: w.letter_count() as u32,
            text: w.revealed.then(|| w.text.clone()),
            revealed_by: w.revealed_by,
        }
    }
}

pub fn puzzle_view(words: &[PlacedWord]) -> Vec<PuzzleWord> {
    words.iter().map(PuzzleWord::from).collect()
}

/// Everything a client needs to render a room, including mid-round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_code: String,
    pub status: RoomState,
    pub owner_id: Option<PlayerId>,
    pub owner_name: Option<String>,
    pub auth_mode: Option<AuthMode>,
    pub settings: RoomSettings,
    pub max_participants: u32,
    pub players: Vec<Player>,
    pub theme: Option<String>,
    pub words: Vec<PuzzleWord>,
    pub time_left: u32,
    pub round: u32,
    pub paused: bool,
    pub loading: bool,
    pub last_hit: Option<LastHit>,
}

impl From<&Session> for RoomSnapshot {
    fn from(s: &Session) -> Self {
        Self {
            room_code: s.code().to_string(),
            status: s.status(),
            owner_id: s.owner_id(),
            owner_name: s.owner_name().map(str::to_string),
            auth_mode: s.auth_mode().cloned(),
            settings: s.settings().clone(),
            max_participants: u32::try_from(s.max_participants()).unwrap_or(u32::MAX),
            players: s.players().to_vec(),
            theme: s.theme().map(str::to_string),
            words: puzzle_view(s.words()),
            time_left: s.time_left(),
            round: s.round(),
            paused: s.is_paused(),
            loading: s.is_loading(),
            last_hit: s.last_hit().cloned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Create a room. With a display name the creator joins as owner; without
/// one the creator only observes and the first joiner becomes owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomMsg {
    pub protocol_version: u8,
    pub display_name: Option<String>,
    pub provider: Option<String>,
    pub settings: SettingsUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomMsg {
    pub protocol_version: u8,
    pub room_code: String,
    pub display_name: String,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRoomInfoMsg {
    pub room_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRoomMsg {}

/// Owner-only round flow actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Reset,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMsg {
    pub action: ControlAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessMsg {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSettingsMsg {
    pub settings: SettingsUpdate,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreatedMsg {
    pub room_code: String,
    /// Set when the creator joined as owner.
    pub player_id: Option<PlayerId>,
    pub snapshot: RoomSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomJoinedMsg {
    pub player_id: PlayerId,
    pub snapshot: RoomSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfoMsg {
    pub snapshot: RoomSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerJoinedMsg {
    pub player: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeftMsg {
    pub player_id: PlayerId,
    pub new_owner: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerListMsg {
    pub players: Vec<Player>,
    pub owner_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMsg {
    pub status: RoomState,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdatedMsg {
    pub settings: RoomSettings,
    pub max_participants: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingStateMsg {
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoundMsg {
    pub theme: String,
    pub words: Vec<PuzzleWord>,
    pub time_left: u32,
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMsg {
    pub time_left: u32,
}

/// Sent only to the guesser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessResultMsg {
    pub hit: bool,
    pub word: Option<String>,
    pub index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRevealedMsg {
    pub index: u32,
    pub word: PuzzleWord,
    pub revealer: PlayerId,
    pub scores: Vec<ScoreEntry>,
    pub last_hit: LastHit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCompleteMsg {
    pub round: u32,
    pub scores: Vec<ScoreEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndedMsg {
    pub final_scores: Vec<ScoreEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub message: String,
}

/// All client-to-server messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    CreateRoom(CreateRoomMsg),
    JoinRoom(JoinRoomMsg),
    GetRoomInfo(GetRoomInfoMsg),
    LeaveRoom(LeaveRoomMsg),
    Control(ControlMsg),
    Guess(GuessMsg),
    UpdateSettings(UpdateSettingsMsg),
}

/// All server-to-client messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    RoomCreated(Box<RoomCreatedMsg>),
    RoomJoined(Box<RoomJoinedMsg>),
    RoomInfo(Box<RoomInfoMsg>),
    PlayerJoined(PlayerJoinedMsg),
    PlayerLeft(PlayerLeftMsg),
    PlayerList(PlayerListMsg),
    Status(StatusMsg),
    SettingsUpdated(SettingsUpdatedMsg),
    LoadingState(LoadingStateMsg),
    NewRound(NewRoundMsg),
    Tick(TickMsg),
    GuessResult(GuessResultMsg),
    WordRevealed(WordRevealedMsg),
    LevelComplete(LevelCompleteMsg),
    Ended(EndedMsg),
    Error(ErrorMsg),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_player, make_words};

    #[test]
    fn message_type_bytes_roundtrip() {
        for b in 0u8..=0xFF {
            if let Some(t) = MessageType::from_byte(b) {
                assert_eq!(t as u8, b);
            }
        }
        assert_eq!(MessageType::from_byte(0x00), None);
        assert_eq!(MessageType::from_byte(0xFF), None);
    }

    #[test]
    fn unrevealed_words_are_masked() {
        let mut words = make_words(&["GATO", "PERRO"]);
        words[1].revealed = true;
        words[1].revealed_by = Some(9);
        let view = puzzle_view(&words);
        assert_eq!(view[0].text, None);
        assert_eq!(view[0].length, 4);
        assert_eq!(view[1].text.as_deref(), Some("PERRO"));
        assert_eq!(view[1].revealed_by, Some(9));
    }

    #[test]
    fn snapshot_reflects_session() {
        let mut session = Session::new(
            "ABCDE".into(),
            RoomSettings::default(),
            crate::room::SettingsBounds::default(),
        );
        session.join(make_player(1, "Host")).unwrap();
        session.set_participant_ceiling(8);
        let snap = RoomSnapshot::from(&session);
        assert_eq!(snap.room_code, "ABCDE");
        assert_eq!(snap.owner_id, Some(1));
        assert_eq!(snap.owner_name.as_deref(), Some("Host"));
        assert_eq!(snap.auth_mode, Some(AuthMode::Open));
        assert_eq!(snap.max_participants, 8);
        assert_eq!(snap.players.len(), 1);
        assert!(snap.words.is_empty());
    }

    #[test]
    fn unlimited_ceiling_saturates() {
        let session = Session::new(
            "ABCDE".into(),
            RoomSettings::default(),
            crate::room::SettingsBounds::default(),
        );
        assert_eq!(RoomSnapshot::from(&session).max_participants, u32::MAX);
    }
}
