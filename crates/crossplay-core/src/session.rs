use serde::{Deserialize, Serialize};

use crate::layout::PlacedWord;
use crate::normalize::normalize_guess;
use crate::player::{Player, PlayerId, sanitize_name};
use crate::room::{AuthMode, EndCondition, RoomSettings, RoomState, SettingsBounds, SettingsUpdate};

/// Errors reported to the connection that issued an intent. None of these
/// mutate session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    RoomNotFound,
    Unauthorized,
    NameTaken,
    AuthModeMismatch,
    /// Vocabulary or layout failed for this round; retried internally.
    GenerationFailed,
    InvalidDuration {
        secs: u32,
        min: u32,
        max: u32,
    },
    InvalidTier {
        requested: u32,
        ceiling: u32,
    },
    InvalidTarget,
    InvalidLanguage,
    InvalidName,
    RoomFull,
    InvalidState(&'static str),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomNotFound => write!(f, "Room not found"),
            Self::Unauthorized => write!(f, "Only the room owner can do that"),
            Self::NameTaken => write!(f, "That name is already taken in this room"),
            Self::AuthModeMismatch => {
                write!(f, "This room only accepts players from the owner's sign-in provider")
            },
            Self::GenerationFailed => write!(f, "Puzzle generation failed"),
            Self::InvalidDuration { secs, min, max } => {
                write!(f, "Round duration {secs}s is outside {min}..={max}s")
            },
            Self::InvalidTier { requested, ceiling } => write!(
                f,
                "Participant limit {requested} exceeds this room's tier ceiling of {ceiling}"
            ),
            Self::InvalidTarget => write!(f, "End condition target must be at least 1"),
            Self::InvalidLanguage => write!(f, "Invalid language tag"),
            Self::InvalidName => write!(f, "Invalid player name"),
            Self::RoomFull => write!(f, "Room is full"),
            Self::InvalidState(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// The most recent successful guess, kept for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastHit {
    pub player_id: PlayerId,
    pub display_name: String,
    pub word: String,
    pub word_id: u32,
}

/// One row of a scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub round_score: u32,
    pub total_score: u32,
}

/// A word newly revealed by a guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    /// Position of the word in placement order.
    pub index: usize,
    pub word_id: u32,
    pub word: String,
    /// The guesser's total reached the score target; the session is now Ended.
    pub score_target_reached: bool,
    /// Every word in the puzzle is now revealed.
    pub all_revealed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    /// Not accepting guesses (not playing, loading, or not a participant).
    Rejected,
    Miss,
    Hit(Reveal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clock is frozen (paused, loading, or not playing).
    Idle,
    Ticked(u32),
    /// The clock just reached zero.
    Expired,
}

/// Result of removing a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player: Player,
    /// Set when the owner left and ownership moved to another participant.
    pub new_owner: Option<PlayerId>,
}

/// One room's complete game state.
///
/// All mutation goes through methods that enforce the room rules; the
/// caller (a per-room actor) serializes access.
#[derive(Debug, Clone)]
pub struct Session {
    code: String,
    owner_id: Option<PlayerId>,
    owner_name: Option<String>,
    auth_mode: Option<AuthMode>,
    settings: RoomSettings,
    bounds: SettingsBounds,
    status: RoomState,
    players: Vec<Player>,
    theme: Option<String>,
    words: Vec<PlacedWord>,
    time_left: u32,
    paused: bool,
    loading: bool,
    round: u32,
    last_hit: Option<LastHit>,
    /// Ceiling granted by the owner's entitlements.
    tier_ceiling: usize,
    /// Effective participant limit (owner may lower it below the ceiling).
    max_participants: usize,
}

impl Session {
    pub fn new(code: String, settings: RoomSettings, bounds: SettingsBounds) -> Self {
        Self {
            code,
            owner_id: None,
            owner_name: None,
            auth_mode: None,
            settings,
            bounds,
            status: RoomState::Lobby,
            players: Vec::new(),
            theme: None,
            words: Vec::new(),
            time_left: 0,
            paused: false,
            loading: false,
            round: 0,
            last_hit: None,
            tier_ceiling: usize::MAX,
            max_participants: usize::MAX,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn status(&self) -> RoomState {
        self.status
    }

    pub fn owner_id(&self) -> Option<PlayerId> {
        self.owner_id
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    pub fn auth_mode(&self) -> Option<&AuthMode> {
        self.auth_mode.as_ref()
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref()
    }

    pub fn words(&self) -> &[PlacedWord] {
        &self.words
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn last_hit(&self) -> Option<&LastHit> {
        self.last_hit.as_ref()
    }

    pub fn max_participants(&self) -> usize {
        self.max_participants
    }

    pub fn is_owner(&self, id: PlayerId) -> bool {
        self.owner_id == Some(id)
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn all_revealed(&self) -> bool {
        !self.words.is_empty() && self.words.iter().all(|w| w.revealed)
    }

    /// Scoreboard ordered by total score, ties in join order.
    pub fn scores(&self) -> Vec<ScoreEntry> {
        let mut scores: Vec<ScoreEntry> = self
            .players
            .iter()
            .map(|p| ScoreEntry {
                player_id: p.id,
                display_name: p.display_name.clone(),
                round_score: p.round_score,
                total_score: p.total_score,
            })
            .collect();
        scores.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        scores
    }

    fn require_owner(&self, requester: PlayerId) -> Result<(), SessionError> {
        if self.is_owner(requester) {
            Ok(())
        } else {
            Err(SessionError::Unauthorized)
        }
    }

    /// Apply the entitlement ceiling for the current owner. A lower limit
    /// chosen earlier is kept.
    pub fn set_participant_ceiling(&mut self, ceiling: usize) {
        self.tier_ceiling = ceiling.max(1);
        self.max_participants = self.max_participants.min(self.tier_ceiling);
    }

    /// Add a participant. Returns true if the joiner became the owner.
    pub fn join(&mut self, mut player: Player) -> Result<bool, SessionError> {
        let name = sanitize_name(&player.display_name).ok_or(SessionError::InvalidName)?;
        if self.players.iter().any(|p| p.id == player.id) {
            return Err(SessionError::InvalidState("Already joined"));
        }
        if self.players.iter().any(|p| p.has_name(&name)) {
            return Err(SessionError::NameTaken);
        }
        if let Some(mode) = &self.auth_mode
            && !mode.admits(player.provider.as_deref())
        {
            return Err(SessionError::AuthModeMismatch);
        }
        if self.players.len() >= self.max_participants {
            return Err(SessionError::RoomFull);
        }

        player.display_name = name;
        player.round_score = 0;
        player.total_score = 0;

        let became_owner = self.owner_id.is_none();
        if became_owner {
            self.owner_id = Some(player.id);
            self.owner_name = Some(player.display_name.clone());
            if self.auth_mode.is_none() {
                self.auth_mode = Some(AuthMode::for_owner(player.provider.as_deref()));
            }
        }
        self.players.push(player);
        Ok(became_owner)
    }

    /// Remove a participant. If the owner leaves, ownership passes to the
    /// longest-present remaining participant; auth mode stays fixed.
    pub fn leave(&mut self, player_id: PlayerId) -> Option<Departure> {
        let idx = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(idx);
        let mut new_owner = None;
        if self.owner_id == Some(player_id) {
            match self.players.first() {
                Some(next) => {
                    self.owner_id = Some(next.id);
                    self.owner_name = Some(next.display_name.clone());
                    new_owner = Some(next.id);
                },
                None => {
                    self.owner_id = None;
                    self.owner_name = None;
                },
            }
        }
        Some(Departure { player, new_owner })
    }

    /// Lobby -> Playing. The caller then begins the first round.
    pub fn start(&mut self, requester: PlayerId) -> Result<(), SessionError> {
        self.require_owner(requester)?;
        if self.status != RoomState::Lobby {
            return Err(SessionError::InvalidState("Game already started"));
        }
        self.status = RoomState::Playing;
        self.round = 0;
        self.paused = false;
        self.clear_puzzle();
        self.loading = true;
        Ok(())
    }

    /// Mark a round as being prepared. Guesses are rejected until
    /// [`Session::install_round`].
    pub fn begin_loading(&mut self) {
        self.loading = true;
    }

    /// Install a freshly generated puzzle. Returns the new round number, or
    /// `None` if the session is no longer playing.
    pub fn install_round(&mut self, theme: String, words: Vec<PlacedWord>) -> Option<u32> {
        if self.status != RoomState::Playing {
            return None;
        }
        self.theme = Some(theme);
        self.words = words;
        self.time_left = self.settings.round_duration_secs;
        self.round += 1;
        self.last_hit = None;
        for p in &mut self.players {
            p.round_score = 0;
        }
        self.loading = false;
        Some(self.round)
    }

    /// Advance the round clock by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != RoomState::Playing || self.paused || self.loading || self.time_left == 0
        {
            return TickOutcome::Idle;
        }
        self.time_left -= 1;
        if self.time_left == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Ticked(self.time_left)
        }
    }

    /// Resolve a participant's guess against the unrevealed words.
    pub fn guess(&mut self, player_id: PlayerId, text: &str) -> GuessOutcome {
        if self.status != RoomState::Playing || self.loading {
            return GuessOutcome::Rejected;
        }
        let Some(pidx) = self.players.iter().position(|p| p.id == player_id) else {
            return GuessOutcome::Rejected;
        };
        let normalized = normalize_guess(text);
        if normalized.is_empty() {
            return GuessOutcome::Miss;
        }
        let Some(index) = self
            .words
            .iter()
            .position(|w| !w.revealed && w.text == normalized)
        else {
            return GuessOutcome::Miss;
        };

        let word = &mut self.words[index];
        word.revealed = true;
        word.revealed_by = Some(player_id);
        let word_id = word.id;

        let player = &mut self.players[pidx];
        player.round_score += 1;
        player.total_score += 1;
        self.last_hit = Some(LastHit {
            player_id,
            display_name: player.display_name.clone(),
            word: normalized.clone(),
            word_id,
        });

        // Any participant counts: the target may have been lowered mid-round.
        let score_target_reached = matches!(self.settings.end_condition, EndCondition::Score(_))
            && self.end_condition_met();
        if score_target_reached {
            self.finish();
        }

        GuessOutcome::Hit(Reveal {
            index,
            word_id,
            word: normalized,
            score_target_reached,
            all_revealed: self.all_revealed(),
        })
    }

    /// End-condition check for a round boundary (timer expiry or full solve).
    pub fn end_condition_met(&self) -> bool {
        match self.settings.end_condition {
            EndCondition::Infinite => false,
            EndCondition::Rounds(target) => self.round >= target,
            EndCondition::Score(target) => self.players.iter().any(|p| p.total_score >= target),
        }
    }

    /// Playing -> Ended.
    pub fn finish(&mut self) {
        if self.status == RoomState::Playing {
            self.status = RoomState::Ended;
        }
        self.loading = false;
        self.paused = false;
    }

    pub fn pause(&mut self, requester: PlayerId) -> Result<(), SessionError> {
        self.set_paused(requester, true)
    }

    pub fn resume(&mut self, requester: PlayerId) -> Result<(), SessionError> {
        self.set_paused(requester, false)
    }

    fn set_paused(&mut self, requester: PlayerId, paused: bool) -> Result<(), SessionError> {
        self.require_owner(requester)?;
        if self.status != RoomState::Playing {
            return Err(SessionError::InvalidState("No game in progress"));
        }
        self.paused = paused;
        Ok(())
    }

    /// Any state -> Lobby, clearing the puzzle and every score.
    pub fn reset(&mut self, requester: PlayerId) -> Result<(), SessionError> {
        self.require_owner(requester)?;
        self.status = RoomState::Lobby;
        self.round = 0;
        self.paused = false;
        self.loading = false;
        self.clear_puzzle();
        self.clear_scores();
        Ok(())
    }

    /// Playing -> Playing with scores and round counter cleared. The caller
    /// then begins a new round.
    pub fn restart(&mut self, requester: PlayerId) -> Result<(), SessionError> {
        self.require_owner(requester)?;
        if self.status != RoomState::Playing {
            return Err(SessionError::InvalidState("No game in progress"));
        }
        self.round = 0;
        self.paused = false;
        self.clear_puzzle();
        self.clear_scores();
        self.loading = true;
        Ok(())
    }

    /// Validate and apply an owner's settings change.
    pub fn update_settings(
        &mut self,
        requester: PlayerId,
        update: SettingsUpdate,
    ) -> Result<(), SessionError> {
        self.require_owner(requester)?;
        self.apply_settings(update)
    }

    /// Validate and apply a settings change without an ownership check (room
    /// creation). Nothing is applied if any field is invalid.
    pub fn apply_settings(&mut self, update: SettingsUpdate) -> Result<(), SessionError> {
        let language = match update.language {
            Some(lang) => {
                let lang = lang.trim().to_string();
                let valid = !lang.is_empty()
                    && lang.len() <= 16
                    && lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
                if !valid {
                    return Err(SessionError::InvalidLanguage);
                }
                Some(lang)
            },
            None => None,
        };
        if let Some(secs) = update.round_duration_secs
            && !self.bounds.duration_in_range(secs)
        {
            return Err(SessionError::InvalidDuration {
                secs,
                min: self.bounds.min_round_secs,
                max: self.bounds.max_round_secs,
            });
        }
        if let Some(EndCondition::Rounds(0) | EndCondition::Score(0)) = update.end_condition {
            return Err(SessionError::InvalidTarget);
        }
        if let Some(requested) = update.max_participants
            && (requested == 0 || requested as usize > self.tier_ceiling)
        {
            return Err(SessionError::InvalidTier {
                requested,
                ceiling: u32::try_from(self.tier_ceiling).unwrap_or(u32::MAX),
            });
        }

        if let Some(lang) = language {
            self.settings.language = lang;
        }
        if let Some(secs) = update.round_duration_secs {
            self.settings.round_duration_secs = secs;
        }
        if let Some(end) = update.end_condition {
            self.settings.end_condition = end;
        }
        if let Some(requested) = update.max_participants {
            self.max_participants = requested as usize;
        }
        Ok(())
    }

    fn clear_puzzle(&mut self) {
        self.theme = None;
        self.words.clear();
        self.time_left = 0;
        self.last_hit = None;
    }

    fn clear_scores(&mut self) {
        for p in &mut self.players {
            p.round_score = 0;
            p.total_score = 0;
        }
    }
}
