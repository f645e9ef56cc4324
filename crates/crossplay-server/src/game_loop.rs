use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crossplay_core::layout::{LayoutConfig, PlacedWord, generate_layout, prepare_candidates};
use crossplay_core::net::messages::{
    ControlAction, EndedMsg, ErrorMsg, GuessResultMsg, LevelCompleteMsg, LoadingStateMsg,
    NewRoundMsg, PlayerJoinedMsg, PlayerLeftMsg, PlayerListMsg, PuzzleWord, RoomCreatedMsg,
    RoomJoinedMsg, RoomSnapshot, ServerMessage, SettingsUpdatedMsg, StatusMsg, TickMsg,
    WordRevealedMsg, puzzle_view,
};
use crossplay_core::net::protocol::encode_server_message;
use crossplay_core::player::{Player, PlayerId};
use crossplay_core::room::{RoomSettings, RoomState, SettingsBounds, SettingsUpdate};
use crossplay_core::session::{GuessOutcome, Session, SessionError, TickOutcome};
use crossplay_core::time::unix_now;

use crate::config::GameConfig;
use crate::entitlements::SharedEntitlements;
use crate::room_manager::PlayerSender;
use crate::vocabulary::SharedVocabulary;

/// Sent to every connection when a room is shut down from outside.
pub const ROOM_CLOSED: &str = "Room closed";

/// Commands consumed by a session actor. The scheduled variants carry the
/// epoch they were issued in and are dropped if it has moved on.
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        player: Player,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Leave {
        conn_id: PlayerId,
    },
    Info {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Guess {
        player_id: PlayerId,
        text: String,
    },
    Control {
        player_id: PlayerId,
        action: ControlAction,
    },
    UpdateSettings {
        player_id: PlayerId,
        update: SettingsUpdate,
    },
    Tick {
        epoch: u64,
    },
    LevelReady {
        epoch: u64,
        result: Result<(String, Vec<PlacedWord>), SessionError>,
    },
    RetryRound {
        epoch: u64,
    },
    AdvanceRound {
        epoch: u64,
    },
    Stop,
}

/// Collaborators and tuning shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub vocabulary: SharedVocabulary,
    pub entitlements: SharedEntitlements,
    pub layout: LayoutConfig,
    pub defaults: RoomSettings,
    pub bounds: SettingsBounds,
    pub retry_delay: Duration,
    pub level_complete_delay: Duration,
}

impl SessionContext {
    pub fn new(
        game: &GameConfig,
        vocabulary: SharedVocabulary,
        entitlements: SharedEntitlements,
    ) -> Self {
        Self {
            vocabulary,
            entitlements,
            layout: game.layout(),
            defaults: game.default_settings(),
            bounds: game.bounds(),
            retry_delay: game.generation_retry(),
            level_complete_delay: game.level_complete_delay(),
        }
    }

    pub fn new_session(&self, code: String) -> Session {
        Session::new(code, self.defaults.clone(), self.bounds)
    }
}

/// The connection that created a room.
pub enum Founder {
    /// Joined as a participant and owner.
    Owner { player: Player, sender: PlayerSender },
    /// Receives broadcasts but never plays.
    Observer {
        conn_id: PlayerId,
        sender: PlayerSender,
    },
}

#[derive(Debug)]
struct Activity {
    last_active: AtomicU64,
    participants: AtomicUsize,
}

/// Cloneable address of a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    code: String,
    tx: mpsc::UnboundedSender<SessionCommand>,
    activity: Arc<Activity>,
}

impl SessionHandle {
    /// Identifies this session instance; a later room may reuse the code.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Unix seconds of the last participant command.
    pub fn last_active(&self) -> u64 {
        self.activity.last_active.load(Ordering::Relaxed)
    }

    pub fn participants(&self) -> usize {
        self.activity.participants.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(cmd).map_err(|_| SessionError::RoomNotFound)
    }

    pub async fn join(&self, player: Player, sender: PlayerSender) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Join {
            player,
            sender,
            reply,
        })?;
        rx.await.unwrap_or(Err(SessionError::RoomNotFound))
    }

    pub async fn info(&self) -> Result<RoomSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Info { reply })?;
        rx.await.map_err(|_| SessionError::RoomNotFound)
    }

    pub fn leave(&self, conn_id: PlayerId) -> Result<(), SessionError> {
        self.send(SessionCommand::Leave { conn_id })
    }

    pub fn guess(&self, player_id: PlayerId, text: String) -> Result<(), SessionError> {
        self.send(SessionCommand::Guess { player_id, text })
    }

    pub fn control(&self, player_id: PlayerId, action: ControlAction) -> Result<(), SessionError> {
        self.send(SessionCommand::Control { player_id, action })
    }

    pub fn update_settings(
        &self,
        player_id: PlayerId,
        update: SettingsUpdate,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::UpdateSettings { player_id, update })
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop)
    }
}

/// Spawn the actor that owns `session`. The returned task finishes when the
/// session is torn down.
pub fn spawn_session(
    session: Session,
    founder: Founder,
    ctx: SessionContext,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let activity = Arc::new(Activity {
        last_active: AtomicU64::new(unix_now()),
        participants: AtomicUsize::new(session.players().len()),
    });
    let handle = SessionHandle {
        id: Uuid::new_v4(),
        code: session.code().to_string(),
        tx: tx.clone(),
        activity: Arc::clone(&activity),
    };

    let mut actor = SessionActor {
        session,
        members: HashMap::new(),
        observers: HashMap::new(),
        ctx,
        inbox: tx,
        activity,
        epoch: 0,
        timer: None,
        scheduled: None,
    };
    actor.welcome(founder);
    let task = tokio::spawn(actor.run(rx));
    (handle, task)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct SessionActor {
    session: Session,
    members: HashMap<PlayerId, PlayerSender>,
    observers: HashMap<PlayerId, PlayerSender>,
    ctx: SessionContext,
    inbox: mpsc::UnboundedSender<SessionCommand>,
    activity: Arc<Activity>,
    epoch: u64,
    /// 1 Hz tick source for the running round.
    timer: Option<JoinHandle<()>>,
    /// Pending generation, retry, or advance.
    scheduled: Option<JoinHandle<()>>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        tracing::info!(room = %self.session.code(), "Session started");
        while let Some(cmd) = rx.recv().await {
            if self.handle(cmd) == Flow::Stop {
                break;
            }
        }

        // Anything already queued is answered as if the room never existed.
        rx.close();
        while let Ok(cmd) = rx.try_recv() {
            if let SessionCommand::Join { reply, .. } = cmd {
                let _ = reply.send(Err(SessionError::RoomNotFound));
            }
        }
        self.cancel_pending();
        tracing::info!(room = %self.session.code(), "Session closed");
    }

    fn handle(&mut self, cmd: SessionCommand) -> Flow {
        match cmd {
            SessionCommand::Join {
                player,
                sender,
                reply,
            } => {
                self.touch();
                let result = self.join(player, sender);
                let _ = reply.send(result);
            },
            SessionCommand::Leave { conn_id } => {
                self.touch();
                self.leave(conn_id);
                if self.session.is_empty() && self.observers.is_empty() {
                    return Flow::Stop;
                }
            },
            SessionCommand::Info { reply } => {
                let _ = reply.send(RoomSnapshot::from(&self.session));
            },
            SessionCommand::Guess { player_id, text } => {
                self.touch();
                self.guess(player_id, &text);
            },
            SessionCommand::Control { player_id, action } => {
                self.touch();
                if let Err(e) = self.control(player_id, action) {
                    self.reject(player_id, &e);
                }
            },
            SessionCommand::UpdateSettings { player_id, update } => {
                self.touch();
                match self.session.update_settings(player_id, update) {
                    Ok(()) => self.broadcast_settings(),
                    Err(e) => self.reject(player_id, &e),
                }
            },
            SessionCommand::Tick { epoch } if epoch == self.epoch => self.tick(),
            SessionCommand::LevelReady { epoch, result } if epoch == self.epoch => {
                self.level_ready(result);
            },
            SessionCommand::RetryRound { epoch } if epoch == self.epoch => self.begin_round(),
            SessionCommand::AdvanceRound { epoch } if epoch == self.epoch => self.round_boundary(),
            SessionCommand::Tick { .. }
            | SessionCommand::LevelReady { .. }
            | SessionCommand::RetryRound { .. }
            | SessionCommand::AdvanceRound { .. } => {
                tracing::trace!(room = %self.session.code(), "Dropped stale scheduled command");
            },
            SessionCommand::Stop => {
                tracing::info!(room = %self.session.code(), "Session stop requested");
                self.broadcast(&ServerMessage::Error(ErrorMsg {
                    message: ROOM_CLOSED.to_string(),
                }));
                return Flow::Stop;
            },
        }
        Flow::Continue
    }

    fn touch(&self) {
        self.activity
            .last_active
            .store(unix_now(), Ordering::Relaxed);
    }

    fn sync_participants(&self) {
        self.activity
            .participants
            .store(self.session.players().len(), Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    fn welcome(&mut self, founder: Founder) {
        let (conn_id, player_id) = match founder {
            Founder::Owner { player, sender } => {
                self.members.insert(player.id, sender);
                (player.id, Some(player.id))
            },
            Founder::Observer { conn_id, sender } => {
                self.observers.insert(conn_id, sender);
                (conn_id, None)
            },
        };
        let msg = ServerMessage::RoomCreated(Box::new(RoomCreatedMsg {
            room_code: self.session.code().to_string(),
            player_id,
            snapshot: RoomSnapshot::from(&self.session),
        }));
        self.send_to(conn_id, &msg);
        if player_id.is_some() {
            self.broadcast_player_list();
        }
    }

    fn join(&mut self, player: Player, sender: PlayerSender) -> Result<(), SessionError> {
        let player_id = player.id;
        let became_owner = self.session.join(player)?;
        if became_owner && let Some(owner) = self.session.player(player_id) {
            let ceiling = self.ctx.entitlements.max_participants(owner);
            self.session.set_participant_ceiling(ceiling);
        }
        self.members.insert(player_id, sender);
        self.sync_participants();

        let joined = ServerMessage::RoomJoined(Box::new(RoomJoinedMsg {
            player_id,
            snapshot: RoomSnapshot::from(&self.session),
        }));
        self.send_to(player_id, &joined);
        if let Some(player) = self.session.player(player_id) {
            let msg = ServerMessage::PlayerJoined(PlayerJoinedMsg {
                player: player.clone(),
            });
            self.broadcast_except(player_id, &msg);
        }
        self.broadcast_player_list();

        tracing::info!(
            room = %self.session.code(),
            player_id,
            became_owner,
            "Player joined"
        );
        Ok(())
    }

    fn leave(&mut self, conn_id: PlayerId) {
        if self.observers.remove(&conn_id).is_some() {
            tracing::debug!(room = %self.session.code(), conn_id, "Observer left");
            return;
        }
        if self.members.remove(&conn_id).is_none() {
            return;
        }
        let Some(departure) = self.session.leave(conn_id) else {
            return;
        };
        if let Some(owner) = departure.new_owner.and_then(|id| self.session.player(id)) {
            let ceiling = self.ctx.entitlements.max_participants(owner);
            self.session.set_participant_ceiling(ceiling);
        }
        self.sync_participants();
        self.broadcast(&ServerMessage::PlayerLeft(PlayerLeftMsg {
            player_id: conn_id,
            new_owner: departure.new_owner,
        }));
        self.broadcast_player_list();
        tracing::info!(
            room = %self.session.code(),
            player_id = conn_id,
            new_owner = ?departure.new_owner,
            "Player left"
        );
    }

    // ------------------------------------------------------------------
    // Owner actions
    // ------------------------------------------------------------------

    fn control(&mut self, player_id: PlayerId, action: ControlAction) -> Result<(), SessionError> {
        match action {
            ControlAction::Start => {
                self.session.start(player_id)?;
                tracing::info!(room = %self.session.code(), "Game started");
                self.broadcast_status();
                self.begin_round();
            },
            ControlAction::Pause => {
                self.session.pause(player_id)?;
                self.broadcast_status();
            },
            ControlAction::Resume => {
                self.session.resume(player_id)?;
                self.broadcast_status();
            },
            ControlAction::Reset => {
                self.session.reset(player_id)?;
                self.bump_epoch();
                tracing::info!(room = %self.session.code(), "Game reset");
                self.broadcast_status();
                self.broadcast_player_list();
            },
            ControlAction::Restart => {
                self.session.restart(player_id)?;
                tracing::info!(room = %self.session.code(), "Game restarted");
                self.broadcast_status();
                self.broadcast_player_list();
                self.begin_round();
            },
        }
        Ok(())
    }

    fn reject(&self, player_id: PlayerId, error: &SessionError) {
        tracing::warn!(
            room = %self.session.code(),
            player_id,
            error = %error,
            "Rejected action"
        );
        self.send_to(
            player_id,
            &ServerMessage::Error(ErrorMsg {
                message: error.to_string(),
            }),
        );
    }

    // ------------------------------------------------------------------
    // Round lifecycle
    // ------------------------------------------------------------------

    /// Invalidate every scheduled command and stop the timer.
    fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.cancel_pending();
        self.epoch
    }

    fn cancel_pending(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(task) = self.scheduled.take() {
            task.abort();
        }
    }

    fn set_scheduled(&mut self, task: JoinHandle<()>) {
        if let Some(old) = self.scheduled.replace(task) {
            old.abort();
        }
    }

    fn schedule(&mut self, delay: Duration, cmd: SessionCommand) {
        let inbox = self.inbox.clone();
        self.set_scheduled(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(cmd);
        }));
    }

    fn begin_round(&mut self) {
        if self.session.status() != RoomState::Playing {
            return;
        }
        let epoch = self.bump_epoch();
        self.session.begin_loading();
        self.broadcast(&ServerMessage::LoadingState(LoadingStateMsg { loading: true }));

        let vocabulary = Arc::clone(&self.ctx.vocabulary);
        let layout = self.ctx.layout.clone();
        let language = self.session.settings().language.clone();
        let code = self.session.code().to_string();
        let inbox = self.inbox.clone();
        self.set_scheduled(tokio::spawn(async move {
            let result = prepare_level(vocabulary, layout, &language, &code).await;
            let _ = inbox.send(SessionCommand::LevelReady { epoch, result });
        }));
    }

    fn level_ready(&mut self, result: Result<(String, Vec<PlacedWord>), SessionError>) {
        match result {
            Ok((theme, words)) => {
                let word_count = words.len();
                let Some(round) = self.session.install_round(theme, words) else {
                    return;
                };
                self.broadcast(&ServerMessage::NewRound(NewRoundMsg {
                    theme: self.session.theme().unwrap_or_default().to_string(),
                    words: puzzle_view(self.session.words()),
                    time_left: self.session.time_left(),
                    round,
                }));
                tracing::info!(
                    room = %self.session.code(),
                    round,
                    words = word_count,
                    "Round begun"
                );
                self.start_timer();
            },
            Err(e) => {
                tracing::warn!(
                    room = %self.session.code(),
                    error = %e,
                    retry_ms = self.ctx.retry_delay.as_millis() as u64,
                    "Round generation failed, retrying"
                );
                let epoch = self.epoch;
                self.schedule(self.ctx.retry_delay, SessionCommand::RetryRound { epoch });
            },
        }
    }

    fn start_timer(&mut self) {
        if let Some(old) = self.timer.take() {
            old.abort();
        }
        let inbox = self.inbox.clone();
        let epoch = self.epoch;
        self.timer = Some(tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if inbox.send(SessionCommand::Tick { epoch }).is_err() {
                    break;
                }
            }
        }));
    }

    fn tick(&mut self) {
        match self.session.tick() {
            TickOutcome::Idle => {},
            TickOutcome::Ticked(time_left) => {
                self.broadcast(&ServerMessage::Tick(TickMsg { time_left }));
            },
            TickOutcome::Expired => {
                self.broadcast(&ServerMessage::Tick(TickMsg { time_left: 0 }));
                if let Some(timer) = self.timer.take() {
                    timer.abort();
                }
                tracing::info!(
                    room = %self.session.code(),
                    round = self.session.round(),
                    "Round time expired"
                );
                self.round_boundary();
            },
        }
    }

    fn round_boundary(&mut self) {
        if self.session.end_condition_met() {
            self.end_game();
        } else {
            self.begin_round();
        }
    }

    fn end_game(&mut self) {
        self.bump_epoch();
        self.session.finish();
        self.broadcast(&ServerMessage::Ended(EndedMsg {
            final_scores: self.session.scores(),
        }));
        tracing::info!(
            room = %self.session.code(),
            rounds = self.session.round(),
            "Game ended"
        );
    }

    fn guess(&mut self, player_id: PlayerId, text: &str) {
        let reveal = match self.session.guess(player_id, text) {
            GuessOutcome::Hit(reveal) => reveal,
            outcome => {
                if outcome == GuessOutcome::Rejected {
                    tracing::debug!(room = %self.session.code(), player_id, "Guess rejected");
                }
                self.send_to(
                    player_id,
                    &ServerMessage::GuessResult(GuessResultMsg {
                        hit: false,
                        word: None,
                        index: None,
                    }),
                );
                return;
            },
        };

        self.send_to(
            player_id,
            &ServerMessage::GuessResult(GuessResultMsg {
                hit: true,
                word: Some(reveal.word.clone()),
                index: Some(reveal.index as u32),
            }),
        );
        if let (Some(word), Some(last_hit)) = (
            self.session.words().get(reveal.index),
            self.session.last_hit(),
        ) {
            let msg = ServerMessage::WordRevealed(WordRevealedMsg {
                index: reveal.index as u32,
                word: PuzzleWord::from(word),
                revealer: player_id,
                scores: self.session.scores(),
                last_hit: last_hit.clone(),
            });
            self.broadcast(&msg);
        }

        if reveal.score_target_reached {
            self.end_game();
        } else if reveal.all_revealed {
            self.level_complete();
        }
    }

    fn level_complete(&mut self) {
        let epoch = self.bump_epoch();
        self.broadcast(&ServerMessage::LevelComplete(LevelCompleteMsg {
            round: self.session.round(),
            scores: self.session.scores(),
        }));
        tracing::info!(
            room = %self.session.code(),
            round = self.session.round(),
            "Puzzle solved"
        );
        self.schedule(
            self.ctx.level_complete_delay,
            SessionCommand::AdvanceRound { epoch },
        );
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn encode(&self, msg: &ServerMessage) -> Option<Bytes> {
        match encode_server_message(msg) {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) => {
                tracing::error!(room = %self.session.code(), error = %e, "Failed to encode message");
                None
            },
        }
    }

    fn deliver(&self, conn_id: PlayerId, sender: &PlayerSender, data: Bytes) {
        if let Err(e) = sender.try_send(data) {
            tracing::debug!(
                player_id = conn_id,
                room = %self.session.code(),
                error = %e,
                "Skipping send to slow client"
            );
        }
    }

    fn send_to(&self, conn_id: PlayerId, msg: &ServerMessage) {
        let sender = self
            .members
            .get(&conn_id)
            .or_else(|| self.observers.get(&conn_id));
        if let Some(sender) = sender
            && let Some(data) = self.encode(msg)
        {
            self.deliver(conn_id, sender, data);
        }
    }

    fn broadcast_except(&self, exclude: PlayerId, msg: &ServerMessage) {
        let Some(data) = self.encode(msg) else {
            return;
        };
        for (&id, sender) in self.members.iter().chain(&self.observers) {
            if id != exclude {
                self.deliver(id, sender, data.clone());
            }
        }
    }

    fn broadcast(&self, msg: &ServerMessage) {
        let Some(data) = self.encode(msg) else {
            return;
        };
        for (&id, sender) in self.members.iter().chain(&self.observers) {
            self.deliver(id, sender, data.clone());
        }
    }

    fn broadcast_player_list(&self) {
        self.broadcast(&ServerMessage::PlayerList(PlayerListMsg {
            players: self.session.players().to_vec(),
            owner_id: self.session.owner_id(),
        }));
    }

    fn broadcast_status(&self) {
        self.broadcast(&ServerMessage::Status(StatusMsg {
            status: self.session.status(),
            paused: self.session.is_paused(),
        }));
    }

    fn broadcast_settings(&self) {
        self.broadcast(&ServerMessage::SettingsUpdated(SettingsUpdatedMsg {
            settings: self.session.settings().clone(),
            max_participants: u32::try_from(self.session.max_participants()).unwrap_or(u32::MAX),
        }));
    }
}

/// Fetch vocabulary and lay out a puzzle off the actor task.
async fn prepare_level(
    vocabulary: SharedVocabulary,
    layout: LayoutConfig,
    language: &str,
    code: &str,
) -> Result<(String, Vec<PlacedWord>), SessionError> {
    let level = vocabulary.get_level(language).await.map_err(|e| {
        tracing::warn!(room = code, language, error = %e, "Vocabulary fetch failed");
        SessionError::GenerationFailed
    })?;

    let raw = level.words;
    let (words, candidates) = tokio::task::spawn_blocking(move || {
        let candidates = prepare_candidates(&raw, &layout);
        let words = generate_layout(&candidates, &layout, &mut rand::rng());
        if layout.is_viable(&words) {
            (Some(words), candidates.len())
        } else {
            (None, candidates.len())
        }
    })
    .await
    .map_err(|e| {
        tracing::error!(room = code, error = %e, "Layout task failed");
        SessionError::GenerationFailed
    })?;

    match words {
        Some(words) => Ok((level.theme, words)),
        None => {
            tracing::warn!(
                room = code,
                theme = %level.theme,
                candidates,
                "Layout below minimum word count"
            );
            Err(SessionError::GenerationFailed)
        },
    }
}
