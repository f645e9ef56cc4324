use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crossplay_core::room::{SettingsUpdate, generate_room_code};
use crossplay_core::session::SessionError;

use crate::game_loop::{Founder, SessionContext, SessionHandle, spawn_session};

/// Per-connection sender for outbound WebSocket binary messages.
/// Bounded to prevent memory exhaustion from slow clients.
/// Uses `Bytes` for zero-copy cloning when broadcasting to a room.
pub type PlayerSender = mpsc::Sender<Bytes>;

pub type SharedRoomManager = Arc<RwLock<RoomManager>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    pub active_rooms: usize,
    pub participants: usize,
}

/// Registry of live sessions keyed by room code. Sessions own their state;
/// this only maps codes to actor handles.
pub struct RoomManager {
    rooms: HashMap<String, SessionHandle>,
    ctx: SessionContext,
}

impl RoomManager {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            rooms: HashMap::new(),
            ctx,
        }
    }

    /// Create a room with a fresh code and start its actor. An owner founder
    /// is seated before the actor runs so nobody else can claim the room.
    /// The entry removes itself once the session shuts down.
    pub fn create_room(
        &mut self,
        founder: Founder,
        settings: SettingsUpdate,
        registry: &SharedRoomManager,
    ) -> Result<SessionHandle, SessionError> {
        let code = generate_unique_room_code(&self.rooms);
        let mut session = self.ctx.new_session(code.clone());
        if let Founder::Owner { player, .. } = &founder {
            session.join(player.clone())?;
            if let Some(owner) = session.player(player.id) {
                let ceiling = self.ctx.entitlements.max_participants(owner);
                session.set_participant_ceiling(ceiling);
            }
        }
        session.apply_settings(settings)?;

        let observer = matches!(founder, Founder::Observer { .. });
        let (handle, task) = spawn_session(session, founder, self.ctx.clone());
        self.rooms.insert(code.clone(), handle.clone());

        let registry = Arc::clone(registry);
        let id = handle.id();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(room = %code, error = %e, "Session task failed");
            }
            registry.write().await.remove_instance(&code, id);
        });

        tracing::info!(room = %handle.code(), observer, "Room created");
        Ok(handle)
    }

    /// Look up a live session by normalized code.
    pub fn get(&self, code: &str) -> Option<SessionHandle> {
        self.rooms
            .get(code)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Drop the entry for `code` if it still belongs to session `id`.
    pub fn remove_instance(&mut self, code: &str, id: Uuid) -> bool {
        if self.rooms.get(code).is_some_and(|h| h.id() == id) {
            self.rooms.remove(code);
            tracing::debug!(room = code, "Room unregistered");
            return true;
        }
        false
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            active_rooms: self.rooms.len(),
            participants: self.rooms.values().map(SessionHandle::participants).sum(),
        }
    }

    /// Sessions with no participant command for at least `max_idle_secs`.
    pub fn idle_rooms(&self, max_idle_secs: u64, now: u64) -> Vec<SessionHandle> {
        self.rooms
            .values()
            .filter(|h| now.saturating_sub(h.last_active()) >= max_idle_secs)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub fn room_exists(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }
}

/// Generate a unique room code, retrying on collision with existing rooms.
fn generate_unique_room_code(existing: &HashMap<String, SessionHandle>) -> String {
    loop {
        let code = generate_room_code();
        if !existing.contains_key(&code) {
            return code;
        }
    }
}
