use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRequest, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crossplay_core::net::messages::{
    ClientMessage, CreateRoomMsg, ErrorMsg, GetRoomInfoMsg, JoinRoomMsg, RoomInfoMsg,
    ServerMessage,
};
use crossplay_core::net::protocol::{
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, decode_client_message, encode_server_message,
};
use crossplay_core::player::{Player, PlayerId, sanitize_name};
use crossplay_core::room::{is_valid_room_code, normalize_room_code};
use crossplay_core::session::SessionError;

use crate::api::client_ip;
use crate::game_loop::{Founder, SessionHandle};
use crate::rate_limit::TokenBucket;
use crate::room_manager::PlayerSender;
use crate::state::{AppState, ConnectionGuard, IpConnectionGuard};

/// Guesses longer than this are dropped unread.
const MAX_GUESS_CHARS: usize = 128;

/// Provider tags longer than this are treated as absent.
const MAX_PROVIDER_LEN: usize = 32;

pub async fn ws_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let ip = client_ip(&request);
    let max_per_ip = state.config.limits.max_ws_per_ip;
    let Some(ip_guard) = IpConnectionGuard::try_acquire(ip, Arc::clone(&state.ws_per_ip), max_per_ip)
    else {
        tracing::warn!(%ip, max_per_ip, "Per-IP WS connection limit reached");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    };

    let ws = WebSocketUpgrade::from_request(request, &state)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, ip, ip_guard))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState, ip: IpAddr, _ip_guard: IpConnectionGuard) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    spawn_writer(ws_sender, rx);

    let mut conn = Connection {
        conn_id: state.next_conn_id(),
        tx,
        state,
        room: None,
    };
    tracing::debug!(conn_id = conn.conn_id, %ip, "Connection opened");

    read_loop(&mut ws_receiver, &mut conn).await;

    conn.leave();
    tracing::info!(conn_id = conn.conn_id, %ip, "Connection closed");
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });
}

async fn read_loop(ws_receiver: &mut futures::stream::SplitStream<WebSocket>, conn: &mut Connection) {
    let limits = &conn.state.config.limits;
    let rate = limits.ws_rate_limit_per_sec;
    let max_size = limits.max_message_size.min(MAX_MESSAGE_SIZE);
    let mut rate_limiter = TokenBucket::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(conn_id = conn.conn_id, "Rate limited");
            continue;
        }
        if data.is_empty() || data.len() > max_size {
            tracing::debug!(conn_id = conn.conn_id, len = data.len(), "Dropped frame");
            continue;
        }

        let msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(conn_id = conn.conn_id, error = %e, "Undecodable client frame");
                continue;
            },
        };
        if let Err(e) = conn.dispatch(msg).await {
            conn.send(&ServerMessage::Error(ErrorMsg {
                message: e.to_string(),
            }));
        }
    }
}

#[derive(Debug)]
enum RequestError {
    Session(SessionError),
    VersionMismatch(u8),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(e) => write!(f, "{e}"),
            Self::VersionMismatch(v) => write!(
                f,
                "Protocol version mismatch: client={v}, server={PROTOCOL_VERSION}"
            ),
        }
    }
}

impl From<SessionError> for RequestError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

/// One WebSocket client. `conn_id` doubles as the player ID once the client
/// joins a room.
struct Connection {
    conn_id: PlayerId,
    tx: PlayerSender,
    state: AppState,
    room: Option<SessionHandle>,
}

impl Connection {
    fn send(&self, msg: &ServerMessage) {
        match encode_server_message(msg) {
            Ok(data) => {
                if self.tx.try_send(Bytes::from(data)).is_err() {
                    tracing::debug!(conn_id = self.conn_id, "Outbound queue full, dropping reply");
                }
            },
            Err(e) => tracing::error!(error = %e, "Failed to encode reply"),
        }
    }

    async fn dispatch(&mut self, msg: ClientMessage) -> Result<(), RequestError> {
        let result = match msg {
            ClientMessage::CreateRoom(m) => return self.create_room(m).await,
            ClientMessage::JoinRoom(m) => return self.join_room(m).await,
            ClientMessage::GetRoomInfo(m) => return self.room_info(m).await,
            ClientMessage::LeaveRoom(_) => {
                self.leave();
                return Ok(());
            },
            ClientMessage::Control(m) => self.current()?.control(self.conn_id, m.action),
            ClientMessage::Guess(m) => {
                if m.text.chars().count() > MAX_GUESS_CHARS {
                    tracing::debug!(conn_id = self.conn_id, "Oversized guess dropped");
                    return Ok(());
                }
                self.current()?.guess(self.conn_id, m.text)
            },
            ClientMessage::UpdateSettings(m) => {
                self.current()?.update_settings(self.conn_id, m.settings)
            },
        };
        // The session behind our handle is gone (idle sweep).
        if result == Err(SessionError::RoomNotFound) {
            self.room = None;
        }
        Ok(result?)
    }

    fn current(&self) -> Result<&SessionHandle, SessionError> {
        self.room
            .as_ref()
            .ok_or(SessionError::InvalidState("Not in a room"))
    }

    fn ensure_unseated(&self, version: u8) -> Result<(), RequestError> {
        if version != 0 && version != PROTOCOL_VERSION {
            return Err(RequestError::VersionMismatch(version));
        }
        if self.room.is_some() {
            return Err(SessionError::InvalidState("Already in a room").into());
        }
        Ok(())
    }

    async fn create_room(&mut self, msg: CreateRoomMsg) -> Result<(), RequestError> {
        self.ensure_unseated(msg.protocol_version)?;
        let founder = match msg.display_name {
            Some(raw) => {
                let name = sanitize_name(&raw).ok_or(SessionError::InvalidName)?;
                Founder::Owner {
                    player: Player::new(self.conn_id, name, clean_provider(msg.provider)),
                    sender: self.tx.clone(),
                }
            },
            None => Founder::Observer {
                conn_id: self.conn_id,
                sender: self.tx.clone(),
            },
        };

        let rooms = &self.state.rooms;
        let handle = rooms.write().await.create_room(founder, msg.settings, rooms)?;
        self.room = Some(handle);
        Ok(())
    }

    async fn join_room(&mut self, msg: JoinRoomMsg) -> Result<(), RequestError> {
        self.ensure_unseated(msg.protocol_version)?;
        let handle = self.lookup(&msg.room_code).await?;
        let player = Player::new(self.conn_id, msg.display_name, clean_provider(msg.provider));
        handle.join(player, self.tx.clone()).await?;
        tracing::info!(conn_id = self.conn_id, room = %handle.code(), "Joined room");
        self.room = Some(handle);
        Ok(())
    }

    async fn room_info(&self, msg: GetRoomInfoMsg) -> Result<(), RequestError> {
        let snapshot = self.lookup(&msg.room_code).await?.info().await?;
        self.send(&ServerMessage::RoomInfo(Box::new(RoomInfoMsg { snapshot })));
        Ok(())
    }

    async fn lookup(&self, raw_code: &str) -> Result<SessionHandle, SessionError> {
        let code = normalize_room_code(raw_code);
        if !is_valid_room_code(&code) {
            return Err(SessionError::RoomNotFound);
        }
        self.state
            .rooms
            .read()
            .await
            .get(&code)
            .ok_or(SessionError::RoomNotFound)
    }

    fn leave(&mut self) {
        if let Some(handle) = self.room.take() {
            let _ = handle.leave(self.conn_id);
            tracing::debug!(conn_id = self.conn_id, room = %handle.code(), "Left room");
        }
    }
}

/// Normalize a provider tag; blank or oversized tags count as none.
fn clean_provider(raw: Option<String>) -> Option<String> {
    let tag = raw?.trim().to_ascii_lowercase();
    (!tag.is_empty() && tag.len() <= MAX_PROVIDER_LEN).then_some(tag)
}
