use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::room_manager::RoomStats;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `"healthy"`, or `"at_capacity"` once new sockets would be refused.
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub rooms: RoomInfo,
}

#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    pub max_websocket: usize,
}

/// Live sessions and seated participants (observers are not counted).
#[derive(Debug, Serialize)]
pub struct RoomInfo {
    pub active: usize,
    pub players: usize,
}

impl From<RoomStats> for RoomInfo {
    fn from(stats: RoomStats) -> Self {
        Self {
            active: stats.active_rooms,
            players: stats.participants,
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let websocket = state.ws_connection_count.load(Ordering::Relaxed);
    let max_websocket = state.config.limits.max_ws_connections;
    let stats = state.rooms.read().await.stats();

    Json(HealthResponse {
        status: if websocket >= max_websocket {
            "at_capacity"
        } else {
            "healthy"
        },
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo {
            websocket,
            max_websocket,
        },
        rooms: stats.into(),
    })
}
