use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::middleware::Next;
use axum::response::{Json, Response};

use crossplay_core::net::messages::RoomSnapshot;
use crossplay_core::room::{is_valid_room_code, normalize_room_code};

use crate::error::AppError;
use crate::state::AppState;

/// Peer address recorded by `into_make_service_with_connect_info`, or
/// loopback when the router is served without it.
pub fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// GET /api/v1/rooms/{code}: snapshot of a live room.
pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let code = normalize_room_code(&code);
    let not_found = || AppError::NotFound(format!("Room {code} not found"));
    if !is_valid_room_code(&code) {
        return Err(not_found());
    }
    let handle = state.rooms.read().await.get(&code).ok_or_else(not_found)?;
    Ok(Json(handle.info().await?))
}

/// Per-IP token bucket in front of the REST routes.
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&request);
    if !state.api_limiter.check(ip).await {
        tracing::warn!(%ip, path = %request.uri().path(), "API rate limited");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}
