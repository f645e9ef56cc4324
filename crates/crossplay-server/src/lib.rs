pub mod api;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod game_loop;
pub mod health;
pub mod rate_limit;
pub mod room_manager;
pub mod state;
pub mod vocabulary;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crossplay_core::time::unix_now;

use config::ServerConfig;
use state::AppState;
use vocabulary::SharedVocabulary;

/// Rate-limit buckets untouched for this long are discarded by the sweeper.
const LIMITER_MAX_AGE: Duration = Duration::from_secs(600);

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig, vocabulary: SharedVocabulary) -> (Router<()>, AppState) {
    let state = AppState::new(config, vocabulary);

    let api_routes = Router::new()
        .route("/rooms/{code}", get(api::get_room))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::rate_limit_layer,
        ))
        .layer(CorsLayer::permissive());

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .with_state(state.clone());

    (app, state)
}

/// Background task that stops rooms with no participant activity for
/// `rooms.idle_timeout_secs` and prunes stale rate-limit buckets.
pub fn spawn_idle_sweeper(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.rooms.idle_check_interval_secs.max(1));
    let max_idle = state.config.rooms.idle_timeout_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;

            let idle = state.rooms.read().await.idle_rooms(max_idle, unix_now());
            for handle in idle {
                tracing::info!(room = %handle.code(), idle_secs = max_idle, "Closing idle room");
                let _ = handle.stop();
            }

            let pruned = state.api_limiter.cleanup(LIMITER_MAX_AGE).await;
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned rate-limit buckets");
            }
        }
    })
}
