use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crossplay_server::config::ServerConfig;
use crossplay_server::{build_app, spawn_idle_sweeper, vocabulary};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("CROSSPLAY_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServerConfig::load();
    config.validate();

    let vocabulary = match vocabulary::from_config(&config.vocabulary) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "Cannot initialize vocabulary source");
            std::process::exit(1);
        },
    };

    let listen_addr = config.listen_addr.clone();
    let (app, state) = build_app(config, vocabulary);
    spawn_idle_sweeper(state);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %listen_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        },
    };
    tracing::info!(addr = %listen_addr, "Crossplay server listening");

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %e, "Server error");
    }
}
