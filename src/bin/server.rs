use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sotto::config::ServerConfig;
use sotto::routes;
use sotto::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let candidates: Vec<String> = [
        std::env::var("CONFIG_PATH").ok(),
        Some("config/server.yaml".to_string()),
        Some("server.yaml".to_string()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut config = None;
    let mut loaded_path = String::new();
    for path in &candidates {
        if let Ok(cfg) = ServerConfig::load(path) {
            config = Some(cfg);
            loaded_path = path.clone();
            break;
        }
    }
    let config = config.ok_or_else(|| {
        anyhow::anyhow!("could not find a server config, tried: {candidates:?}")
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("sotto={}", config.log_level))),
        )
        .init();
    info!("loaded configuration from {loaded_path}");

    std::fs::create_dir_all(&config.temp_dir)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app_state = AppState::new(config);

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    info!("starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
