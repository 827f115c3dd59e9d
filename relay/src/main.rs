mod backend;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use frame_dream_common::config::Config;
use tracing::{error, info};

use backend::Img2ImgClient;
use routes::AppState;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let backend = match Img2ImgClient::new(&config.relay) {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to build backend client");
            std::process::exit(1);
        }
    };
    info!(
        backend = backend.url(),
        prompt = config.relay.prompt,
        steps = config.relay.steps,
        "frame-dream relay starting"
    );

    let app = routes::router(Arc::new(AppState { backend }), config.relay.max_upload_bytes);

    let addr = format!("0.0.0.0:{}", config.relay.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    info!(addr, "listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "relay server stopped");
        std::process::exit(1);
    }
}
