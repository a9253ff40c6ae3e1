//! wirecall node.
//!
//! Serves the built-in `/sys/*` routes over a WebSocket broadcast hub:
//! - `/v1/ws`: every connected peer shares one medium
//! - `/healthz`, `/readyz`, `/metrics`: operational endpoints
//!
//! Config path comes from the first argument, else `wirecall.yaml`.

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use wirecall_core::error::{Result, WireError};
use wirecall_node::{app_state::AppState, config, router};

const DEFAULT_CONFIG: &str = "wirecall.yaml";

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "wirecall-node failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| WireError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}")))?;

    let state = AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "wirecall-node starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| WireError::Transport(format!("bind {listen}: {e}")))?;

    let drain = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            drain.begin_drain();
        })
        .await
        .map_err(|e| WireError::Transport(format!("server: {e}")))?;

    tracing::info!("wirecall-node stopped");
    Ok(())
}
