//! Liveness endpoint for the hosting platform.

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tracing::info;

pub const HEALTH_TEXT: &str = "Profesor Oak online!";

async fn health() -> &'static str {
    HEALTH_TEXT
}

pub fn router() -> Router {
    Router::new().route("/", get(health))
}

/// Serve the health endpoint until the process exits.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "health endpoint listening");
    axum::serve(listener, router()).await
}
