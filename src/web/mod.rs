//! Web control surface for the collection service.
//!
//! Exposes start/stop/status/read-now over `/collector` and bucketed
//! range queries over `/history`, both consumed by the dashboard.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use handlers::AppState;
pub use router::create_app;

use crate::error::{PlcError, Result};
use std::net::SocketAddr;
use tracing::info;

/// Start the web server with the provided configuration and state.
pub async fn start_web_server(config: WebConfig, state: AppState) -> Result<()> {
    let app = create_app(&config, state);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| PlcError::config(format!("invalid bind address: {e}")))?;

    info!("starting web server on http://{addr}");
    info!("collector control: http://{addr}/collector?action=status");
    info!("history queries:   http://{addr}/history?range=24h");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PlcError::web_server(format!("failed to bind {addr}: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| PlcError::web_server(format!("server error: {e}")))?;

    Ok(())
}
