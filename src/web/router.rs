//! Router assembly for the control surface.

use crate::web::config::WebConfig;
use crate::web::handlers::{collector_handler, healthz_handler, history_handler, AppState};
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the axum application with all routes and layers.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/collector", get(collector_handler))
        .route("/history", get(history_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
