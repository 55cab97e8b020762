//! notevault-server library: router assembly and shared state.
//!
//! This is a thin library layer over the server components, allowing
//! integration tests to build the same router the binary serves.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use notevault_core::SyncCoordinator;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
pub struct AppState {
    pub coordinator: SyncCoordinator,
}

/// Build the full router: note API plus the real-time endpoint.
///
/// CORS is permissive on purpose: clients are static pages served from
/// arbitrary origins and everything they send is already ciphertext.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/note/{hash}",
            get(http::get_note).put(http::put_note),
        )
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
