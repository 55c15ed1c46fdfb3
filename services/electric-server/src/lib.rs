pub mod auth;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod state;
pub mod transport;

pub use state::AppState;

use axum::routing::get;
use axum::Router;

pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(transport::electric_ws_handler))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
