//! HTTP API and hub listener for the Tollgate entitlement server.
//!
//! Routes live under `/api/v1`. Admin routes additionally require the
//! `x-admin-key` header. Every error is a JSON `{ "error", "message" }` body
//! with the code from [`ErrorCode`](tollgate_types::ErrorCode).

pub mod admin;
pub mod api;
mod config;
mod error;
pub mod maintenance;
mod source;
mod state;

pub use config::ServerConfig;
pub use error::{status_for, ApiError, ApiResult, ErrorBody};
pub use source::source_info;
pub use state::AppState;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Builds the HTTP router over `state`.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/licenses", post(admin::create_license).get(admin::list_licenses))
        .route("/licenses/{client_id}", get(admin::get_license))
        .route("/licenses/{client_id}/activate", post(admin::activate_license))
        .route("/licenses/{client_id}/extend", post(admin::extend_license))
        .route("/licenses/{client_id}/revoke", post(admin::revoke_license))
        .route("/identities", post(admin::create_identity))
        .route("/blocks/{address}", delete(admin::unblock_address))
        .route("/sessions/{client_id}", delete(admin::revoke_sessions))
        .layer(middleware::from_fn_with_state(state.clone(), admin::require_admin));

    let api = Router::new()
        .route("/health", get(api::health))
        .route("/authenticate", post(api::authenticate))
        .route("/revalidate", post(api::revalidate))
        .route("/refresh", post(api::refresh))
        .route("/usage", post(api::usage))
        .nest("/admin", admin);

    Router::new()
        .nest("/api/v1", api)
        .fallback(api::not_found)
        .with_state(state)
}

/// Serves the HTTP API on `listener`. Handlers see the peer address.
pub async fn serve_http(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http api listening");
    }
    let app = build_router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
}

/// Serves hub subscribers on `listener`.
pub async fn serve_hub(listener: TcpListener, state: AppState) -> tollgate_hub::HubResult<()> {
    let verifier = state.guard.codec().to_verifier();
    tollgate_hub::serve(listener, state.hub.clone(), verifier).await
}
