//! Client-facing endpoints.

use crate::error::{ApiError, ApiResult};
use crate::source::source_info;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tollgate_guard::AuthRequest;
use tollgate_types::{EntitlementDecision, License, Session, Usage};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub identity: String,
    pub secret: String,
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub session: Session,
    pub license: License,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRequest {
    pub token: String,
    pub delta: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn authenticate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<AuthenticateRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(body) = body?;
    let request = AuthRequest {
        identity: body.identity,
        secret: body.secret,
        fingerprint: body.fingerprint,
        source: source_info(peer, &headers, state.config.trust_proxy_headers),
    };
    let session = state
        .guard
        .authenticate(request, state.config.auth_timeout())
        .await?;
    let license = state.store.get(&session.client_id)?;
    Ok(Json(SessionResponse {
        token: session.token.clone(),
        session,
        license,
    }))
}

pub async fn revalidate(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> ApiResult<Json<EntitlementDecision>> {
    let Json(body) = body?;
    let decision = state.guard.revalidate(&body.token)?;
    Ok(Json(decision))
}

pub async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(body) = body?;
    let session = state.guard.refresh(&body.token)?;
    let license = state.store.get(&session.client_id)?;
    Ok(Json(SessionResponse {
        token: session.token.clone(),
        session,
        license,
    }))
}

pub async fn usage(
    State(state): State<AppState>,
    body: Result<Json<UsageRequest>, JsonRejection>,
) -> ApiResult<Json<Usage>> {
    let Json(body) = body?;
    let session = state.guard.session_for(&body.token)?;
    let usage = state.store.record_usage(&session.client_id, body.delta)?;
    debug!(client_id = %session.client_id, delta = body.delta, used = usage.count, "usage recorded");
    Ok(Json(usage))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::new(tollgate_types::ErrorCode::NotFound, "no such route")
}
