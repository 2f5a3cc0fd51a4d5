//! Administrative endpoints, guarded by the `x-admin-key` header.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tollgate_store::NewLicense;
use tollgate_types::{ClientId, ErrorCode, License, Plan};
use tracing::info;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Rejects requests without a matching admin key.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !state.is_admin_key(presented) {
        return ApiError::new(ErrorCode::InvalidCredentials, "admin key required").into_response();
    }
    next.run(request).await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLicenseRequest {
    pub client_id: ClientId,
    pub plan: Plan,
    #[serde(default)]
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIdentityRequest {
    pub identity: String,
    pub secret: String,
    pub client_id: ClientId,
    /// Also creates the license when set.
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub identity: String,
    pub client_id: ClientId,
    #[serde(default)]
    pub license: Option<License>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendQuery {
    /// Extend by this many days instead of the plan term.
    pub days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedSessions {
    pub revoked: usize,
}

fn new_license(client_id: ClientId, plan: Plan, tenant: Option<String>) -> NewLicense {
    let new = NewLicense::new(client_id, plan);
    match tenant {
        Some(tenant) => new.with_tenant(tenant),
        None => new,
    }
}

pub async fn create_license(
    State(state): State<AppState>,
    body: Result<Json<CreateLicenseRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<License>)> {
    let Json(body) = body?;
    let license = state
        .store
        .create_license_with(new_license(body.client_id, body.plan, body.tenant))?;
    info!(client_id = %license.client_id, plan = %license.plan, "license created via admin");
    Ok((StatusCode::CREATED, Json(license)))
}

pub async fn list_licenses(State(state): State<AppState>) -> ApiResult<Json<Vec<License>>> {
    Ok(Json(state.store.list()?))
}

pub async fn get_license(
    State(state): State<AppState>,
    client_id: Result<Path<ClientId>, PathRejection>,
) -> ApiResult<Json<License>> {
    let Path(client_id) = client_id?;
    Ok(Json(state.store.get(&client_id)?))
}

pub async fn activate_license(
    State(state): State<AppState>,
    client_id: Result<Path<ClientId>, PathRejection>,
) -> ApiResult<Json<License>> {
    let Path(client_id) = client_id?;
    Ok(Json(state.store.activate(&client_id)?))
}

pub async fn extend_license(
    State(state): State<AppState>,
    client_id: Result<Path<ClientId>, PathRejection>,
    query: Result<Query<ExtendQuery>, QueryRejection>,
) -> ApiResult<Json<License>> {
    let Path(client_id) = client_id?;
    let Query(query) = query?;
    let license = match query.days {
        Some(days) if days <= 0 => return Err(ApiError::bad_request("days must be positive")),
        Some(days) => {
            let term = Duration::try_days(days).ok_or_else(|| ApiError::bad_request("days out of range"))?;
            state.store.extend_by(&client_id, term)?
        }
        None => state.store.extend(&client_id)?,
    };
    Ok(Json(license))
}

pub async fn revoke_license(
    State(state): State<AppState>,
    client_id: Result<Path<ClientId>, PathRejection>,
) -> ApiResult<Json<License>> {
    let Path(client_id) = client_id?;
    let license = state.store.revoke(&client_id)?;
    info!(client_id = %client_id, "license revoked via admin");
    Ok(Json(license))
}

pub async fn create_identity(
    State(state): State<AppState>,
    body: Result<Json<CreateIdentityRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IdentityResponse>)> {
    let Json(body) = body?;
    let CreateIdentityRequest {
        identity,
        secret,
        client_id,
        plan,
        tenant,
    } = body;
    // Argon2 hashing is CPU-bound.
    let store = state.store.clone();
    let response = tokio::task::spawn_blocking(move || -> ApiResult<IdentityResponse> {
        let license = match plan {
            Some(plan) => Some(store.register(&identity, &secret, new_license(client_id.clone(), plan, tenant))?),
            None => {
                store.get(&client_id)?;
                store.register_identity(&identity, &secret, &client_id)?;
                None
            }
        };
        Ok(IdentityResponse {
            identity,
            client_id,
            license,
        })
    })
    .await
    .map_err(|e| ApiError::new(ErrorCode::Internal, format!("registration task failed: {e}")))??;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn unblock_address(
    State(state): State<AppState>,
    address: Result<Path<String>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(address) = address?;
    let address: IpAddr = address
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid address {address}")))?;
    if state.guard.unblock(&address) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(ErrorCode::NotFound, format!("{address} is not blocked")))
    }
}

pub async fn revoke_sessions(
    State(state): State<AppState>,
    client_id: Result<Path<ClientId>, PathRejection>,
) -> ApiResult<Json<RevokedSessions>> {
    let Path(client_id) = client_id?;
    let revoked = state.guard.revoke_client_sessions(&client_id);
    Ok(Json(RevokedSessions { revoked }))
}
