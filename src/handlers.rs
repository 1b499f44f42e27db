use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::client_id::ClientId;
use crate::error::{ApiError, Result};
use crate::models::Location;
use crate::rate_limiter::RateLimiter;
use crate::service::IpService;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Application state containing the lookup service and the user-facing limiter
pub struct AppState {
    pub service: IpService,
    pub rate_limiter: RateLimiter,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /v1/find-country?ip=<address>
///
/// Query pairs are taken as a list so a repeated `ip` resolves to its first
/// value instead of failing extraction.
pub async fn find_country(
    State(state): State<SharedState>,
    client_id: Option<Extension<ClientId>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Location>> {
    let ip = first_param(params, "ip")
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("Missing required parameter: ip".to_string()))?;

    let client_id = client_id.map(|Extension(id)| id.0).unwrap_or_default();
    info!(ip = %ip, client_id = %client_id, "Processing IP lookup request");

    let location = state.service.find_location(&ip).map_err(|err| {
        error!(ip = %ip, client_id = %client_id, error = %err, "Failed to find location");
        ApiError::from(err)
    })?;

    Ok(Json(location))
}

fn first_param(params: Vec<(String, String)>, name: &str) -> Option<String> {
    params
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

/// GET /health
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    match state.service.health_check() {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(err) => {
            error!(error = %err, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

/// GET /debug/rate-limiter, pretty-printed state of the user-facing limiter
pub async fn debug_rate_limiter(State(state): State<SharedState>) -> Result<Response> {
    let snapshot = state.rate_limiter.snapshot();
    let body = serde_json::to_string_pretty(&snapshot).map_err(|err| {
        error!(error = %err, "Failed to serialize rate limiter state");
        ApiError::Internal("Failed to marshal state".to_string())
    })?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
