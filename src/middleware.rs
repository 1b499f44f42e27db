use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, USER_AGENT};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client_id::{client_id_from_request, ClientId};
use crate::error::ApiError;
use crate::rate_limiter::RateLimiter;

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Routes under this prefix are guarded by the debug limiter only
pub const DEBUG_PATH_PREFIX: &str = "/debug/";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = client_id_from_request(&request);
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut response = next.run(request).await;

    info!(
        target: "iplocate::middleware",
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        client_ip = %client_ip,
        user_agent = %user_agent,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }

    response
}

/// Admission control for user-facing routes. Requests under
/// [`DEBUG_PATH_PREFIX`] pass through; they have their own budget.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path().starts_with(DEBUG_PATH_PREFIX) {
        return next.run(request).await;
    }

    admit(&limiter, request, next, "Rate limit exceeded. Try again later.").await
}

/// Admission control for the operational routes under [`DEBUG_PATH_PREFIX`],
/// backed by a separate limiter. Every other path passes through untouched.
pub async fn debug_rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with(DEBUG_PATH_PREFIX) {
        return next.run(request).await;
    }

    admit(
        &limiter,
        request,
        next,
        "Debug endpoint rate limit exceeded. Try again later.",
    )
    .await
}

async fn admit(
    limiter: &RateLimiter,
    mut request: Request,
    next: Next,
    rejection: &str,
) -> Response {
    let client_id = client_id_from_request(&request);
    let limit = HeaderValue::from(limiter.config().requests_per_second);

    if !limiter.allow(&client_id) {
        warn!(
            target: "iplocate::middleware",
            client_id = %client_id,
            path = %request.uri().path(),
            limit = limiter.config().requests_per_second,
            "Rate limit exceeded"
        );

        let mut response = ApiError::RateLimitExceeded(rejection.to_string()).into_response();
        let headers = response.headers_mut();
        headers.insert(RATE_LIMIT_LIMIT, limit);
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("0"));
        return response;
    }

    request.extensions_mut().insert(ClientId(client_id));

    let mut response = next.run(request).await;
    response.headers_mut().insert(RATE_LIMIT_LIMIT, limit);
    response
}
