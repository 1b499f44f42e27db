use crate::config::Config;
use crate::error::{ErrorResponse, LookupError};
use crate::handlers::{
    debug_rate_limiter, find_country, health_check, method_not_allowed, not_found, AppState,
    SharedState,
};
use crate::middleware::{debug_rate_limit_middleware, logging_middleware, rate_limit_middleware};
use crate::rate_limit_config::LimiterConfig;
use crate::rate_limiter::RateLimiter;
use crate::repository::create_repository;
use crate::service::IpService;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Everything the router needs, built once at startup
#[derive(Clone)]
pub struct AppComponents {
    pub service: IpService,
    pub rate_limiter: RateLimiter,
    pub debug_rate_limiter: RateLimiter,
    pub request_timeout: Duration,
}

impl AppComponents {
    pub fn new(service: IpService, limits: LimiterConfig, debug_limits: LimiterConfig) -> Self {
        Self {
            service,
            rate_limiter: RateLimiter::new(limits),
            debug_rate_limiter: RateLimiter::new(debug_limits),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Build the router with all routes and middleware.
///
/// Layers run outermost first: panic recovery, tracing, request logging,
/// CORS, security headers, user-facing rate limiting, debug rate limiting,
/// request timeout.
pub fn create_app(components: AppComponents) -> Router {
    let state: SharedState = Arc::new(AppState {
        service: components.service,
        rate_limiter: components.rate_limiter.clone(),
    });

    Router::new()
        .route(
            "/v1/find-country",
            get(find_country).fallback(method_not_allowed),
        )
        .route("/health", get(health_check).fallback(method_not_allowed))
        .route(
            "/debug/rate-limiter",
            get(debug_rate_limiter).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware))
                .layer(cors_layer())
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                ))
                .layer(middleware::from_fn_with_state(
                    components.rate_limiter,
                    rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    components.debug_rate_limiter,
                    debug_rate_limit_middleware,
                ))
                .layer(TimeoutLayer::new(components.request_timeout)),
        )
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(Duration::from_secs(3600))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message
    } else {
        "unknown panic"
    };

    error!(panic = %detail, "Recovered from panic while handling request");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}

pub struct Server {
    app: Router,
    addr: SocketAddr,
    components: AppComponents,
}

impl Server {
    /// Load the location table and assemble the application.
    pub fn new(config: &Config) -> Result<Self, LookupError> {
        let repository = create_repository(&config.database())?;
        repository.initialize()?;

        let mut components = AppComponents::new(
            IpService::new(repository),
            config.rate_limit(),
            config.debug_rate_limit(),
        );
        components.request_timeout = config.request_timeout();

        Ok(Self {
            app: create_app(components.clone()),
            addr: config.bind_addr(),
            components,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        let cleanup_tasks = [
            self.components.rate_limiter.start_cleanup_task(),
            self.components.debug_rate_limiter.start_cleanup_task(),
        ];

        info!("Server listening on {}", listener.local_addr()?);
        info!("Lookup available at /v1/find-country?ip=<address>");
        info!("Health check available at /health");

        // Run server with graceful shutdown
        let result = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        for task in cleanup_tasks {
            task.abort();
        }
        self.components.service.close();
        info!("Server exited gracefully");

        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
