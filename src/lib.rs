pub mod client_id;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod repository;
pub mod server;
pub mod service;
pub mod token_bucket;

pub use config::Config;
pub use error::{ApiError, LookupError, Result};
pub use models::{IpValidator, Location};
pub use rate_limit_config::LimiterConfig;
pub use rate_limiter::RateLimiter;
pub use server::{create_app, AppComponents, Server};
pub use service::IpService;
