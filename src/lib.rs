//! Per-client rate-limiting reverse proxy for a single origin.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{KeyedLimiterRegistry, TokenBucket};
