//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → optional TOML file (loader.rs)
//!     → environment overrides (PORT, ORIGIN_SERVER_URL, RATE_LIMIT_*; .env merged first)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → passed by reference into subsystem constructors
//! ```
//!
//! # Design Decisions
//! - One explicit config value built at startup; no global state
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigError, load_config, load_dotenv, load_effective_config};
pub use schema::ProxyConfig;
pub use schema::ListenerConfig;
pub use schema::OriginConfig;
pub use schema::RateLimitConfig;
pub use schema::ObservabilityConfig;
pub use schema::LogFormat;
pub use validation::ValidationError;
