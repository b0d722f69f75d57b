//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (derive client key once: X-Forwarded-For, else peer IP)
//!     → registry.rs (look up or create the key's bucket)
//!     → rate_limit.rs (refill + take one token)
//!     → allow (delegate) or deny (429)
//!
//! Background:
//!     registry.rs eviction task drops buckets idle past the cleanup interval
//! ```
//!
//! # Design Decisions
//! - An unknown key behaves as a full bucket, never as a denial
//! - Rate limit history is not kept across eviction

pub mod headers;
pub mod rate_limit;
pub mod registry;

pub use headers::{client_key, resolve_client_key, AddressParseError, ClientKey};
pub use rate_limit::{BucketParams, LimiterError, TokenBucket};
pub use registry::KeyedLimiterRegistry;
