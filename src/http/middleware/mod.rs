//! Pipeline stages.
//!
//! Fixed order, outermost first:
//! ```text
//! Logging → PanicRecovery → RateLimit (optional) → Forward
//! ```

pub mod forward;
pub mod logging;
pub mod rate_limit;
pub mod recovery;

use std::sync::Arc;

pub use forward::Forward;
pub use logging::Logging;
pub use rate_limit::RateLimit;
pub use recovery::PanicRecovery;

use crate::http::forward::RequestForwarder;
use crate::http::pipeline::Pipeline;
use crate::security::registry::KeyedLimiterRegistry;

/// Assemble the proxy pipeline. Without a registry the RateLimit stage is left out.
pub fn build_pipeline(registry: Option<Arc<KeyedLimiterRegistry>>, forwarder: RequestForwarder) -> Pipeline {
    let pipeline = Pipeline::new(Forward::new(forwarder))
        .stage(Logging)
        .stage(PanicRecovery);

    match registry {
        Some(registry) => pipeline.stage(RateLimit::new(registry)),
        None => pipeline,
    }
}
