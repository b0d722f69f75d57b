//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum catch-all route, peer address attached)
//!     → pipeline.rs (ordered stages)
//!         → middleware/logging.rs
//!         → middleware/recovery.rs
//!         → middleware/rate_limit.rs (429 on empty bucket)
//!         → middleware/forward.rs
//!             → forward.rs (build, dispatch, stream back)
//!     → Send to client
//! ```

pub mod forward;
pub mod middleware;
pub mod pipeline;
pub mod server;

pub use forward::{ForwardError, RequestForwarder};
pub use pipeline::{Handler, Next, Pipeline, Stage};
pub use server::{HttpServer, ServerError};
