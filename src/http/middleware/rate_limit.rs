//! Admission control stage.

use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;

use crate::http::pipeline::{Next, Stage};
use crate::observability::metrics;
use crate::security::headers::resolve_client_key;
use crate::security::registry::KeyedLimiterRegistry;

/// Consults the client's token bucket; answers 429 when it is empty.
#[derive(Debug, Clone)]
pub struct RateLimit {
    registry: Arc<KeyedLimiterRegistry>,
}

impl RateLimit {
    pub fn new(registry: Arc<KeyedLimiterRegistry>) -> Self {
        Self { registry }
    }
}

impl Stage for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn handle<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut request = request;
            let key = match resolve_client_key(&mut request) {
                Ok(key) => key,
                Err(e) => {
                    tracing::error!(error = %e, "Cannot derive client key");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
                }
            };

            let bucket = self.registry.get_or_create(&key);
            if bucket.consult() {
                tracing::trace!(client = %key, remaining = bucket.available_tokens(), "Request admitted");
                next.run(request).await
            } else {
                tracing::warn!(client = %key, "Rate limit exceeded");
                metrics::record_rate_limited();
                (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response()
            }
        })
    }
}
