//! Request logging stage.

use std::time::Instant;
use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;
use tracing::Instrument;

use crate::http::pipeline::{Next, Stage};
use crate::observability::metrics;

/// Logs receipt and completion of every request. Never alters the response.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging;

impl Stage for Logging {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn handle<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let span = tracing::info_span!("request", method = %method, path = %path);

        Box::pin(
            async move {
                let start = Instant::now();
                tracing::info!("Received request");

                let response = next.run(request).await;

                let status = response.status().as_u16();
                tracing::info!(
                    status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Completed request"
                );
                metrics::record_request(method.as_str(), status, start);
                response
            }
            .instrument(span),
        )
    }
}
