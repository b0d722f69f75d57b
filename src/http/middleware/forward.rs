//! Terminal stage: hand the request to the forwarder.

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;

use crate::http::forward::RequestForwarder;
use crate::http::pipeline::Handler;
use crate::observability::metrics;
use crate::security::headers::client_key;

/// Writes the origin's response, or the status mapped from a forwarding failure.
#[derive(Clone)]
pub struct Forward {
    forwarder: RequestForwarder,
}

impl Forward {
    pub fn new(forwarder: RequestForwarder) -> Self {
        Self { forwarder }
    }
}

impl Handler for Forward {
    fn call<'a>(&'a self, request: Request<Body>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();
            let client = client_key(&request).ok();

            match self.forwarder.forward(request).await {
                Ok(response) => response.into_response(),
                Err(e) => {
                    tracing::error!(
                        method = %method,
                        path = %path,
                        client = client.as_deref().unwrap_or("unknown"),
                        status = e.status().as_u16(),
                        error = %e,
                        "Forwarding failed"
                    );
                    metrics::record_origin_error(e.kind());
                    e.into_response()
                }
            }
        })
    }
}
