//! Panic isolation stage.
//!
//! A panic in any stage nested inside this one becomes a 500 response instead
//! of tearing down the connection task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{future::BoxFuture, FutureExt};

use crate::http::pipeline::{Next, Stage};
use crate::security::headers::resolve_client_key;

#[derive(Debug, Clone, Copy, Default)]
pub struct PanicRecovery;

impl Stage for PanicRecovery {
    fn name(&self) -> &'static str {
        "panic_recovery"
    }

    fn handle<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut request = request;
            let method = request.method().clone();
            let path = request.uri().path().to_string();
            let client = resolve_client_key(&mut request).ok();

            match AssertUnwindSafe(next.run(request)).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    tracing::error!(
                        method = %method,
                        path = %path,
                        client = client.as_deref().unwrap_or("unknown"),
                        panic = %panic_message(panic.as_ref()),
                        "Recovered from panic"
                    );
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
