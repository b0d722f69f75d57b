//! Request pipeline: an ordered chain of stages around one terminal handler.
//!
//! Each stage either produces a response itself or hands the request to
//! [`Next`]. `Next` is consumed when run, so a stage can delegate at most once,
//! and every path through a stage must yield a `Response`.
//!
//! ```text
//! request → stage[0] → stage[1] → … → stage[n-1] → handler
//!                (any stage may answer instead of delegating)
//! ```

use std::fmt;
use std::sync::Arc;
use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;

/// A link in the pipeline.
pub trait Stage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Answer the request or delegate it via `next`.
    fn handle<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// The innermost handler; always answers.
pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, request: Request<Body>) -> BoxFuture<'a, Response>;
}

/// The remainder of the pipeline after the current stage.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Run the rest of the pipeline.
    pub async fn run(self, request: Request<Body>) -> Response {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                stage.handle(request, next).await
            }
            None => self.handler.call(request).await,
        }
    }
}

/// An assembled pipeline. Stages run in insertion order, outermost first.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    /// Start a pipeline that ends in `handler`.
    pub fn new(handler: impl Handler + 'static) -> Self {
        Self {
            stages: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Append a stage inside all previously added ones.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Names of the stages, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Handle a request with the full chain.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let next = Next {
            stages: &self.stages,
            handler: self.handler.as_ref(),
        };
        next.run(request).await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
