//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the limiter registry, forwarder and pipeline from config
//! - Create the Axum router with a single catch-all route
//! - Serve with peer address info until shutdown
//! - Own the limiter eviction task and stop it with the server

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::http::forward::RequestForwarder;
use crate::http::middleware::build_pipeline;
use crate::http::pipeline::Pipeline;
use crate::security::rate_limit::LimiterError;
use crate::security::registry::KeyedLimiterRegistry;

/// Error type for server construction and serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    registry: Option<Arc<KeyedLimiterRegistry>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails when rate limiting is enabled with a non-positive rate or burst.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let registry = if config.rate_limit.enabled {
            Some(Arc::new(KeyedLimiterRegistry::from_config(&config.rate_limit)?))
        } else {
            tracing::info!("Rate limiting disabled");
            None
        };

        let forwarder = RequestForwarder::new(&config.origin);
        let pipeline = Arc::new(build_pipeline(registry.clone(), forwarder));
        tracing::debug!(stages = ?pipeline.stage_names(), origin = %config.origin.url, "Pipeline assembled");

        let router = Self::build_router(pipeline);
        Ok(Self {
            router,
            config,
            registry,
        })
    }

    fn build_router(pipeline: Arc<Pipeline>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(pipeline)
    }

    /// The router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The limiter registry, when rate limiting is enabled.
    pub fn registry(&self) -> Option<&Arc<KeyedLimiterRegistry>> {
        self.registry.as_ref()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.config.origin.url,
            "HTTP server starting"
        );

        let eviction = self
            .registry
            .as_ref()
            .map(|registry| registry.spawn_eviction(shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        if let Some(handle) = eviction {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Limiter eviction task failed");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: every method and path goes through the pipeline.
async fn proxy_handler(State(pipeline): State<Arc<Pipeline>>, request: Request<Body>) -> Response {
    pipeline.handle(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ConnectInfo;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn config(enabled: bool) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.rate_limit.enabled = enabled;
        config.rate_limit.requests_per_second = 1.0;
        config.rate_limit.burst_size = 1;
        config
    }

    #[test]
    fn invalid_limiter_aborts_construction() {
        let mut config = config(true);
        config.rate_limit.burst_size = 0;
        assert!(matches!(HttpServer::new(config), Err(ServerError::Limiter(_))));
    }

    #[test]
    fn disabled_limiter_skips_registry() {
        let server = HttpServer::new(config(false)).unwrap();
        assert!(server.registry().is_none());
    }

    #[tokio::test]
    async fn denial_short_circuits_before_origin() {
        let server = HttpServer::new(config(true)).unwrap();
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        // Spend the single token.
        server.registry().unwrap().get_or_create("127.0.0.1").consult();

        let mut request = Request::builder().uri("/anything").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
