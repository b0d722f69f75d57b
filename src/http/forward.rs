//! Request forwarding to the origin.
//!
//! # Responsibilities
//! - Build the outbound request (origin base + inbound path and query)
//! - Copy inbound headers with append semantics, overwrite `X-Forwarded-For`
//! - Dispatch through a pooled client with a response-header deadline
//! - Relay status, headers and a streamed body back to the client
//!
//! # Design Decisions
//! - Request and response bodies are streamed, never buffered, so nothing is retried
//! - The inbound `Host` header is dropped; the client sets it from the origin authority
//! - A body error after headers are committed cannot be reported to the client;
//!   it is logged and the stream is cut short

use std::time::Duration;
use axum::{
    body::Body,
    http::{header, uri::PathAndQuery, Request, Response, StatusCode, Uri},
    response::IntoResponse,
};
use futures_util::TryStreamExt;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::{TokioExecutor, TokioTimer},
};
use tokio::time;

use crate::config::OriginConfig;
use crate::observability::metrics;
use crate::security::headers::{client_key, set_forwarded_for, AddressParseError};

/// Pooled HTTP client used to reach the origin.
pub type OriginClient = Client<HttpConnector, Body>;

/// Forwarding failure, each mapped to a terminal status code.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error(transparent)]
    AddressParse(#[from] AddressParseError),

    #[error("failed to build origin request: {0}")]
    RequestBuild(String),

    #[error("origin request failed: {0}")]
    OriginTransport(#[source] hyper_util::client::legacy::Error),

    #[error("origin did not respond within {0:?}")]
    OriginTimeout(Duration),

    #[error("failed to relay response body: {0}")]
    ResponseRelay(String),
}

impl ForwardError {
    /// Status code returned to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::AddressParse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForwardError::RequestBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForwardError::OriginTransport(_) => StatusCode::BAD_GATEWAY,
            ForwardError::OriginTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::ResponseRelay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::AddressParse(_) => "address_parse",
            ForwardError::RequestBuild(_) => "request_build",
            ForwardError::OriginTransport(_) => "transport",
            ForwardError::OriginTimeout(_) => "timeout",
            ForwardError::ResponseRelay(_) => "relay",
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (status, status.canonical_reason().unwrap_or("Error")).into_response()
    }
}

/// Forwards admitted requests to the single configured origin.
#[derive(Clone)]
pub struct RequestForwarder {
    client: OriginClient,
    origin: String,
    timeout: Duration,
}

impl RequestForwarder {
    /// Create a forwarder with its own connection pool.
    pub fn new(config: &OriginConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(HttpConnector::new());

        Self {
            client,
            origin: normalize_origin(&config.url),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Origin base URL without a trailing slash.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Response-header deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Turn an inbound request into the request sent to the origin.
    ///
    /// The body is moved, not read.
    pub fn build_request(&self, request: Request<Body>) -> Result<Request<Body>, ForwardError> {
        let client = client_key(&request)?;
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or_else(|| parts.uri.path());
        let target = format!("{}{}", self.origin, path_and_query);
        let uri: Uri = target
            .parse()
            .map_err(|e| ForwardError::RequestBuild(format!("invalid target {:?}: {}", target, e)))?;

        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(body)
            .map_err(|e| ForwardError::RequestBuild(e.to_string()))?;

        let headers = outbound.headers_mut();
        for (name, value) in parts.headers.iter() {
            if name == header::HOST {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        set_forwarded_for(headers, &client)?;

        Ok(outbound)
    }

    /// Forward a request and return the origin's response with a streamed body.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let outbound = self.build_request(request)?;
        let target = outbound.uri().to_string();

        tracing::debug!(target = %target, method = %outbound.method(), "Forwarding to origin");

        let response = match time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ForwardError::OriginTransport(e)),
            Err(_) => return Err(ForwardError::OriginTimeout(self.timeout)),
        };

        tracing::debug!(target = %target, status = %response.status(), "Origin responded");
        Ok(relay(response, target))
    }
}

// Punycode hosts and percent-encode the path so every target parses as a `Uri`.
// An unparseable origin is kept verbatim; validation rejects it before startup.
fn normalize_origin(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(url) => url.as_str().trim_end_matches('/').to_string(),
        Err(_) => raw.trim_end_matches('/').to_string(),
    }
}

fn relay(response: Response<Incoming>, target: String) -> Response<Body> {
    let (parts, body) = response.into_parts();
    let stream = Body::new(body).into_data_stream().inspect_err(move |e| {
        let error = ForwardError::ResponseRelay(e.to_string());
        metrics::record_origin_error(error.kind());
        tracing::warn!(target = %target, error = %error, "Response truncated");
    });
    Response::from_parts(parts, Body::from_stream(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use axum::extract::ConnectInfo;
    use axum::http::{HeaderValue, Method};

    fn forwarder(url: &str) -> RequestForwarder {
        RequestForwarder::new(&OriginConfig {
            url: url.to_string(),
            ..OriginConfig::default()
        })
    }

    fn inbound(uri: &str) -> Request<Body> {
        let peer: SocketAddr = "198.51.100.4:40000".parse().unwrap();
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::HOST, "proxy.local")
            .header("x-test", "a")
            .header("x-test", "b")
            .body(Body::from("payload"))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[test]
    fn builds_target_with_path_and_query() {
        let out = forwarder("http://127.0.0.1:3000/")
            .build_request(inbound("/items?x=1"))
            .unwrap();
        assert_eq!(out.uri(), "http://127.0.0.1:3000/items?x=1");
        assert_eq!(out.method(), Method::POST);
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let out = forwarder("http://origin.internal/api")
            .build_request(inbound("/v1/users"))
            .unwrap();
        assert_eq!(out.uri(), "http://origin.internal/api/v1/users");
    }

    #[test]
    fn origin_is_normalized_before_joining() {
        let idn = forwarder("http://bücher.example").build_request(inbound("/x")).unwrap();
        assert_eq!(idn.uri(), "http://xn--bcher-kva.example/x");

        let spaced = forwarder("http://origin.internal/a b/").build_request(inbound("/x?q=1")).unwrap();
        assert_eq!(spaced.uri(), "http://origin.internal/a%20b/x?q=1");
    }

    #[test]
    fn validated_origins_always_build() {
        use crate::config::{validation::validate_config, ProxyConfig};

        for url in ["http://bücher.example", "http://origin.internal/a b", "http://127.0.0.1:3000/"] {
            let mut config = ProxyConfig::default();
            config.origin.url = url.to_string();
            assert!(validate_config(&config).is_ok(), "{} should validate", url);

            let result = RequestForwarder::new(&config.origin).build_request(inbound("/x"));
            assert!(result.is_ok(), "{} should build: {:?}", url, result.err());
        }
    }

    #[test]
    fn headers_are_appended_and_forwarded_for_overwritten() {
        let mut request = inbound("/");
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1, 10.0.0.2"));

        let out = forwarder("http://127.0.0.1:3000").build_request(request).unwrap();

        let values: Vec<_> = out.headers().get_all("x-test").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
        let xff: Vec<_> = out.headers().get_all("x-forwarded-for").iter().collect();
        assert_eq!(xff, vec!["203.0.113.1"]);
        assert!(out.headers().get(header::HOST).is_none());
    }

    #[test]
    fn forwarded_for_defaults_to_peer() {
        let out = forwarder("http://127.0.0.1:3000").build_request(inbound("/")).unwrap();
        assert_eq!(out.headers()["x-forwarded-for"], "198.51.100.4");
    }

    #[test]
    fn resolved_key_becomes_forwarded_for() {
        let mut request = inbound("/");
        request
            .extensions_mut()
            .insert(crate::security::headers::ClientKey("203.0.113.77".to_string()));
        let out = forwarder("http://127.0.0.1:3000").build_request(request).unwrap();
        assert_eq!(out.headers()["x-forwarded-for"], "203.0.113.77");
    }

    #[test]
    fn missing_peer_is_address_error() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let err = forwarder("http://127.0.0.1:3000").build_request(request).unwrap_err();
        assert!(matches!(err, ForwardError::AddressParse(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ForwardError::OriginTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ForwardError::RequestBuild("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn refused_connection_is_bad_gateway() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = forwarder(&format!("http://{}", addr))
            .forward(inbound("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::OriginTransport(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
