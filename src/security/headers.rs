//! Client identity and forwarding headers.
//!
//! # Responsibilities
//! - Derive the client key used for rate limiting and `X-Forwarded-For`
//! - Apply the `X-Forwarded-For` overwrite policy on outbound requests
//!
//! # Design Decisions
//! - The first `X-Forwarded-For` element wins; the socket address is the fallback
//! - Outbound `X-Forwarded-For` carries a single value (one upstream hop is modelled)

use std::net::SocketAddr;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderValue, Request};

/// Header carrying the originating client address.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The client address could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot determine client address: {0}")]
pub struct AddressParseError(pub String);

/// First comma-separated `X-Forwarded-For` value, trimmed.
///
/// Returns `None` when the header is absent, not valid UTF-8, or its first element is blank.
pub fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first)
    }
}

/// Derive the client key from headers and the peer socket address.
pub fn derive_client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<String, AddressParseError> {
    if let Some(forwarded) = forwarded_for(headers) {
        return Ok(forwarded.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
        .ok_or_else(|| AddressParseError("no X-Forwarded-For header and no peer address".to_string()))
}

/// Client key resolved earlier in the pipeline, carried as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

/// Client key for a request served with connect info.
///
/// A key already resolved by [`resolve_client_key`] is returned as is.
pub fn client_key<B>(request: &Request<B>) -> Result<String, AddressParseError> {
    if let Some(ClientKey(key)) = request.extensions().get::<ClientKey>() {
        return Ok(key.clone());
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    derive_client_key(request.headers(), peer)
}

/// Derive the client key and cache it on the request for later stages.
pub fn resolve_client_key<B>(request: &mut Request<B>) -> Result<String, AddressParseError> {
    let key = client_key(request)?;
    request.extensions_mut().insert(ClientKey(key.clone()));
    Ok(key)
}

/// Overwrite `X-Forwarded-For` with the single resolved client address.
pub fn set_forwarded_for(headers: &mut HeaderMap, client: &str) -> Result<(), AddressParseError> {
    let value = HeaderValue::from_str(client)
        .map_err(|_| AddressParseError(format!("client address {:?} is not a valid header value", client)))?;
    headers.insert(X_FORWARDED_FOR, value);
    Ok(())
}
