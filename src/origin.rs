// origin.rs
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use http::{request::Parts, HeaderMap};

pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Proxy headers consulted in order. `x-forwarded-for` may carry a chain,
/// of which only the first hop (the client) is used.
const FORWARDED_FOR: &str = "x-forwarded-for";
const PROXY_HEADERS: [&str; 2] = ["cf-connecting-ip", "x-real-ip"];

/// Address a vote request came from, as far as the proxies tell us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    ip: String,
}

impl RequestOrigin {
    pub fn new(ip: impl Into<String>) -> Self {
        RequestOrigin { ip: ip.into() }
    }

    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = header(headers, FORWARDED_FOR)
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());

        let ip = forwarded
            .or_else(|| PROXY_HEADERS.iter().find_map(|&name| header(headers, name)))
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());

        RequestOrigin { ip }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(RequestOrigin::resolve(&parts.headers, peer))
    }
}
