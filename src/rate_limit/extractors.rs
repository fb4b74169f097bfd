use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

pub const UNKNOWN_IP: &str = "unknown";

/// Caller address used as the rate-limit key.
///
/// Taken from `X-Forwarded-For` (first hop), then `X-Real-IP`, then
/// `X-Connecting-IP`. Requests carrying none of these share the `"unknown"` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let first_forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let ip = first_forwarded
            .or_else(|| header_str(headers, "x-real-ip"))
            .or_else(|| header_str(headers, "x-connecting-ip"))
            .unwrap_or(UNKNOWN_IP);

        ClientIp(ip.to_string())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp::from_headers(&parts.headers))
    }
}
