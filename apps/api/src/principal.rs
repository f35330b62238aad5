//! Request principal resolution.
//!
//! Authenticated callers arrive with an `x-user-id` header set by the
//! upstream identity layer. Everyone else is tracked under a best-effort
//! fingerprint of proxy-forwarded address plus a truncated client string.
//! The fingerprint is deliberately weak (collisions are acceptable) and
//! never persisted.

use std::fmt;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::USER_AGENT, request::Parts, HeaderMap};
use uuid::Uuid;

use crate::errors::AppError;

/// Longest user-agent prefix folded into a fingerprint.
const FINGERPRINT_UA_LEN: usize = 50;

/// The identity usage is tracked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(Uuid),
    Anonymous(String),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(id) => write!(f, "user:{id}"),
            Principal::Anonymous(fp) => write!(f, "anon:{fp}"),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(raw) = parts.headers.get("x-user-id") {
            let raw = raw.to_str().map_err(|_| {
                AppError::InvalidPrincipal("x-user-id header is not valid UTF-8".to_string())
            })?;
            let id = raw.trim().parse::<Uuid>().map_err(|_| {
                AppError::InvalidPrincipal(format!("x-user-id is not a valid UUID: {raw}"))
            })?;
            return Ok(Principal::User(id));
        }
        Ok(Principal::Anonymous(fingerprint(&parts.headers)))
    }
}

/// Derives the anonymous fingerprint from forwarded-address headers and a
/// truncated user-agent. Precedence: first `x-forwarded-for` hop, then
/// `x-real-ip`, then `cf-connecting-ip`, else "unknown".
pub fn fingerprint(headers: &HeaderMap) -> String {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .or_else(|| headers.get("cf-connecting-ip").and_then(|v| v.to_str().ok()))
        .unwrap_or("unknown");

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let ua_prefix: String = user_agent.chars().take(FINGERPRINT_UA_LEN).collect();

    format!("{ip}-{ua_prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
            ("user-agent", "curl/8.0"),
        ]);
        assert_eq!(fingerprint(&map), "203.0.113.7-curl/8.0");
    }

    #[test]
    fn test_falls_back_through_address_headers() {
        let map = headers(&[("x-real-ip", "198.51.100.2"), ("user-agent", "curl/8.0")]);
        assert_eq!(fingerprint(&map), "198.51.100.2-curl/8.0");

        let map = headers(&[("cf-connecting-ip", "192.0.2.9"), ("user-agent", "curl/8.0")]);
        assert_eq!(fingerprint(&map), "192.0.2.9-curl/8.0");
    }

    #[test]
    fn test_missing_headers_fingerprint_as_unknown() {
        let map = headers(&[]);
        assert_eq!(fingerprint(&map), "unknown-unknown");
    }

    #[test]
    fn test_user_agent_truncated_to_fifty_chars() {
        let long_ua = "x".repeat(200);
        let map = headers(&[("x-real-ip", "192.0.2.1"), ("user-agent", &long_ua)]);
        let fp = fingerprint(&map);
        assert_eq!(fp, format!("192.0.2.1-{}", "x".repeat(50)));
    }

    #[test]
    fn test_empty_forwarded_for_is_skipped() {
        let map = headers(&[
            ("x-forwarded-for", ""),
            ("x-real-ip", "198.51.100.2"),
            ("user-agent", "curl/8.0"),
        ]);
        assert_eq!(fingerprint(&map), "198.51.100.2-curl/8.0");
    }

    #[test]
    fn test_display_distinguishes_principal_kinds() {
        let user = Principal::User(Uuid::nil());
        assert_eq!(
            user.to_string(),
            "user:00000000-0000-0000-0000-000000000000"
        );
        let anon = Principal::Anonymous("192.0.2.1-curl".to_string());
        assert_eq!(anon.to_string(), "anon:192.0.2.1-curl");
        assert!(anon.is_anonymous());
        assert!(!user.is_anonymous());
    }
}
