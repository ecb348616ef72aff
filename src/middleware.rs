//! Axum middleware enforcing a [`RateLimiter`] per caller identity.
//!
//! Denied requests get `429 Too Many Requests` with a JSON body
//!
//! ```json
//! { "success": false, "error": { "code": "RATE_LIMIT_EXCEEDED", "message": "...", "retryAfter": 42 } }
//! ```
//!
//! and the headers `X-RateLimit-Limit`, `X-RateLimit-Remaining`,
//! `X-RateLimit-Reset` and `Retry-After`. Allowed requests are forwarded and
//! the three `X-RateLimit-*` headers are copied onto the handler's response.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::rate_limit::{RateLimitResult, RateLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Fallback `Retry-After` when a denial carries no explicit value.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Maps request headers to the key the limiter counts against.
pub type IdentityFn = Arc<dyn Fn(&HeaderMap) -> String + Send + Sync>;

/// State for [`rate_limit`]: the limiter and how to identify callers.
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    identify: IdentityFn,
}

impl RateLimitGuard {
    /// Guard using [`default_identity`].
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            identify: Arc::new(default_identity),
        }
    }

    pub fn with_identity<F>(limiter: Arc<RateLimiter>, identify: F) -> Self
    where
        F: Fn(&HeaderMap) -> String + Send + Sync + 'static,
    {
        Self {
            limiter,
            identify: Arc::new(identify),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// `user:<x-user-id>`, else `ip:` with the first `x-forwarded-for` entry,
/// then `x-real-ip`, then `unknown`.
pub fn default_identity(headers: &HeaderMap) -> String {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(user) = header_str("x-user-id") {
        return format!("user:{}", user);
    }

    let ip = header_str("x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str("x-real-ip"))
        .unwrap_or("unknown");
    format!("ip:{}", ip)
}

/// Middleware function; install with `middleware::from_fn_with_state(guard, rate_limit)`.
pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    let identity = (guard.identify)(request.headers());
    let result = guard.limiter.check(&identity);

    if !result.success {
        tracing::warn!(identity = %identity, path = %request.uri().path(), "request rate limited");
        return denied(&result);
    }

    let mut response = next.run(request).await;
    set_limit_headers(response.headers_mut(), &result);
    response
}

fn denied(result: &RateLimitResult) -> Response {
    let retry_after = result
        .error
        .as_ref()
        .map(|e| e.retry_after)
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    let body = serde_json::json!({
        "success": false,
        "error": result.error,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    set_limit_headers(headers, result);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

fn set_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset));
}
