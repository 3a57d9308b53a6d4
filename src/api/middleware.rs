//! API Middleware (Auth, Rate Limiting, Logging)

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::handlers::AppState;
use super::types::{ApiError, ApiResponse};

pub const API_KEY_HEADER: &str = "x-api-key";

pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 120,
            window_duration: Duration::from_secs(60),
        }
    }
}

/// Fixed-window limiter keyed by API key or client IP
pub struct RateLimiter {
    requests: DashMap<String, (u32, Instant)>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            requests: DashMap::new(),
            config,
        }
    }

    /// Returns (allowed, remaining, reset_seconds)
    pub fn check(&self, key: &str) -> (bool, u32, u64) {
        let now = Instant::now();
        let mut entry = self.requests.entry(key.to_string()).or_insert((0, now));

        if now.duration_since(entry.1) > self.config.window_duration {
            *entry = (0, now);
        }

        let reset_secs = self
            .config
            .window_duration
            .saturating_sub(now.duration_since(entry.1))
            .as_secs();

        if entry.0 >= self.config.requests_per_window {
            return (false, 0, reset_secs);
        }

        entry.0 += 1;
        (
            true,
            self.config.requests_per_window.saturating_sub(entry.0),
            reset_secs,
        )
    }

    /// Drop windows that ended long ago
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.requests.len();
        self.requests
            .retain(|_, (_, started)| now.duration_since(*started) < self.config.window_duration * 2);
        before.saturating_sub(self.requests.len())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn is_health(request: &Request) -> bool {
    matches!(request.uri().path(), "/health" | "/v1/health")
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Rejects unknown `X-API-Key` values. Requests without a key pass and
/// fall under IP rate limiting.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if is_health(&request) {
        return next.run(request).await;
    }

    if let Some(key) = api_key(request.headers()) {
        if !state.scanner.config().is_api_key_accepted(key) {
            warn!("Invalid API key attempted");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error(ApiError::unauthorized(), 0.0)),
            )
                .into_response();
        }
    }
    next.run(request).await
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if is_health(&request) {
        return next.run(request).await;
    }

    // With no configured keys any key is accepted, so only the IP counts
    let keyed = !state.scanner.config().api_keys.is_empty();
    let headers = request.headers();
    let rate_key = api_key(headers)
        .filter(|_| keyed)
        .map(|k| format!("key:{}", k))
        .unwrap_or_else(|| {
            let ip = headers
                .get("x-forwarded-for")
                .or_else(|| headers.get("x-real-ip"))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .unwrap_or("unknown");
            format!("ip:{}", ip)
        });

    let (allowed, remaining, reset) = state.rate_limiter.check(&rate_key);
    if !allowed {
        warn!(key = %rate_key, "Rate limit exceeded");
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::error(ApiError::rate_limited(reset), 0.0)),
        )
            .into_response();
        response.headers_mut().insert("retry-after", reset.into());
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-remaining", remaining.into());
    headers.insert("x-ratelimit-reset", reset.into());
    response
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Wrap client errors produced by layers or routing in the API envelope
pub async fn envelope_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() || is_json(response.headers()) {
        return response;
    }

    let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large()
    } else {
        ApiError::rejected(status)
    };
    (status, Json(ApiResponse::error(error, 0.0))).into_response()
}

pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        latency_ms = %start.elapsed().as_millis(),
        "Request completed"
    );
    response
}

/// Purge expired cache entries and stale rate-limit windows every 60 s
pub fn start_cleanup_task(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            state.scanner.cache().cleanup_expired();
            let windows = state.rate_limiter.cleanup();
            if windows > 0 {
                tracing::debug!("🧹 Dropped {} rate-limit windows", windows);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 2,
            window_duration: Duration::from_secs(60),
        });
        let (allowed, remaining, reset) = limiter.check("a");
        assert!(allowed);
        assert_eq!(remaining, 1);
        assert!(reset <= 60);
        assert_eq!(limiter_state(&limiter, "a"), 1);
        let (allowed, remaining, _) = limiter.check("a");
        assert!(allowed);
        assert_eq!(remaining, 0);
        let (allowed, _, _) = limiter.check("a");
        assert!(!allowed);
        // other keys have their own window
        assert!(limiter.check("b").0);
    }

    fn limiter_state(limiter: &RateLimiter, key: &str) -> u32 {
        limiter.requests.get(key).map(|e| e.0).unwrap_or(0)
    }

    #[test]
    fn test_rate_limiter_reset() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_millis(5),
        });
        assert!(limiter.check("a").0);
        assert!(!limiter.check("a").0);
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("a").0);
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(limiter.cleanup(), 1);
    }
}
