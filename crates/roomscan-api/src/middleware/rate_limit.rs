use crate::error::HttpAppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use roomscan_core::AppError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Buckets kept before expired ones are purged inline.
const MAX_BUCKETS: usize = 10_000;

#[derive(Clone)]
struct RateLimitBucket {
    count: u32,
    reset_at: Instant,
}

impl RateLimitBucket {
    fn new(window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: Instant::now() + window,
        }
    }

    fn check_and_increment(&mut self, limit: u32, window: Duration) -> Result<u32, Duration> {
        let now = Instant::now();
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + window;
        }

        if self.count < limit {
            self.count += 1;
            Ok(limit.saturating_sub(self.count))
        } else {
            Err(self.reset_at.saturating_duration_since(now))
        }
    }
}

/// Fixed-window request limiter keyed by client IP.
pub struct HttpRateLimiter {
    buckets: Mutex<HashMap<String, RateLimitBucket>>,
    limit: u32,
    window: Duration,
}

impl HttpRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            limit: limit.max(1),
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Remaining requests in the window, or the time until the window resets.
    pub async fn check(&self, key: &str) -> Result<u32, Duration> {
        let mut buckets = self.buckets.lock().await;

        if buckets.len() >= MAX_BUCKETS {
            let now = Instant::now();
            buckets.retain(|_, bucket| bucket.reset_at > now);
            tracing::debug!(remaining_buckets = buckets.len(), "Purged expired rate limit buckets");
        }

        buckets
            .entry(key.to_string())
            .or_insert_with(|| RateLimitBucket::new(self.window))
            .check_and_increment(self.limit, self.window)
    }
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}

/// Adds `X-RateLimit-*` headers and answers 429 with `Retry-After` once a client
/// exhausts its window.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<HttpRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let limit = rate_limiter.limit();

    let (mut response, remaining) = match rate_limiter.check(&key).await {
        Ok(remaining) => (next.run(request).await, remaining),
        Err(reset_in) => {
            tracing::warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
            let retry_after_secs = reset_in.as_secs().max(1);
            (
                HttpAppError(AppError::RateLimited { retry_after_secs }).into_response(),
                0,
            )
        }
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    response
}
