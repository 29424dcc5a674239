//! Per-IP fixed-window request limiting
//!
//! Boundary policy, not core validation: the API surface gets a coarse
//! request budget per client IP and window, the miner endpoints a tighter
//! one. Windows reset lazily on access; stale buckets are pruned when the
//! table grows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::net::SocketAddr;

use crate::registry::now_ms;

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug)]
struct Bucket {
    window_start: i64,
    count: u32,
}

/// Fixed-window counter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    window_ms: i64,
    max_requests: u32,
    message: Arc<str>,
    hits: Arc<AtomicU64>,
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_requests: u32, message: &str) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            window_ms,
            max_requests,
            message: Arc::from(message),
            hits: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns false when the caller is over budget for the current window.
    pub fn check(&self, key: &str) -> bool {
        let now = now_ms();
        let mut buckets = self.buckets.lock().expect("rate limiter lock");

        if buckets.len() > PRUNE_THRESHOLD {
            let window = self.window_ms;
            buckets.retain(|_, b| now - b.window_start < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });
        if now - bucket.window_start >= self.window_ms {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;
        if bucket.count > self.max_requests {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Requests rejected by this limiter since startup.
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

/// Client IP: X-Forwarded-For first hop, else the socket peer address.
pub fn client_ip(headers: &axum::http::HeaderMap, extensions: &axum::http::Extensions) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn user_agent(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Axum middleware: 429 with the limiter's message when over budget.
pub async fn enforce(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), request.extensions());
    if !limiter.check(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": limiter.message.as_ref() })),
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new(60_000, 3, "slow down");
        assert!(limiter.check("1.1.1.1"));
        assert!(limiter.check("1.1.1.1"));
        assert!(limiter.check("1.1.1.1"));
        assert!(!limiter.check("1.1.1.1"));
        assert_eq!(limiter.hit_count(), 1);
        // Other clients have their own budget
        assert!(limiter.check("2.2.2.2"));
    }

    #[test]
    fn window_resets() {
        // Zero-length window: every request starts a fresh window
        let limiter = RateLimiter::new(0, 1, "slow down");
        assert!(limiter.check("1.1.1.1"));
        assert!(limiter.check("1.1.1.1"));
        assert!(limiter.check("1.1.1.1"));
        assert_eq!(limiter.hit_count(), 0);
    }

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-forwarded-for", "9.8.7.6, 10.0.0.1".parse().unwrap());
        let extensions = axum::http::Extensions::new();
        assert_eq!(client_ip(&headers, &extensions), "9.8.7.6");

        let empty = axum::http::HeaderMap::new();
        assert_eq!(client_ip(&empty, &extensions), "unknown");
    }
}
