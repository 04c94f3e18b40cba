//! Fixed-window, per-client request limiter for the analysis endpoint.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use parking_lot::Mutex;

/// Windows this old are dropped on the next sweep.
const SWEEP_AFTER: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one request for `client`. `Err` carries the seconds until the
    /// current window closes.
    pub fn check(&self, client: &str) -> Result<(), u64> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Result<(), u64> {
        let mut clients = self.clients.lock();
        if clients.len() > 10_000 {
            clients.retain(|_, w| now.duration_since(w.started) < SWEEP_AFTER);
        }
        let w = clients.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(w.started) >= self.window {
            *w = Window {
                started: now,
                count: 0,
            };
        }
        if w.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(w.started));
            return Err(remaining.as_secs().max(1));
        }
        w.count += 1;
        Ok(())
    }
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, else a shared bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_limit_per_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_ok());
        assert!(limiter.check_at("a", t0).is_ok());
        let retry = limiter.check_at("a", t0 + Duration::from_secs(15)).unwrap_err();
        assert_eq!(retry, 45);
        // Other clients are independent.
        assert!(limiter.check_at("b", t0).is_ok());
        // Window rolls over.
        assert!(limiter.check_at("a", t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.check_at("a", t0).unwrap();
        let retry = limiter
            .check_at("a", t0 + Duration::from_millis(59_900))
            .unwrap_err();
        assert_eq!(retry, 1);
    }

    #[test]
    fn test_client_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "unknown");
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_key(&headers), "10.0.0.2");
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7, 10.0.0.1"));
        assert_eq!(client_key(&headers), "203.0.113.7");
    }
}
