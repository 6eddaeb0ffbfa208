use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;

/// Per-client sliding-window rate limiter. One instance per route class;
/// state is a timestamp queue per client key.
#[derive(Clone)]
pub struct RateLimiter {
    max: usize,
    window: Duration,
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records a hit for `key`, or returns the seconds until the window
    /// frees up when the client is over its quota.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);

        // Keys are client-supplied, so the sweep covers the whole map:
        // an entry whose window has fully expired is dropped, not kept
        // around as an empty queue.
        hits.retain(|_, queue| {
            while let Some(front) = queue.front() {
                if now.duration_since(*front) >= self.window {
                    queue.pop_front();
                } else {
                    break;
                }
            }
            !queue.is_empty()
        });

        let queue = hits.entry(key.to_string()).or_default();

        if queue.len() >= self.max {
            let oldest = queue.front().copied().unwrap_or(now);
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        queue.push_back(now);
        Ok(())
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Both limited route classes (auth, message send) are mutations; reads on
/// the same paths are never limited.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if req.method() != axum::http::Method::POST {
        return Ok(next.run(req).await);
    }

    let key = client_key(&req);

    limiter.check(&key).map_err(|retry_after| {
        warn!(client = %key, path = %req.uri().path(), "rate limit exceeded");
        ApiError::RateLimited { retry_after }
    })?;

    Ok(next.run(req).await)
}

/// Client key for limiting: forwarded address when behind a proxy, else the
/// peer address.
fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        return forwarded.trim().to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").is_ok());
        }
        let retry_after = limiter.check("1.2.3.4").unwrap_err();
        assert!(retry_after >= 1);

        // A different client is unaffected.
        assert!(limiter.check("5.6.7.8").is_ok());
    }

    #[test]
    fn window_expiry_frees_the_quota() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));

        assert!(limiter.check("1.2.3.4").is_ok());
        assert!(limiter.check("1.2.3.4").is_err());

        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("1.2.3.4").is_ok());
    }

    #[test]
    fn expired_clients_are_dropped_from_the_map() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));

        for i in 0..50 {
            assert!(limiter.check(&format!("10.0.0.{i}")).is_ok());
        }
        assert_eq!(limiter.tracked_clients(), 50);

        // Once every window has lapsed, the next check sweeps all of them.
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("10.1.0.1").is_ok());
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
