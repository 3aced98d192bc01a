use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

/// Fixed one-second window shared by every route it wraps.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    window: Arc<Mutex<Window>>,
}

impl RateLimiter {
    fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            window: Arc::new(Mutex::new(Window {
                start: Instant::now(),
                count: 0,
            })),
        }
    }

    /// Ok when the request fits the current window, otherwise the time
    /// left until the window rolls over.
    fn check(&self, now: Instant) -> Result<(), Duration> {
        let mut window = self.window.lock().expect("rate limiter mutex poisoned");
        let elapsed = now.saturating_duration_since(window.start);
        if elapsed >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            Ok(())
        } else {
            Err(WINDOW.saturating_sub(elapsed))
        }
    }
}

pub async fn rps_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Err(retry_after) = limiter.check(Instant::now()) {
        tracing::warn!(path = %req.uri().path(), "rate limit exceeded");
        let secs = retry_after.as_secs().max(1);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate_limit_exceeded", "kind": "rate_limited" })),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        return response;
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32) -> RateLimiter {
    RateLimiter::new(rps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_admits_rps_requests_then_resets() {
        let limiter = new_rps_state(2);
        let t0 = Instant::now();
        assert!(limiter.check(t0).is_ok());
        assert!(limiter.check(t0).is_ok());
        assert!(limiter.check(t0).is_err());
        assert!(limiter.check(t0 + Duration::from_millis(1001)).is_ok());
    }

    #[test]
    fn zero_rps_still_admits_one() {
        let limiter = new_rps_state(0);
        let t0 = Instant::now();
        assert!(limiter.check(t0).is_ok());
        assert!(limiter.check(t0).is_err());
    }
}
