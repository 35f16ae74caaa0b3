//! Fixed-window request budgets keyed by caller address.
//!
//! Two windows are tracked per key: a daily quota and a per-minute quota.
//! Each window starts at the first request seen for that key and resets once
//! its length has elapsed. State lives in memory only.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use crate::error::AppError;

/// Keys seen before the map is swept for expired windows.
const SWEEP_THRESHOLD: usize = 4096;

/// Minimum time between two sweeps.
const SWEEP_INTERVAL_SECS: i64 = 60;

/// Bucket for requests that arrive without connection info.
pub const UNKNOWN_CALLER: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    /// Human description of the exhausted budget, e.g. "10 per 1 minute".
    pub limit: String,
    /// Seconds until the exhausted window resets.
    pub retry_after: u64,
}

impl From<RateLimitExceeded> for AppError {
    fn from(e: RateLimitExceeded) -> Self {
        AppError::RateLimited { limit: e.limit, retry_after: e.retry_after }
    }
}

pub trait RateLimiter: Send + Sync {
    /// Records one request for `key`, or rejects it without counting.
    fn check(&self, key: &str) -> Result<(), RateLimitExceeded>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

impl Window {
    fn new(now: DateTime<Utc>) -> Self {
        Self { started: now, count: 0 }
    }

    fn roll(&mut self, now: DateTime<Utc>, length: Duration) {
        if now - self.started >= length {
            *self = Window::new(now);
        }
    }

    fn retry_after(&self, now: DateTime<Utc>, length: Duration) -> u64 {
        let remaining = (self.started + length - now).num_milliseconds().max(0) as u64;
        // round up so callers never retry early
        remaining.div_ceil(1000).max(1)
    }
}

#[derive(Debug)]
struct CallerWindows {
    day: Window,
    minute: Window,
}

#[derive(Debug, Clone, Copy)]
struct Budget {
    limit: u32,
    length: Duration,
    label: &'static str,
}

impl Budget {
    fn describe(&self) -> String {
        format!("{} per 1 {}", self.limit, self.label)
    }
}

/// In-memory limiter. The outer map lock is only held to find or insert a
/// caller's entry; counting happens under that caller's own mutex.
pub struct FixedWindowLimiter {
    day: Budget,
    minute: Budget,
    callers: RwLock<HashMap<String, Arc<Mutex<CallerWindows>>>>,
    sweep_threshold: usize,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl FixedWindowLimiter {
    pub fn new(per_day: u32, per_minute: u32) -> Self {
        Self {
            day: Budget { limit: per_day, length: Duration::days(1), label: "day" },
            minute: Budget { limit: per_minute, length: Duration::minutes(1), label: "minute" },
            callers: RwLock::new(HashMap::new()),
            sweep_threshold: SWEEP_THRESHOLD,
            last_sweep: Mutex::new(None),
        }
    }

    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> Result<(), RateLimitExceeded> {
        let entry = self.entry(key, now);
        let mut windows = entry.lock();
        windows.day.roll(now, self.day.length);
        windows.minute.roll(now, self.minute.length);

        let mut exceeded: Option<RateLimitExceeded> = None;
        for (window, budget) in [(&windows.day, &self.day), (&windows.minute, &self.minute)] {
            if window.count >= budget.limit {
                let retry_after = window.retry_after(now, budget.length);
                if exceeded.as_ref().map_or(true, |e| retry_after > e.retry_after) {
                    exceeded = Some(RateLimitExceeded { limit: budget.describe(), retry_after });
                }
            }
        }
        if let Some(e) = exceeded {
            return Err(e);
        }

        windows.day.count += 1;
        windows.minute.count += 1;
        Ok(())
    }

    pub fn tracked_callers(&self) -> usize {
        self.callers.read().len()
    }

    fn entry(&self, key: &str, now: DateTime<Utc>) -> Arc<Mutex<CallerWindows>> {
        if let Some(existing) = self.callers.read().get(key) {
            return existing.clone();
        }

        let mut callers = self.callers.write();
        if callers.len() >= self.sweep_threshold {
            self.sweep(&mut callers, now);
        }
        callers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CallerWindows { day: Window::new(now), minute: Window::new(now) }))
            })
            .clone()
    }

    /// Drops callers whose daily window has expired, at most once per interval.
    /// Entries still referenced by an in-flight check are kept; no new
    /// references can appear while the map write lock is held.
    fn sweep(&self, callers: &mut HashMap<String, Arc<Mutex<CallerWindows>>>, now: DateTime<Utc>) {
        let mut last = self.last_sweep.lock();
        if (*last).is_some_and(|at| now - at < Duration::seconds(SWEEP_INTERVAL_SECS)) {
            return;
        }
        *last = Some(now);

        let day = self.day.length;
        let before = callers.len();
        callers.retain(|_, w| Arc::strong_count(w) > 1 || now - w.lock().day.started < day);
        tracing::debug!(removed = before - callers.len(), remaining = callers.len(), "Swept rate limit windows");
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(key, Utc::now())
    }
}

pub fn caller_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
}

/// Rejects the request with 429 before the handler runs when the caller is over budget.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = caller_key(&request);
    match limiter.check(&key) {
        Ok(()) => Ok(next.run(request).await),
        Err(exceeded) => {
            tracing::warn!(caller = %key, limit = %exceeded.limit, "🚦 Rate limit exceeded");
            Err(exceeded.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn eleventh_request_in_a_minute_is_rejected() {
        let limiter = FixedWindowLimiter::new(100, 10);
        for i in 0..10 {
            assert!(limiter.check_at("1.2.3.4", t0() + Duration::seconds(i)).is_ok(), "request {}", i + 1);
        }
        let err = limiter.check_at("1.2.3.4", t0() + Duration::seconds(15)).unwrap_err();
        assert_eq!(err.limit, "10 per 1 minute");
        assert_eq!(err.retry_after, 45);
    }

    #[test]
    fn minute_window_resets() {
        let limiter = FixedWindowLimiter::new(100, 2);
        assert!(limiter.check_at("a", t0()).is_ok());
        assert!(limiter.check_at("a", t0()).is_ok());
        assert!(limiter.check_at("a", t0() + Duration::seconds(59)).is_err());
        assert!(limiter.check_at("a", t0() + Duration::seconds(60)).is_ok());
    }

    #[test]
    fn rejected_requests_are_not_counted() {
        let limiter = FixedWindowLimiter::new(3, 1);
        assert!(limiter.check_at("a", t0()).is_ok());
        for s in 1..20 {
            assert!(limiter.check_at("a", t0() + Duration::seconds(s)).is_err());
        }
        // only one request has been spent against the daily budget
        assert!(limiter.check_at("a", t0() + Duration::minutes(1)).is_ok());
        assert!(limiter.check_at("a", t0() + Duration::minutes(2)).is_ok());
        assert!(limiter.check_at("a", t0() + Duration::minutes(3)).is_err());
    }

    #[test]
    fn daily_budget_applies_across_minutes() {
        let limiter = FixedWindowLimiter::new(3, 10);
        for m in 0..3 {
            assert!(limiter.check_at("a", t0() + Duration::minutes(m)).is_ok());
        }
        let err = limiter.check_at("a", t0() + Duration::hours(1)).unwrap_err();
        assert_eq!(err.limit, "3 per 1 day");
        assert_eq!(err.retry_after, 23 * 3600);
        assert!(limiter.check_at("a", t0() + Duration::days(1)).is_ok());
    }

    #[test]
    fn callers_are_independent() {
        let limiter = FixedWindowLimiter::new(100, 1);
        assert!(limiter.check_at("a", t0()).is_ok());
        assert!(limiter.check_at("a", t0()).is_err());
        assert!(limiter.check_at("b", t0()).is_ok());
        assert_eq!(limiter.tracked_callers(), 2);
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = FixedWindowLimiter::new(100, 1);
        assert!(limiter.check_at("a", t0()).is_ok());
        let err = limiter.check_at("a", t0() + Duration::milliseconds(59_999)).unwrap_err();
        assert_eq!(err.retry_after, 1);
    }

    #[test]
    fn concurrent_requests_from_one_key_are_not_undercounted() {
        let limiter = Arc::new(FixedWindowLimiter::new(1000, 50));
        let now = t0();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.check_at("shared", now).is_ok()).count())
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn sweep_drops_expired_callers_at_most_once_per_interval() {
        let mut limiter = FixedWindowLimiter::new(100, 10);
        limiter.sweep_threshold = 2;
        let day = Duration::days(1);

        assert!(limiter.check_at("a", t0()).is_ok());
        assert!(limiter.check_at("b", t0() + day + Duration::seconds(1)).is_ok());
        // first sweep: "a" has expired
        assert!(limiter.check_at("c", t0() + day + Duration::seconds(2)).is_ok());
        assert_eq!(limiter.tracked_callers(), 2);

        // sweeps again, nothing expired yet
        assert!(limiter.check_at("d", t0() + day * 2).is_ok());
        assert_eq!(limiter.tracked_callers(), 3);

        // "b" expired, but the last sweep was 30s ago
        assert!(limiter.check_at("e", t0() + day * 2 + Duration::seconds(30)).is_ok());
        assert_eq!(limiter.tracked_callers(), 4);

        // interval elapsed: "b" and "c" go
        assert!(limiter.check_at("f", t0() + day * 2 + Duration::seconds(61)).is_ok());
        assert_eq!(limiter.tracked_callers(), 3);
    }

    #[test]
    fn sweep_keeps_entries_held_by_in_flight_checks() {
        let mut limiter = FixedWindowLimiter::new(100, 10);
        limiter.sweep_threshold = 1;

        let held = limiter.entry("a", t0());
        held.lock().day.count = 7;
        assert!(limiter.check_at("b", t0() + Duration::days(2)).is_ok());
        assert_eq!(limiter.tracked_callers(), 2);

        drop(held);
        let again = limiter.entry("a", t0() + Duration::days(2));
        assert_eq!(again.lock().day.count, 7);
    }

    #[test]
    fn caller_key_uses_peer_ip() {
        let mut request = Request::new(axum::body::Body::empty());
        assert_eq!(caller_key(&request), UNKNOWN_CALLER);
        request.extensions_mut().insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5555))));
        assert_eq!(caller_key(&request), "10.0.0.7");
    }
}
