//! Fixed-window request limiting keyed by route and client address.
//!
//! Every route gets the default limit unless it declares its own, in which
//! case the override replaces the default for that route.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::error::AppError;
use crate::AppState;

/// `count` requests per `period`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateSpec {
    pub count: u32,
    pub period: Duration,
}

impl RateSpec {
    pub fn new(count: u32, period: Duration) -> Self {
        RateSpec { count, period }
    }

    pub fn per_minute(count: u32) -> Self {
        RateSpec::new(count, Duration::from_secs(60))
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.period.as_secs();
        let unit = match secs {
            1 => "1 second".to_string(),
            60 => "1 minute".to_string(),
            3600 => "1 hour".to_string(),
            86400 => "1 day".to_string(),
            _ => format!("{} seconds", secs),
        };
        write!(f, "{} per {}", self.count, unit)
    }
}

impl FromStr for RateSpec {
    type Err = String;

    /// Accepts `60/minute`, `60 per minute`, `5/hours`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim().to_ascii_lowercase();
        let (count, unit) = raw
            .split_once('/')
            .or_else(|| raw.split_once(" per "))
            .ok_or_else(|| format!("expected '<count>/<unit>', got '{}'", raw))?;

        let count = count
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("bad count '{}': {}", count.trim(), e))?;
        if count == 0 {
            return Err("count must be positive".to_string());
        }

        let secs = match unit.trim().trim_end_matches('s') {
            "second" | "sec" => 1,
            "minute" | "min" => 60,
            "hour" => 3600,
            "day" => 86400,
            other => return Err(format!("unknown unit '{}'", other)),
        };

        Ok(RateSpec::new(count, Duration::from_secs(secs)))
    }
}

/// Outcome of a single `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Rejected { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    period: Duration,
    count: u32,
}

pub struct RateLimiter {
    default_limit: RateSpec,
    route_limits: HashMap<String, RateSpec>,
    windows: DashMap<(String, String), Window>,
}

impl RateLimiter {
    pub fn new(default_limit: RateSpec) -> Self {
        RateLimiter {
            default_limit,
            route_limits: HashMap::new(),
            windows: DashMap::new(),
        }
    }

    pub fn with_route_limit(mut self, route: impl Into<String>, limit: RateSpec) -> Self {
        self.route_limits.insert(route.into(), limit);
        self
    }

    pub fn limit_for(&self, route: &str) -> RateSpec {
        self.route_limits
            .get(route)
            .copied()
            .unwrap_or(self.default_limit)
    }

    pub fn allow(&self, client_key: &str, route: &str) -> bool {
        self.check(client_key, route).is_allowed()
    }

    pub fn check(&self, client_key: &str, route: &str) -> Decision {
        self.check_at(client_key, route, Instant::now())
    }

    pub fn check_at(&self, client_key: &str, route: &str, now: Instant) -> Decision {
        let limit = self.limit_for(route);

        // The entry guard holds the shard lock, so count updates are atomic per key.
        let mut window = self
            .windows
            .entry((route.to_string(), client_key.to_string()))
            .or_insert_with(|| Window {
                started: now,
                period: limit.period,
                count: 0,
            });

        if now.saturating_duration_since(window.started) >= window.period {
            window.started = now;
            window.period = limit.period;
            window.count = 0;
        }

        if window.count >= limit.count {
            let elapsed = now.saturating_duration_since(window.started);
            return Decision::Rejected {
                retry_after: window.period.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        Decision::Allowed {
            remaining: limit.count - window.count,
        }
    }

    /// Drops windows that have rolled over. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.started) < window.period);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rejects over-limit requests before any handler work runs.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = client_key(&request);
    let route = request.uri().path().to_string();

    match state.limiter.check(&client, &route) {
        Decision::Allowed { remaining } => {
            tracing::trace!(%client, %route, remaining, "rate limit check passed");
            next.run(request).await
        }
        Decision::Rejected { retry_after } => {
            let limit = state.limiter.limit_for(&route);
            tracing::warn!(%client, %route, %limit, "rate limit exceeded");
            AppError::RateLimited {
                limit: limit.to_string(),
                retry_after_secs: retry_after.as_secs().max(1),
            }
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_spellings() {
        assert_eq!("60/minute".parse::<RateSpec>().unwrap(), RateSpec::per_minute(60));
        assert_eq!("100 per minute".parse::<RateSpec>().unwrap(), RateSpec::per_minute(100));
        assert_eq!(
            "5/hours".parse::<RateSpec>().unwrap(),
            RateSpec::new(5, Duration::from_secs(3600))
        );
        assert!("0/minute".parse::<RateSpec>().is_err());
        assert!("ten/minute".parse::<RateSpec>().is_err());
        assert!("10/fortnight".parse::<RateSpec>().is_err());
        assert!("10".parse::<RateSpec>().is_err());
    }

    #[test]
    fn displays_human_readable_limit() {
        assert_eq!(RateSpec::per_minute(30).to_string(), "30 per 1 minute");
    }

    #[test]
    fn rejects_after_limit_within_window() {
        let limiter = RateLimiter::new(RateSpec::per_minute(2));
        let now = Instant::now();

        assert_eq!(limiter.check_at("1.2.3.4", "/health", now), Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.check_at("1.2.3.4", "/health", now), Decision::Allowed { remaining: 0 });
        let third = limiter.check_at("1.2.3.4", "/health", now + Duration::from_secs(20));
        assert_eq!(third, Decision::Rejected { retry_after: Duration::from_secs(40) });
    }

    #[test]
    fn window_rollover_resets_count() {
        let limiter = RateLimiter::new(RateSpec::per_minute(1));
        let now = Instant::now();

        assert!(limiter.check_at("a", "/x", now).is_allowed());
        assert!(!limiter.check_at("a", "/x", now + Duration::from_secs(59)).is_allowed());
        assert!(limiter.check_at("a", "/x", now + Duration::from_secs(60)).is_allowed());
    }

    #[test]
    fn clients_and_routes_are_counted_separately() {
        let limiter = RateLimiter::new(RateSpec::per_minute(1));
        let now = Instant::now();

        assert!(limiter.check_at("a", "/x", now).is_allowed());
        assert!(limiter.check_at("b", "/x", now).is_allowed());
        assert!(limiter.check_at("a", "/y", now).is_allowed());
        assert!(!limiter.check_at("a", "/x", now).is_allowed());
    }

    #[test]
    fn route_override_replaces_default() {
        let limiter = RateLimiter::new(RateSpec::per_minute(1))
            .with_route_limit("/api/search", RateSpec::per_minute(3));
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("a", "/api/search", now).is_allowed());
        }
        assert!(!limiter.check_at("a", "/api/search", now).is_allowed());
        assert_eq!(limiter.limit_for("/health"), RateSpec::per_minute(1));
    }

    #[test]
    fn purge_drops_only_rolled_over_windows() {
        let limiter = RateLimiter::new(RateSpec::per_minute(5));
        let now = Instant::now();
        limiter.check_at("old", "/x", now);
        limiter.check_at("new", "/x", now + Duration::from_secs(30));

        assert_eq!(limiter.purge_expired(now + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked_windows(), 1);
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        use std::sync::Arc;
        use std::thread;

        let limiter = Arc::new(RateLimiter::new(RateSpec::per_minute(50)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || (0..20).filter(|_| limiter.allow("c", "/x")).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
