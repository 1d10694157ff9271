use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota,
};

pub const DEFAULT_LIMITS: &str = "200 per day;100 per hour;1 per second";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub count: u32,
    pub period: Duration,
}

impl FromStr for RateLimit {
    type Err = String;

    /// `"<n> per <second|minute|hour|day>"`, plural units allowed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let (Some(n), Some("per"), Some(unit), None) =
            (words.next(), words.next(), words.next(), words.next())
        else {
            return Err(format!("expected \"<n> per <unit>\", got {:?}", s));
        };
        let count: u32 = n.parse().map_err(|_| format!("bad count {:?}", n))?;
        if count == 0 {
            return Err("count must be positive".into());
        }
        let secs = match unit.trim_end_matches('s') {
            "second" => 1,
            "minute" => 60,
            "hour" => 3_600,
            "day" => 86_400,
            other => return Err(format!("unknown unit {:?}", other)),
        };
        let limit = Self {
            count,
            period: Duration::from_secs(secs),
        };
        if limit.quota().is_none() {
            return Err(format!("{:?} is too fine-grained", s));
        }
        Ok(limit)
    }
}

impl RateLimit {
    /// `count` cells per `period`, all available as an initial burst.
    pub fn quota(&self) -> Option<Quota> {
        let burst = NonZeroU32::new(self.count)?;
        Quota::with_period(self.period / self.count).map(|q| q.allow_burst(burst))
    }
}

pub fn parse_limits(s: &str) -> Result<Vec<RateLimit>, String> {
    s.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(RateLimit::from_str)
        .collect()
}

type KeyedLimiter<C> = governor::RateLimiter<
    String,
    DashMapStateStore<String>,
    C,
    NoOpMiddleware<<C as Clock>::Instant>,
>;

/// Per-client limiter with one keyed GCRA quota per configured limit. A
/// request must pass every quota; limits are checked shortest period first,
/// so a request refused by a longer one still counts against the shorter.
pub struct RateLimiter<C: Clock = DefaultClock> {
    limiters: Vec<KeyedLimiter<C>>,
    clock: C,
}

impl RateLimiter {
    pub fn new(limits: Vec<RateLimit>) -> Self {
        Self::with_clock(limits, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(mut limits: Vec<RateLimit>, clock: C) -> Self {
        limits.sort_by_key(|l| l.period);
        let limiters = limits
            .iter()
            .filter_map(RateLimit::quota)
            .map(|quota| governor::RateLimiter::dashmap_with_clock(quota, &clock))
            .collect();
        Self { limiters, clock }
    }

    /// `Err` carries how long the client must wait before retrying.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let key = key.to_owned();
        for limiter in &self.limiters {
            if let Err(not_until) = limiter.check_key(&key) {
                return Err(not_until.wait_time_from(self.clock.now()));
            }
        }
        Ok(())
    }

    /// Drop clients whose state has fully replenished.
    pub fn sweep(&self) {
        for limiter in &self.limiters {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Number of clients tracked by the busiest quota.
    pub fn len(&self) -> usize {
        self.limiters.iter().map(|l| l.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match limiter.check(&key) {
        Ok(()) => next.run(req).await,
        Err(wait) => {
            tracing::warn!("rate limit exceeded for {} on {}", key, req.uri().path());
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.max(1).to_string())],
                "Too Many Requests",
            )
                .into_response()
        }
    }
}
