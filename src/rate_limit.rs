//! Per-route request quotas.
//!
//! Quotas are checked only after authentication has admitted a request, so
//! rejected credentials never consume anything. Each route gets its own keyed
//! governor limiter; the partition key is chosen by [`RateLimitPartition`].

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, NotUntil, Quota, RateLimiter as GovLimiter};

use crate::auth::Identity;
use crate::config::{RateLimitConfig, RateLimitPartition};
use crate::error::RateLimited;

/// Routes with their own quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Forecast,
    /// Everything else (currently the login endpoint)
    Default,
}

/// A quota such as `30/minute`: `count` requests per one `period`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSpec {
    pub count: NonZeroU32,
    pub period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
}

impl Period {
    fn duration(self) -> Duration {
        match self {
            Period::Second => Duration::from_secs(1),
            Period::Minute => Duration::from_secs(60),
            Period::Hour => Duration::from_secs(60 * 60),
            Period::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Period::Second => "second",
            Period::Minute => "minute",
            Period::Hour => "hour",
            Period::Day => "day",
        };
        f.write_str(name)
    }
}

impl FromStr for RateLimitSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, period) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("expected '<count>/<period>'"))?;

        let count: u32 = count.trim().parse().context("count must be a positive integer")?;
        let count = NonZeroU32::new(count).ok_or_else(|| anyhow!("count must be greater than zero"))?;

        let period = match period.trim().to_lowercase().as_str() {
            "second" | "s" => Period::Second,
            "minute" | "m" => Period::Minute,
            "hour" | "h" => Period::Hour,
            "day" | "d" => Period::Day,
            other => bail!("unknown period '{other}'"),
        };

        Ok(Self { count, period })
    }
}

impl fmt::Display for RateLimitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per 1 {}", self.count, self.period)
    }
}

impl RateLimitSpec {
    /// Governor quota that replenishes `count` cells evenly over the period
    #[must_use]
    pub fn quota(&self) -> Quota {
        let per_cell = self.period.duration() / self.count.get();
        Quota::with_period(per_cell)
            .unwrap_or_else(|| Quota::per_second(self.count))
            .allow_burst(self.count)
    }
}

/// Tracked keys a route may hold before idle ones are dropped
const PRUNE_FLOOR: usize = 10_000;

struct RouteLimiter {
    spec: RateLimitSpec,
    limiter: DefaultKeyedRateLimiter<String>,
    prune_floor: usize,
    /// Key count that triggers the next prune; doubles while keys stay busy
    next_prune_at: AtomicUsize,
}

impl RouteLimiter {
    fn new(spec: RateLimitSpec) -> Self {
        Self::with_prune_floor(spec, PRUNE_FLOOR)
    }

    fn with_prune_floor(spec: RateLimitSpec, prune_floor: usize) -> Self {
        Self {
            spec,
            limiter: GovLimiter::keyed(spec.quota()),
            prune_floor,
            next_prune_at: AtomicUsize::new(prune_floor),
        }
    }

    fn check_key(&self, key: String) -> Result<(), NotUntil<<DefaultClock as Clock>::Instant>> {
        let outcome = self.limiter.check_key(&key);
        self.prune_if_needed();
        outcome.map(|_| ())
    }

    /// Drop keys whose quota has fully replenished once the map passes the
    /// current threshold. Amortized O(1) per check.
    fn prune_if_needed(&self) {
        let len = self.limiter.len();
        if len < self.next_prune_at.load(Ordering::Relaxed) {
            return;
        }

        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        let remaining = self.limiter.len();
        self.next_prune_at
            .store(self.prune_floor.max(remaining * 2), Ordering::Relaxed);
        tracing::debug!(before = len, after = remaining, "pruned idle rate limit keys");
    }
}

struct Limits {
    forecast: RouteLimiter,
    default: RouteLimiter,
    partition: RateLimitPartition,
    clock: DefaultClock,
}

/// Rate limiter shared by all request handlers. Cheap to clone.
#[derive(Clone)]
pub struct RateLimiter {
    limits: Option<Arc<Limits>>,
}

impl RateLimiter {
    /// Build from configuration; a disabled config yields a limiter that admits everything
    pub fn from_config(config: &RateLimitConfig) -> anyhow::Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let forecast: RateLimitSpec = config
            .forecast
            .parse()
            .with_context(|| format!("Invalid forecast rate limit '{}'", config.forecast))?;
        let default: RateLimitSpec = config
            .default
            .parse()
            .with_context(|| format!("Invalid default rate limit '{}'", config.default))?;

        Ok(Self {
            limits: Some(Arc::new(Limits {
                forecast: RouteLimiter::new(forecast),
                default: RouteLimiter::new(default),
                partition: config.partition,
                clock: DefaultClock::default(),
            })),
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { limits: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.limits.is_some()
    }

    /// Consume one request from the caller's quota on `route`.
    ///
    /// Must only be called for requests that already passed authentication.
    pub fn check(
        &self,
        route: Route,
        identity: &Identity,
        client_addr: &str,
    ) -> Result<(), RateLimited> {
        let Some(limits) = &self.limits else {
            return Ok(());
        };

        let key = match (limits.partition, identity) {
            (RateLimitPartition::Identity, Identity::User(user)) => format!("user:{user}"),
            (RateLimitPartition::Identity, Identity::ApiKey(key)) => format!("key:{key}"),
            _ => format!("addr:{client_addr}"),
        };

        let route_limiter = match route {
            Route::Forecast => &limits.forecast,
            Route::Default => &limits.default,
        };

        route_limiter.check_key(key).map_err(|not_until| {
            let retry_after = not_until.wait_time_from(limits.clock.now());
            tracing::info!(?route, retry_after_ms = retry_after.as_millis() as u64, "rate limit exceeded");
            RateLimited {
                limit: route_limiter.spec.to_string(),
                retry_after,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config(forecast: &str, partition: RateLimitPartition) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            default: "100/minute".to_string(),
            forecast: forecast.to_string(),
            partition,
        }
    }

    #[rstest]
    #[case("30/minute", 30, Period::Minute)]
    #[case("100 / hour", 100, Period::Hour)]
    #[case("5/s", 5, Period::Second)]
    #[case("1/day", 1, Period::Day)]
    fn test_parse_spec(#[case] input: &str, #[case] count: u32, #[case] period: Period) {
        let spec: RateLimitSpec = input.parse().unwrap();
        assert_eq!(spec.count.get(), count);
        assert_eq!(spec.period, period);
    }

    #[rstest]
    #[case("30")]
    #[case("0/minute")]
    #[case("ten/minute")]
    #[case("10/fortnight")]
    fn test_parse_spec_rejects(#[case] input: &str) {
        assert!(input.parse::<RateLimitSpec>().is_err());
    }

    #[test]
    fn test_spec_display() {
        let spec: RateLimitSpec = "30/minute".parse().unwrap();
        assert_eq!(spec.to_string(), "30 per 1 minute");
    }

    #[test]
    fn test_quota_exhausted_with_retry_after() {
        let limiter = RateLimiter::from_config(&config("2/minute", RateLimitPartition::Identity)).unwrap();
        let anon = Identity::Anonymous;

        assert!(limiter.check(Route::Forecast, &anon, "10.0.0.1").is_ok());
        assert!(limiter.check(Route::Forecast, &anon, "10.0.0.1").is_ok());

        let limited = limiter.check(Route::Forecast, &anon, "10.0.0.1").unwrap_err();
        assert_eq!(limited.limit, "2 per 1 minute");
        assert!(limited.retry_after > Duration::ZERO);
        assert!(limited.retry_after <= Duration::from_secs(30));
    }

    #[test]
    fn test_identity_partition_separates_api_keys() {
        let limiter = RateLimiter::from_config(&config("1/minute", RateLimitPartition::Identity)).unwrap();
        let key_1 = Identity::ApiKey("key-1".into());
        let key_2 = Identity::ApiKey("key-2".into());

        assert!(limiter.check(Route::Forecast, &key_1, "10.0.0.1").is_ok());
        assert!(limiter.check(Route::Forecast, &key_2, "10.0.0.1").is_ok());
        assert!(limiter.check(Route::Forecast, &key_1, "10.0.0.1").is_err());
    }

    #[test]
    fn test_address_partition_shares_quota() {
        let limiter = RateLimiter::from_config(&config("1/minute", RateLimitPartition::Address)).unwrap();
        let key_1 = Identity::ApiKey("key-1".into());
        let key_2 = Identity::ApiKey("key-2".into());

        assert!(limiter.check(Route::Forecast, &key_1, "10.0.0.1").is_ok());
        assert!(limiter.check(Route::Forecast, &key_2, "10.0.0.1").is_err());
        assert!(limiter.check(Route::Forecast, &key_2, "10.0.0.2").is_ok());
    }

    #[test]
    fn test_routes_have_separate_quotas() {
        let limiter = RateLimiter::from_config(&config("1/minute", RateLimitPartition::Identity)).unwrap();
        let anon = Identity::Anonymous;

        assert!(limiter.check(Route::Forecast, &anon, "10.0.0.1").is_ok());
        assert!(limiter.check(Route::Forecast, &anon, "10.0.0.1").is_err());
        assert!(limiter.check(Route::Default, &anon, "10.0.0.1").is_ok());
    }

    #[test]
    fn test_disabled_always_admits() {
        let mut cfg = config("1/minute", RateLimitPartition::Identity);
        cfg.enabled = false;
        let limiter = RateLimiter::from_config(&cfg).unwrap();
        assert!(!limiter.is_enabled());
        for _ in 0..10 {
            assert!(limiter.check(Route::Forecast, &Identity::Anonymous, "10.0.0.1").is_ok());
        }
    }

    #[test]
    fn test_idle_keys_are_pruned() {
        // 1000/second replenishes a used cell within a millisecond
        let spec: RateLimitSpec = "1000/second".parse().unwrap();
        let route = RouteLimiter::with_prune_floor(spec, 100);

        for client in 0..150 {
            assert!(route.check_key(format!("addr:10.0.0.{client}")).is_ok());
        }
        std::thread::sleep(Duration::from_millis(20));
        for client in 150..210 {
            assert!(route.check_key(format!("addr:10.0.1.{client}")).is_ok());
        }

        assert!(route.limiter.len() < 100, "len = {}", route.limiter.len());
    }

    #[test]
    fn test_busy_keys_are_kept() {
        let spec: RateLimitSpec = "1/minute".parse().unwrap();
        let route = RouteLimiter::with_prune_floor(spec, 10);

        for client in 0..30 {
            assert!(route.check_key(format!("addr:{client}")).is_ok());
        }

        // None have replenished, so every quota is still tracked
        assert_eq!(route.limiter.len(), 30);
        assert!(route.check_key("addr:0".to_string()).is_err());
    }
}
