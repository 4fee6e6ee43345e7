//! Per-client token-bucket admission.
//!
//! Each client key owns a governor GCRA limiter plus the instant it was last
//! seen. The table lives behind one mutex whose critical sections only look
//! up, insert, refresh or evict entries; the permit check itself runs on a
//! cloned handle outside the lock. A background reaper evicts entries idle for
//! longer than the configured window so memory tracks active clients only.

use crate::error::AppError;
use axum::extract::{ConnectInfo, Request};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock, Reference},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

type Bucket<C> = RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Tunables for [`ClientRateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    /// Sustained refill rate in permits per second.
    pub requests_per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// When false every request is admitted and nothing is tracked.
    pub enabled: bool,
    /// How often the reaper wakes.
    pub cleanup_interval: Duration,
    /// Entries not seen for longer than this are evicted.
    pub idle_timeout: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 4.0,
            burst: 8,
            enabled: true,
            cleanup_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(180),
        }
    }
}

impl RateLimitSettings {
    /// Validated GCRA quota for these settings.
    pub fn quota(&self) -> Result<Quota, AppError> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "rate limiter requests per second must be positive, got {}",
                self.requests_per_second
            )));
        }

        let burst = NonZeroU32::new(self.burst).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("rate limiter burst must be at least 1"))
        })?;

        let period = Duration::try_from_secs_f64(1.0 / self.requests_per_second).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "rate limiter period out of range for {} requests per second: {}",
                self.requests_per_second,
                e
            ))
        })?;
        let quota = Quota::with_period(period).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "rate limiter period rounds to zero for {} requests per second",
                self.requests_per_second
            ))
        })?;

        Ok(quota.allow_burst(burst))
    }
}

struct ClientBucket<C: Clock> {
    limiter: Arc<Bucket<C>>,
    last_seen: C::Instant,
}

/// Rate limiter keyed by client identity with idle-entry eviction.
pub struct ClientRateLimiter<C: Clock = DefaultClock> {
    settings: RateLimitSettings,
    quota: Quota,
    clock: C,
    clients: Mutex<HashMap<String, ClientBucket<C>>>,
}

impl<C: Clock> std::fmt::Debug for ClientRateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRateLimiter")
            .field("settings", &self.settings)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

impl ClientRateLimiter<DefaultClock> {
    pub fn new(settings: RateLimitSettings) -> Result<Self, AppError> {
        Self::with_clock(settings, DefaultClock::default())
    }
}

impl<C: Clock> ClientRateLimiter<C> {
    pub fn with_clock(settings: RateLimitSettings, clock: C) -> Result<Self, AppError> {
        let quota = settings.quota()?;
        Ok(Self {
            settings,
            quota,
            clock,
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Try to consume one permit for `client`.
    pub fn admit(&self, client: &str) -> bool {
        self.check(client).is_ok()
    }

    /// Like [`admit`](Self::admit), but a rejection carries the time until the
    /// next permit becomes available.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        if !self.settings.enabled {
            return Ok(());
        }

        let limiter = {
            let mut clients = self.lock();
            let now = self.clock.now();
            let bucket = clients
                .entry(client.to_owned())
                .or_insert_with(|| ClientBucket {
                    limiter: Arc::new(RateLimiter::direct_with_clock(self.quota, &self.clock)),
                    last_seen: now,
                });
            bucket.last_seen = now;
            Arc::clone(&bucket.limiter)
        };

        limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Evict every entry idle for longer than the configured window.
    /// Returns the number of evicted clients.
    pub fn reap_idle(&self) -> usize {
        let idle_timeout = self.settings.idle_timeout;
        let mut clients = self.lock();
        let now = self.clock.now();
        let before = clients.len();

        clients.retain(|_, bucket| Duration::from(now.duration_since(bucket.last_seen)) <= idle_timeout);

        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientBucket<C>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> ClientRateLimiter<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Start the periodic eviction task. It runs until [`ReaperHandle::shutdown`]
    /// is called.
    pub fn spawn_reaper(self: Arc<Self>) -> ReaperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = self.settings.cleanup_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = self.reap_idle();
                        if evicted > 0 {
                            tracing::debug!(
                                evicted,
                                remaining = self.tracked_clients(),
                                "Evicted idle rate limiter entries"
                            );
                        }
                    }
                }
            }

            tracing::debug!("Rate limiter reaper stopped");
        });

        ReaperHandle { cancel, task }
    }
}

/// Owner of the background reaper task.
#[derive(Debug)]
pub struct ReaperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Rate limiter reaper terminated abnormally");
        }
    }
}

/// Resolve the client address used as the limiter key: first
/// `X-Forwarded-For` hop, then `X-Real-IP`, then the peer socket address.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    let headers = request.headers();

    let forwarded_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    };

    let peer = || {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };

    forwarded_ip.or_else(real_ip).or_else(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use governor::clock::FakeRelativeClock;

    fn settings(rps: f64, burst: u32) -> RateLimitSettings {
        RateLimitSettings {
            requests_per_second: rps,
            burst,
            ..RateLimitSettings::default()
        }
    }

    fn limiter(rps: f64, burst: u32) -> (ClientRateLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let limiter = ClientRateLimiter::with_clock(settings(rps, burst), clock.clone())
            .expect("valid settings");
        (limiter, clock)
    }

    #[test]
    fn test_burst_beyond_capacity_is_rejected() {
        let (limiter, _clock) = limiter(2.0, 4);

        let decisions: Vec<bool> = (0..5).map(|_| limiter.admit("10.0.0.1")).collect();

        assert_eq!(decisions, vec![true, true, true, true, false]);
    }

    #[test]
    fn test_rejected_client_recovers_after_refill() {
        let (limiter, clock) = limiter(2.0, 4);
        for _ in 0..4 {
            assert!(limiter.admit("x"));
        }
        assert!(!limiter.admit("x"));
        assert!(!limiter.admit("x"));

        clock.advance(Duration::from_millis(500));
        assert!(limiter.admit("x"));
        assert!(!limiter.admit("x"));
    }

    #[test]
    fn test_rejection_reports_wait_time() {
        let (limiter, _clock) = limiter(2.0, 1);
        assert!(limiter.check("x").is_ok());

        let wait = limiter.check("x").unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(500));
    }

    #[test]
    fn test_steady_rate_within_quota_is_never_rejected() {
        let (limiter, clock) = limiter(2.0, 4);

        for _ in 0..50 {
            assert!(limiter.admit("steady"));
            clock.advance(Duration::from_millis(500));
        }
    }

    #[test]
    fn test_clients_have_independent_buckets() {
        let (limiter, _clock) = limiter(1.0, 1);

        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));
        assert!(limiter.admit("b"));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_disabled_limiter_admits_everything_without_tracking() {
        let clock = FakeRelativeClock::default();
        let limiter = ClientRateLimiter::with_clock(
            RateLimitSettings {
                enabled: false,
                ..settings(1.0, 1)
            },
            clock,
        )
        .unwrap();

        for _ in 0..100 {
            assert!(limiter.admit("noisy"));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_reap_evicts_only_idle_clients() {
        let (limiter, clock) = limiter(2.0, 4);

        limiter.admit("idle");
        clock.advance(Duration::from_secs(150));
        limiter.admit("active");
        clock.advance(Duration::from_secs(31));

        assert_eq!(limiter.reap_idle(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_client_idle_exactly_the_window_is_kept() {
        let (limiter, clock) = limiter(2.0, 4);

        limiter.admit("edge");
        clock.advance(Duration::from_secs(180));

        assert_eq!(limiter.reap_idle(), 0);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_single_request_client_is_evicted_without_rejection() {
        let (limiter, clock) = limiter(2.0, 4);

        assert!(limiter.admit("once"));
        clock.advance(Duration::from_secs(181));

        assert_eq!(limiter.reap_idle(), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_evicted_client_starts_with_fresh_bucket() {
        let (limiter, clock) = limiter(0.001, 2);

        assert!(limiter.admit("x"));
        assert!(limiter.admit("x"));
        assert!(!limiter.admit("x"));

        // Still far from a refill at 0.001 rps, so only eviction can restore the burst.
        clock.advance(Duration::from_secs(181));
        limiter.reap_idle();

        assert!(limiter.admit("x"));
        assert!(limiter.admit("x"));
        assert!(!limiter.admit("x"));
    }

    #[test]
    fn test_concurrent_admits_never_exceed_burst() {
        let (limiter, _clock) = limiter(1.0, 4);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.admit("shared"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, 4);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(ClientRateLimiter::new(settings(0.0, 4)).is_err());
        assert!(ClientRateLimiter::new(settings(-1.0, 4)).is_err());
        assert!(ClientRateLimiter::new(settings(f64::NAN, 4)).is_err());
        assert!(ClientRateLimiter::new(settings(2.0, 0)).is_err());
    }

    #[test]
    fn test_vanishingly_small_rate_is_a_config_error() {
        for rps in [1e-300, f64::MIN_POSITIVE, 1e-320] {
            assert!(matches!(
                settings(rps, 4).quota(),
                Err(AppError::ConfigError(_))
            ));
        }
        assert!(settings(0.001, 4).quota().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_task_evicts_and_stops_on_shutdown() {
        let clock = FakeRelativeClock::default();
        let limiter = Arc::new(
            ClientRateLimiter::with_clock(settings(2.0, 4), clock.clone()).unwrap(),
        );

        limiter.admit("gone");
        clock.advance(Duration::from_secs(181));

        let reaper = Arc::clone(&limiter).spawn_reaper();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(limiter.tracked_clients(), 0);
        reaper.shutdown().await;
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_ip(&request), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_falls_back_to_peer_address() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), None);

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5555))));
        assert_eq!(client_ip(&request), Some("192.0.2.4".parse().unwrap()));
    }
}
