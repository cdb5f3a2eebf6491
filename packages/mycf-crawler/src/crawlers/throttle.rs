//! Request throttling.
//!
//! Three layers, applied in order on every request:
//! 1. a semaphore bounding in-flight requests,
//! 2. a governor quota enforcing the floor delay between issues,
//! 3. an adaptive delay that tracks observed latency, backing off on
//!    errors and slow responses and relaxing under fast successes.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::error::{TransportError, TransportResult};
use crate::types::config::ThrottleConfig;

type DefaultRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Held for the duration of one request.
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
    started: Instant,
}

impl ThrottlePermit {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// How a request ended, as far as the throttle cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx response
    Success,
    /// Non-2xx response
    Rejected,
    /// Timeout or connection failure
    Failed,
}

impl Outcome {
    pub fn of<T>(result: &TransportResult<T>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(TransportError::Status { .. }) => Outcome::Rejected,
            Err(_) => Outcome::Failed,
        }
    }
}

#[derive(Debug)]
struct Pacing {
    delay: Duration,
    last_issue: Option<Instant>,
}

/// Global request throttle shared by every keyword and page.
pub struct AutoThrottle {
    permits: Arc<Semaphore>,
    floor: Option<DefaultRateLimiter>,
    pacing: Mutex<Pacing>,
    config: ThrottleConfig,
}

impl AutoThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        let floor = (!config.min_delay.is_zero()).then(|| {
            let quota = Quota::with_period(config.min_delay)
                .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
                .allow_burst(NonZeroU32::MIN);
            RateLimiter::direct(quota)
        });

        let start = config
            .start_delay
            .clamp(config.min_delay, config.max_delay.max(config.min_delay));

        Self {
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            floor,
            pacing: Mutex::new(Pacing {
                delay: start,
                last_issue: None,
            }),
            config,
        }
    }

    /// Wait until a request may be issued.
    ///
    /// Returns `None` only if the permit pool is gone.
    pub async fn acquire(&self) -> Option<ThrottlePermit> {
        let permit = self.permits.clone().acquire_owned().await.ok()?;

        if let Some(floor) = &self.floor {
            floor.until_ready().await;
        }

        // Held across the sleep so issues are spaced one after another.
        let mut pacing = self.pacing.lock().await;
        if let Some(last) = pacing.last_issue {
            let wait = pacing.delay.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                trace!(wait_ms = wait.as_millis() as u64, "Throttling request");
                tokio::time::sleep(wait).await;
            }
        }
        pacing.last_issue = Some(Instant::now());

        Some(ThrottlePermit {
            _permit: permit,
            started: Instant::now(),
        })
    }

    /// Feed back the outcome of a request, releasing its permit.
    pub async fn record(&self, permit: ThrottlePermit, outcome: Outcome) {
        let latency = permit.elapsed();
        drop(permit);

        let mut pacing = self.pacing.lock().await;
        let next = self.next_delay(pacing.delay, latency, outcome);
        if next != pacing.delay {
            trace!(
                from_ms = pacing.delay.as_millis() as u64,
                to_ms = next.as_millis() as u64,
                latency_ms = latency.as_millis() as u64,
                "Adjusted throttle delay"
            );
        }
        pacing.delay = next;
    }

    /// Current adaptive delay.
    pub async fn current_delay(&self) -> Duration {
        self.pacing.lock().await.delay
    }

    fn next_delay(&self, current: Duration, latency: Duration, outcome: Outcome) -> Duration {
        let min = self.config.min_delay;
        let max = self.config.max_delay.max(min);

        let next = match outcome {
            Outcome::Failed => current.saturating_mul(2).max(min.max(Duration::from_millis(1))),
            Outcome::Success | Outcome::Rejected => {
                let target = if self.config.target_concurrency > 0.0 {
                    latency.div_f64(self.config.target_concurrency)
                } else {
                    latency
                };
                let averaged = (current + target) / 2;
                let next = averaged.max(target);
                // Only successes may speed the crawl up.
                if outcome == Outcome::Rejected && next < current {
                    current
                } else {
                    next
                }
            }
        };

        next.clamp(min, max)
    }
}

impl std::fmt::Debug for AutoThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoThrottle")
            .field("available", &self.permits.available_permits())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ThrottleConfig {
        ThrottleConfig {
            concurrency: 2,
            min_delay: Duration::from_millis(100),
            start_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(2),
            target_concurrency: 1.0,
        }
    }

    #[tokio::test]
    async fn test_bounds_concurrency() {
        let throttle = AutoThrottle::new(ThrottleConfig::unthrottled(2));

        let a = throttle.acquire().await.unwrap();
        let _b = throttle.acquire().await.unwrap();
        assert_eq!(throttle.permits.available_permits(), 0);

        throttle.record(a, Outcome::Success).await;
        assert_eq!(throttle.permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_fast_success_relaxes_delay() {
        let throttle = AutoThrottle::new(config());
        let next = throttle.next_delay(
            Duration::from_millis(400),
            Duration::from_millis(20),
            Outcome::Success,
        );
        assert_eq!(next, Duration::from_millis(210));

        let floor = throttle.next_delay(
            Duration::from_millis(100),
            Duration::from_millis(1),
            Outcome::Success,
        );
        assert_eq!(floor, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_slow_response_raises_delay() {
        let throttle = AutoThrottle::new(config());
        let next = throttle.next_delay(
            Duration::from_millis(400),
            Duration::from_millis(1200),
            Outcome::Success,
        );
        assert_eq!(next, Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_errors_back_off_up_to_ceiling() {
        let throttle = AutoThrottle::new(config());
        assert_eq!(
            throttle.next_delay(Duration::from_millis(400), Duration::ZERO, Outcome::Failed),
            Duration::from_millis(800)
        );
        assert_eq!(
            throttle.next_delay(Duration::from_millis(1500), Duration::ZERO, Outcome::Failed),
            Duration::from_secs(2)
        );
        // A rejected response never speeds things up.
        assert_eq!(
            throttle.next_delay(
                Duration::from_millis(400),
                Duration::from_millis(10),
                Outcome::Rejected
            ),
            Duration::from_millis(400)
        );
    }

    #[tokio::test]
    async fn test_record_updates_delay() {
        let throttle = AutoThrottle::new(config());
        assert_eq!(throttle.current_delay().await, Duration::from_millis(400));

        let permit = throttle.acquire().await.unwrap();
        throttle.record(permit, Outcome::Failed).await;
        assert_eq!(throttle.current_delay().await, Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_spaces_issues() {
        let throttle = AutoThrottle::new(ThrottleConfig {
            concurrency: 4,
            min_delay: Duration::ZERO,
            start_delay: Duration::from_millis(150),
            max_delay: Duration::from_secs(1),
            target_concurrency: 1.0,
        });

        let start = Instant::now();
        let _a = throttle.acquire().await.unwrap();
        let _b = throttle.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_outcome_of_result() {
        let ok: TransportResult<()> = Ok(());
        let rejected: TransportResult<()> = Err(TransportError::Status {
            url: "https://x".into(),
            status: 503,
        });
        let timeout: TransportResult<()> = Err(TransportError::Timeout {
            url: "https://x".into(),
        });

        assert_eq!(Outcome::of(&ok), Outcome::Success);
        assert_eq!(Outcome::of(&rejected), Outcome::Rejected);
        assert_eq!(Outcome::of(&timeout), Outcome::Failed);
    }
}
