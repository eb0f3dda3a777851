//! Rate-limited, single-flight rate cache
//!
//! Wraps any [`PriceOracle`]. The upstream is asked at most once per
//! `refresh_interval`; concurrent callers wait on the same refresh instead of
//! issuing their own. When a refresh fails, the last good rate is served
//! while it is younger than `max_staleness`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{OracleError, PriceOracle, Rate};

struct CachedRate {
    rate: Rate,
    fetched_at: Instant,
}

/// Caching decorator around an upstream oracle.
pub struct CachedOracle<O> {
    inner: O,
    refresh_interval: Duration,
    max_staleness: Duration,
    cache: Mutex<Option<CachedRate>>,
}

impl<O: PriceOracle> CachedOracle<O> {
    pub fn new(inner: O, refresh_interval: Duration, max_staleness: Duration) -> Self {
        Self {
            inner,
            refresh_interval,
            max_staleness,
            cache: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

#[async_trait]
impl<O: PriceOracle> PriceOracle for CachedOracle<O> {
    async fn fetch_rate(&self) -> Result<Rate, OracleError> {
        // Held across the upstream call: one refresh in flight at a time.
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.refresh_interval {
                debug!(rate = %cached.rate.value, "Serving cached rate");
                return Ok(cached.rate.clone());
            }
        }

        match self.inner.fetch_rate().await {
            Ok(rate) => {
                let rate = Rate::new(rate.value, rate.observed_at, rate.source)?;
                *cache = Some(CachedRate {
                    rate: rate.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(rate)
            }
            Err(err) => match cache.as_ref() {
                Some(cached) if cached.fetched_at.elapsed() < self.max_staleness => {
                    warn!(
                        error = %err,
                        age_ms = cached.fetched_at.elapsed().as_millis() as u64,
                        "Rate refresh failed, serving last known rate"
                    );
                    Ok(cached.rate.clone())
                }
                _ => {
                    warn!(error = %err, "Rate refresh failed and no usable cached rate");
                    Err(OracleError::Unavailable {
                        reason: err.to_string(),
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    /// Upstream that counts calls and can be switched off.
    struct CountingOracle {
        calls: AtomicU64,
        failing: AtomicBool,
        latency: Duration,
    }

    impl CountingOracle {
        fn new(latency: Duration) -> Self {
            Self {
                calls: AtomicU64::new(0),
                failing: AtomicBool::new(false),
                latency,
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceOracle for CountingOracle {
        async fn fetch_rate(&self) -> Result<Rate, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(OracleError::Status { status: 503 });
            }
            Rate::new(Decimal::from(n), Utc::now(), "counting")
        }
    }

    fn cached(latency: Duration) -> CachedOracle<CountingOracle> {
        CachedOracle::new(
            CountingOracle::new(latency),
            Duration::from_secs(10),
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_at_most_once_per_interval() {
        let oracle = cached(Duration::ZERO);
        assert_eq!(oracle.fetch_rate().await.unwrap().value, Decimal::from(1));
        assert_eq!(oracle.fetch_rate().await.unwrap().value, Decimal::from(1));
        assert_eq!(oracle.inner().calls(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(oracle.fetch_rate().await.unwrap().value, Decimal::from(2));
        assert_eq!(oracle.inner().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_single_flight() {
        let oracle = Arc::new(cached(Duration::from_millis(500)));
        let (a, b, c) = tokio::join!(oracle.fetch_rate(), oracle.fetch_rate(), oracle.fetch_rate());
        assert_eq!(a.unwrap().value, Decimal::from(1));
        assert_eq!(b.unwrap().value, Decimal::from(1));
        assert_eq!(c.unwrap().value, Decimal::from(1));
        assert_eq!(oracle.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_within_staleness() {
        let oracle = cached(Duration::ZERO);
        oracle.fetch_rate().await.unwrap();
        oracle.inner().failing.store(true, Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(30)).await;
        let rate = oracle.fetch_rate().await.unwrap();
        assert_eq!(rate.value, Decimal::from(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_beyond_staleness() {
        let oracle = cached(Duration::ZERO);
        oracle.fetch_rate().await.unwrap();
        oracle.inner().failing.store(true, Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(
            oracle.fetch_rate().await,
            Err(OracleError::Unavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_without_history() {
        let oracle = cached(Duration::ZERO);
        oracle.inner().failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            oracle.fetch_rate().await,
            Err(OracleError::Unavailable { .. })
        ));
    }
}
