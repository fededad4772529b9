//! Cached compute-unit price estimation.

use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::{routing::PriorityTier, rpc::RpcError};

/// Fee returned for the low tier without any network call.
pub const DEFAULT_LOW_TIER_FEE_MICRO_LAMPORTS: u64 = 1_000_000;
/// Lower clamp for estimated fees.
pub const DEFAULT_MIN_FEE_MICRO_LAMPORTS: u64 = 100_000_000;
/// Upper clamp for estimated fees.
pub const DEFAULT_MAX_FEE_MICRO_LAMPORTS: u64 = 300_000_000;
/// Age below which a cached estimate is reused.
pub const DEFAULT_FEE_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Network source of priority-fee estimates.
#[async_trait]
pub trait PriorityFeeSource: Send + Sync {
    /// Returns the high-percentile compute-unit price in micro-lamports, rounded up.
    async fn high_priority_fee(&self) -> Result<u64, RpcError>;
}

/// Fee estimator tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FeeConfig {
    /// Fixed fee used by the low tier.
    pub low_tier_fee: u64,
    /// Lower clamp in micro-lamports per compute unit.
    pub min_fee: u64,
    /// Upper clamp in micro-lamports per compute unit.
    pub max_fee: u64,
    /// Cache lifetime for one estimate.
    pub refresh_interval: Duration,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            low_tier_fee: DEFAULT_LOW_TIER_FEE_MICRO_LAMPORTS,
            min_fee: DEFAULT_MIN_FEE_MICRO_LAMPORTS,
            max_fee: DEFAULT_MAX_FEE_MICRO_LAMPORTS,
            refresh_interval: DEFAULT_FEE_REFRESH_INTERVAL,
        }
    }
}

impl FeeConfig {
    /// Returns a config whose clamp bounds are ordered.
    #[must_use]
    pub const fn normalized(self) -> Self {
        if self.min_fee > self.max_fee {
            Self {
                min_fee: self.max_fee,
                max_fee: self.min_fee,
                ..self
            }
        } else {
            self
        }
    }
}

/// One clamped estimate and when it was fetched.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FeeEstimate {
    /// Compute-unit price in micro-lamports.
    pub micro_lamports: u64,
    /// Fetch instant.
    pub observed_at: Instant,
}

/// Process-wide fee estimate cache.
///
/// Never fails: fetch errors fall back to the last good value, then to the lower clamp.
pub struct FeeEstimator {
    /// Estimate backend.
    source: Arc<dyn PriorityFeeSource>,
    /// Tuning.
    config: FeeConfig,
    /// Last good estimate.
    latest: RwLock<Option<FeeEstimate>>,
}

impl FeeEstimator {
    /// Creates an estimator with an empty cache.
    #[must_use]
    pub fn new(source: Arc<dyn PriorityFeeSource>, config: FeeConfig) -> Self {
        Self {
            source,
            config: config.normalized(),
            latest: RwLock::new(None),
        }
    }

    /// Returns the active tuning.
    #[must_use]
    pub const fn config(&self) -> FeeConfig {
        self.config
    }

    /// Returns the last good estimate regardless of age.
    #[must_use]
    pub fn cached(&self) -> Option<FeeEstimate> {
        self.latest.read().ok().and_then(|guard| *guard)
    }

    /// Returns the compute-unit price for `tier`.
    pub async fn get(&self, force_refresh: bool, tier: PriorityTier) -> u64 {
        if tier == PriorityTier::Low {
            return self.config.low_tier_fee;
        }
        let cached = self.cached();
        if !force_refresh
            && let Some(estimate) = cached
            && estimate.observed_at.elapsed() < self.config.refresh_interval
        {
            return estimate.micro_lamports;
        }

        match self.source.high_priority_fee().await {
            Ok(raw) => {
                let micro_lamports = raw.clamp(self.config.min_fee, self.config.max_fee);
                if let Ok(mut guard) = self.latest.write() {
                    *guard = Some(FeeEstimate {
                        micro_lamports,
                        observed_at: Instant::now(),
                    });
                }
                tracing::debug!(raw, micro_lamports, "refreshed priority fee estimate");
                micro_lamports
            }
            Err(error) => {
                let fallback = cached.map_or(self.config.min_fee, |estimate| {
                    estimate.micro_lamports
                });
                tracing::warn!(
                    error = %error,
                    fallback,
                    "priority fee estimate failed; using fallback"
                );
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Fee source replaying scripted values; `None` fails.
    struct MockFeeSource {
        /// Ordered responses; the last one repeats.
        responses: Vec<Option<u64>>,
        /// Number of fetches.
        calls: Mutex<usize>,
    }

    impl MockFeeSource {
        fn new(responses: Vec<Option<u64>>) -> Arc<Self> {
            Arc::new(Self {
                responses,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().map(|calls| *calls).unwrap_or_default()
        }
    }

    #[async_trait]
    impl PriorityFeeSource for MockFeeSource {
        async fn high_priority_fee(&self) -> Result<u64, RpcError> {
            let mut index = 0;
            if let Ok(mut calls) = self.calls.lock() {
                index = *calls;
                *calls = calls.saturating_add(1);
            }
            self.responses
                .get(index)
                .or_else(|| self.responses.last())
                .copied()
                .flatten()
                .ok_or_else(|| RpcError::InvalidResponse {
                    method: "getPriorityFeeEstimate",
                    message: "scripted failure".to_owned(),
                })
        }
    }

    #[tokio::test]
    async fn cached_estimate_is_reused_within_interval() {
        let source = MockFeeSource::new(vec![Some(150_000_000), Some(250_000_000)]);
        let estimator = FeeEstimator::new(source.clone(), FeeConfig::default());

        let first = estimator.get(false, PriorityTier::High).await;
        let second = estimator.get(false, PriorityTier::High).await;
        assert_eq!(first, 150_000_000);
        assert_eq!(second, first);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn forced_or_expired_estimates_refetch() {
        let source = MockFeeSource::new(vec![Some(150_000_000), Some(250_000_000)]);
        let estimator = FeeEstimator::new(source.clone(), FeeConfig::default());
        assert_eq!(estimator.get(false, PriorityTier::High).await, 150_000_000);
        assert_eq!(estimator.get(true, PriorityTier::High).await, 250_000_000);
        assert_eq!(source.calls(), 2);

        let source = MockFeeSource::new(vec![Some(120_000_000), Some(130_000_000)]);
        let estimator = FeeEstimator::new(
            source.clone(),
            FeeConfig {
                refresh_interval: Duration::ZERO,
                ..FeeConfig::default()
            },
        );
        assert_eq!(estimator.get(false, PriorityTier::High).await, 120_000_000);
        assert_eq!(estimator.get(false, PriorityTier::High).await, 130_000_000);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn low_tier_never_touches_network() {
        let source = MockFeeSource::new(vec![Some(150_000_000)]);
        let estimator = FeeEstimator::new(source.clone(), FeeConfig::default());
        for force in [false, true, false] {
            assert_eq!(
                estimator.get(force, PriorityTier::Low).await,
                DEFAULT_LOW_TIER_FEE_MICRO_LAMPORTS
            );
        }
        assert_eq!(source.calls(), 0);
        assert!(estimator.cached().is_none());
    }

    #[tokio::test]
    async fn estimates_are_clamped() {
        let source = MockFeeSource::new(vec![Some(5), Some(9_000_000_000)]);
        let estimator = FeeEstimator::new(source, FeeConfig::default());
        assert_eq!(
            estimator.get(true, PriorityTier::High).await,
            DEFAULT_MIN_FEE_MICRO_LAMPORTS
        );
        assert_eq!(
            estimator.get(true, PriorityTier::High).await,
            DEFAULT_MAX_FEE_MICRO_LAMPORTS
        );
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_last_good_then_floor() {
        let source = MockFeeSource::new(vec![None]);
        let estimator = FeeEstimator::new(source, FeeConfig::default());
        assert_eq!(
            estimator.get(false, PriorityTier::High).await,
            DEFAULT_MIN_FEE_MICRO_LAMPORTS
        );
        assert!(estimator.cached().is_none());

        let source = MockFeeSource::new(vec![Some(200_000_000), None]);
        let estimator = FeeEstimator::new(source.clone(), FeeConfig::default());
        assert_eq!(estimator.get(false, PriorityTier::High).await, 200_000_000);
        assert_eq!(estimator.get(true, PriorityTier::High).await, 200_000_000);
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn normalized_orders_clamp_bounds() {
        let config = FeeConfig {
            min_fee: 10,
            max_fee: 5,
            ..FeeConfig::default()
        }
        .normalized();
        assert_eq!((config.min_fee, config.max_fee), (5, 10));
    }
}
