//! TTL-bounded, single-flight cache in front of a [`MarketDataProvider`].
//!
//! Guarantees:
//! - At most one provider call is in flight per [`CacheKey`]; concurrent
//!   callers for the same key wait on it and share its outcome.
//! - A fresh entry (age <= ttl) is served without touching the provider.
//! - An expired entry is only served after a failed refresh, and only while
//!   its age is within `ttl * grace_multiple`.
//! - `fetched_at` only moves when a fetch completes successfully; a cancelled
//!   fetch leaves the previous entry exactly as it was.
//! - A key with no entry and no fetch in flight holds no slot, so lookups
//!   for unknown tickers do not grow the map.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use common::ConfigError;
use common::logger::warn_if_slow;

use crate::error::MarketDataError;
use crate::features::{FeatureConfig, compute_features, usable_sessions};
use crate::provider::MarketDataProvider;
use crate::types::{CacheKey, DailyBar, DataKind, MarketFeatureSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness bound for a cached provider response.
    pub ttl_secs: u64,

    /// After a failed refresh, an entry up to `ttl * grace_multiple` old may still be served.
    pub grace_multiple: f64,

    /// Provider calls slower than this are logged under the `performance` target.
    pub slow_fetch_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            grace_multiple: 4.0,
            slow_fetch_ms: 2_000,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::NotPositive {
                key: "cache.ttl_secs",
            });
        }
        ConfigError::check_range("cache.grace_multiple", self.grace_multiple, 1.0, 1_000.0)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn grace(&self) -> Duration {
        self.ttl().mul_f64(self.grace_multiple)
    }
}

type Bars = Arc<Vec<DailyBar>>;
type FetchOutcome = Result<Bars, MarketDataError>;

#[derive(Debug, Clone)]
struct CacheEntry {
    bars: Bars,
    fetched_at: Instant,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    /// Present while a fetch is in flight. Its sender lives with the fetching caller.
    pending: Option<watch::Receiver<Option<FetchOutcome>>>,
}

impl Slot {
    /// Nothing cached and nothing in flight; the slot can be dropped.
    fn is_vacant(&self) -> bool {
        self.entry.is_none() && self.pending.is_none()
    }
}

enum Role {
    Leader(watch::Sender<Option<FetchOutcome>>),
    Follower(watch::Receiver<Option<FetchOutcome>>),
}

pub struct MarketDataCache<P> {
    provider: Arc<P>,
    features: FeatureConfig,
    cfg: CacheConfig,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    provider_calls: AtomicU64,
}

impl<P: MarketDataProvider> MarketDataCache<P> {
    pub fn new(provider: Arc<P>, features: FeatureConfig, cfg: CacheConfig) -> Self {
        Self {
            provider,
            features,
            cfg,
            slots: Mutex::new(HashMap::new()),
            provider_calls: AtomicU64::new(0),
        }
    }

    /// Total provider calls issued since construction.
    pub fn provider_calls(&self) -> u64 {
        self.provider_calls.load(Ordering::Relaxed)
    }

    /// Drops every cached entry for `ticker`. In-flight fetches are unaffected.
    pub fn invalidate(&self, ticker: &str) {
        let mut slots = self.slots.lock();
        for (key, slot) in slots.iter_mut() {
            if key.ticker == ticker {
                slot.entry = None;
            }
        }
        slots.retain(|_, slot| !slot.is_vacant());
    }

    /// Market features for `ticker` as of `as_of`.
    ///
    /// May suspend while a provider fetch is in flight. Never fabricates
    /// values: failures surface as [`MarketDataError`].
    #[instrument(skip(self), fields(ticker = %ticker), level = "debug")]
    pub async fn get_features(
        &self,
        ticker: &str,
        as_of: DateTime<Utc>,
    ) -> Result<MarketFeatureSnapshot, MarketDataError> {
        let key = CacheKey::new(
            ticker,
            DataKind::DailyBars {
                lookback_days: self.features.fetch_window_days(),
            },
        );
        let bars = self.get_bars(&key).await?;
        compute_features(ticker, &bars, as_of, &self.features)
    }

    async fn get_bars(&self, key: &CacheKey) -> FetchOutcome {
        loop {
            let role = {
                let mut slots = self.slots.lock();
                let slot = slots.entry(key.clone()).or_default();

                if let Some(entry) = &slot.entry {
                    if entry.age(Instant::now()) <= self.cfg.ttl() {
                        debug!(ticker = %key.ticker, "cache hit");
                        return Ok(entry.bars.clone());
                    }
                }

                // Claiming the fetch happens under the slot lock, so exactly one
                // caller sees `pending == None` and becomes the leader.
                match &slot.pending {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        slot.pending = Some(rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => return self.lead_fetch(key, tx).await,
                Role::Follower(rx) => {
                    if let Some(outcome) = wait_for_leader(rx).await {
                        return outcome;
                    }
                    // Leader was cancelled before finishing; contend again.
                    debug!(ticker = %key.ticker, "in-flight fetch abandoned; retrying");
                }
            }
        }
    }

    async fn lead_fetch(
        &self,
        key: &CacheKey,
        tx: watch::Sender<Option<FetchOutcome>>,
    ) -> FetchOutcome {
        let guard = PendingGuard {
            slots: &self.slots,
            key,
            tx: Some(tx),
        };

        let DataKind::DailyBars { lookback_days } = key.kind;
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        let fetched = warn_if_slow(
            "market_fetch",
            Duration::from_millis(self.cfg.slow_fetch_ms),
            self.provider.fetch(&key.ticker, lookback_days),
        )
        .await;

        let need = self.features.required_sessions();
        let outcome = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.clone()).or_default();
            slot.pending = None;
            let now = Instant::now();

            let refreshed = match fetched {
                Ok(bars) if usable_sessions(&bars) >= need => {
                    let bars = Arc::new(bars);
                    slot.entry = Some(CacheEntry {
                        bars: bars.clone(),
                        fetched_at: now,
                    });
                    debug!(ticker = %key.ticker, rows = bars.len(), "cache refreshed");
                    Ok(bars)
                }
                Ok(bars) => Err(MarketDataError::InsufficientHistory {
                    ticker: key.ticker.clone(),
                    have: usable_sessions(&bars),
                    need,
                }),
                Err(e) => Err(MarketDataError::ProviderUnavailable {
                    ticker: key.ticker.clone(),
                    reason: e.to_string(),
                }),
            };

            let outcome = match refreshed {
                Ok(bars) => Ok(bars),
                Err(err) => match &slot.entry {
                    Some(stale) if stale.age(now) <= self.cfg.grace() => {
                        warn!(
                            ticker = %key.ticker,
                            age_secs = stale.age(now).as_secs(),
                            error = %err,
                            "refresh failed; serving stale entry within grace"
                        );
                        Ok(stale.bars.clone())
                    }
                    _ => {
                        warn!(ticker = %key.ticker, error = %err, "market data unavailable");
                        Err(err)
                    }
                },
            };

            // A failed first fetch leaves nothing worth keeping.
            if slot.is_vacant() {
                slots.remove(key);
            }
            outcome
        };

        guard.complete(outcome.clone());
        outcome
    }
}

/// Waits for the leader's outcome. `None` means the leader went away without one.
async fn wait_for_leader(mut rx: watch::Receiver<Option<FetchOutcome>>) -> Option<FetchOutcome> {
    loop {
        let current = rx.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

/// Releases the pending marker if the leading future is dropped mid-fetch.
struct PendingGuard<'a> {
    slots: &'a Mutex<HashMap<CacheKey, Slot>>,
    key: &'a CacheKey,
    tx: Option<watch::Sender<Option<FetchOutcome>>>,
}

impl PendingGuard<'_> {
    fn complete(mut self, outcome: FetchOutcome) {
        if let Some(tx) = self.tx.take() {
            // No receivers is fine: nobody was waiting.
            let _ = tx.send(Some(outcome));
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // Cancelled: clear the marker first so woken followers can claim a new fetch.
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.get_mut(self.key) {
                slot.pending = None;
                if slot.is_vacant() {
                    slots.remove(self.key);
                }
            }
            drop(slots);
            self.tx.take();
        }
    }
}
