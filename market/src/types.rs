use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One daily OHLCV session as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Kind of provider data a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Daily bars covering at least `lookback_days` calendar days.
    DailyBars { lookback_days: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ticker: String,
    pub kind: DataKind,
}

impl CacheKey {
    pub fn new(ticker: impl Into<String>, kind: DataKind) -> Self {
        Self {
            ticker: ticker.into(),
            kind,
        }
    }
}

/// Price/volume features for one ticker at a point in time.
///
/// Only ever built from real provider history; there is no "empty" snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFeatureSnapshot {
    pub ticker: String,

    /// Point in time the snapshot was requested for.
    pub as_of: DateTime<Utc>,

    /// Most recent session used (no session after `as_of` is ever used).
    pub session_date: NaiveDate,

    pub last_close: f64,

    /// Close-to-close change over the last session.
    pub return_1d: f64,

    /// Close-to-close change over the configured lookback.
    pub n_day_return: f64,

    /// Standard deviation of daily log returns over the lookback,
    /// annualised when configured.
    pub volatility: f64,

    /// Return over `long_lookback_days`, when history covers it.
    pub n_day_return_long: Option<f64>,

    /// Volatility over `long_lookback_days`, when history covers it.
    pub volatility_long: Option<f64>,

    /// Last session volume over the trailing lookback average volume.
    pub volume_ratio: f64,

    /// `volume_ratio` is at or above the configured abnormal multiple.
    pub abnormal_volume: bool,
}
