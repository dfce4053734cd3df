//! Derived price/volume features.
//!
//! Pure functions over provider history. Every feature is computed from a
//! trailing window of usable sessions ending at or before `as_of`, so a
//! snapshot never looks into the future. The short window
//! (`lookback_days + 1` sessions) is mandatory; the long one
//! (`long_lookback_days + 1`) is reported only when history covers it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::ConfigError;

use crate::error::MarketDataError;
use crate::types::{DailyBar, MarketFeatureSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Sessions covered by the N-day return, volatility and volume average.
    pub lookback_days: usize,

    /// Volume ratio at or above this multiple is flagged abnormal.
    pub abnormal_volume_multiple: f64,

    /// Scale daily volatility by `sqrt(trading_days_per_year)`.
    pub annualize_volatility: bool,

    pub trading_days_per_year: f64,

    /// Sessions covered by the long-horizon return and volatility.
    pub long_lookback_days: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lookback_days: 5,
            abnormal_volume_multiple: 2.0,
            annualize_volatility: true,
            trading_days_per_year: 252.0,
            long_lookback_days: 20,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_days < 2 {
            return Err(ConfigError::Invalid {
                key: "market.lookback_days",
                reason: format!("need at least 2 sessions, got {}", self.lookback_days),
            });
        }
        ConfigError::check_positive(
            "market.abnormal_volume_multiple",
            self.abnormal_volume_multiple,
        )?;
        ConfigError::check_positive(
            "market.trading_days_per_year",
            self.trading_days_per_year,
        )?;
        if self.long_lookback_days <= self.lookback_days {
            return Err(ConfigError::Invalid {
                key: "market.long_lookback_days",
                reason: format!(
                    "must exceed lookback_days ({}), got {}",
                    self.lookback_days, self.long_lookback_days
                ),
            });
        }
        Ok(())
    }

    /// Usable sessions needed to compute a snapshot.
    pub fn required_sessions(&self) -> usize {
        self.lookback_days + 1
    }

    /// Calendar days to request so that weekends and holidays still leave
    /// enough trading sessions for the long window.
    pub fn fetch_window_days(&self) -> u32 {
        (self.long_lookback_days as u32 + 1) * 2 + 7
    }
}

fn is_usable(bar: &DailyBar) -> bool {
    bar.close.is_finite() && bar.close > 0.0 && bar.volume.is_finite() && bar.volume > 0.0
}

/// Number of sessions a provider response contributes to feature computation.
pub fn usable_sessions(bars: &[DailyBar]) -> usize {
    bars.iter().filter(|b| is_usable(b)).count()
}

/// Computes a [`MarketFeatureSnapshot`] from daily history.
///
/// Bars may arrive in any order; rows with a non-positive close or volume
/// are ignored. Fails with `InsufficientHistory` rather than guessing.
pub fn compute_features(
    ticker: &str,
    bars: &[DailyBar],
    as_of: DateTime<Utc>,
    cfg: &FeatureConfig,
) -> Result<MarketFeatureSnapshot, MarketDataError> {
    let cutoff = as_of.date_naive();

    let mut usable: Vec<&DailyBar> = bars
        .iter()
        .filter(|b| b.date <= cutoff && is_usable(b))
        .collect();
    usable.sort_by_key(|b| b.date);
    // Same-date duplicates: the later row wins.
    usable.dedup_by(|later, earlier| {
        if later.date == earlier.date {
            *earlier = *later;
            true
        } else {
            false
        }
    });

    let need = cfg.required_sessions();
    if usable.len() < need {
        return Err(MarketDataError::InsufficientHistory {
            ticker: ticker.to_string(),
            have: usable.len(),
            need,
        });
    }

    let window = &usable[usable.len() - need..];
    let prev = window[need - 2];
    let last = window[need - 1];

    let return_1d = last.close / prev.close - 1.0;
    let (n_day_return, volatility) = return_and_volatility(window, cfg);

    let long_need = cfg.long_lookback_days + 1;
    let (n_day_return_long, volatility_long) = if usable.len() >= long_need {
        let (r, v) = return_and_volatility(&usable[usable.len() - long_need..], cfg);
        (Some(r), Some(v))
    } else {
        (None, None)
    };

    let trailing = &window[..need - 1];
    let avg_volume = trailing.iter().map(|b| b.volume).sum::<f64>() / trailing.len() as f64;
    let volume_ratio = last.volume / avg_volume;

    Ok(MarketFeatureSnapshot {
        ticker: ticker.to_string(),
        as_of,
        session_date: last.date,
        last_close: last.close,
        return_1d,
        n_day_return,
        volatility,
        n_day_return_long,
        volatility_long,
        volume_ratio,
        abnormal_volume: volume_ratio >= cfg.abnormal_volume_multiple,
    })
}

/// First-to-last return and log-return volatility over `window`.
fn return_and_volatility(window: &[&DailyBar], cfg: &FeatureConfig) -> (f64, f64) {
    let (first, last) = (window[0], window[window.len() - 1]);
    let log_returns: Vec<f64> = window
        .windows(2)
        .map(|w| (w[1].close / w[0].close).ln())
        .collect();
    let mut volatility = sample_std(&log_returns);
    if cfg.annualize_volatility {
        volatility *= cfg.trading_days_per_year.sqrt();
    }
    (last.close / first.close - 1.0, volatility)
}

/// Sample (n - 1) standard deviation; zero for fewer than two values.
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, NaiveDate};

    use crate::types::DailyBar;

    /// Consecutive daily bars from `(close, volume)` pairs starting 2024-01-01.
    pub fn bars(rows: &[(f64, f64)]) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        rows.iter()
            .enumerate()
            .map(|(i, &(close, volume))| DailyBar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }
}


#[cfg(test)]
mod proptests {
    use super::test_support::bars;
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]
        #[test]
        fn features_are_finite_and_volatility_non_negative(
            rows in prop::collection::vec((0.01..10_000.0f64, 1.0..1e9f64), 3..40),
            lookback in 2usize..10,
        ) {
            let history = bars(&rows);
            let cfg = FeatureConfig { lookback_days: lookback, ..Default::default() };
            let as_of = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

            match compute_features("P", &history, as_of, &cfg) {
                Ok(s) => {
                    prop_assert!(s.n_day_return.is_finite());
                    prop_assert!(s.n_day_return > -1.0);
                    prop_assert!(s.volatility.is_finite() && s.volatility >= 0.0);
                    prop_assert!(s.volume_ratio.is_finite() && s.volume_ratio > 0.0);
                    prop_assert_eq!(
                        s.abnormal_volume,
                        s.volume_ratio >= cfg.abnormal_volume_multiple
                    );
                    prop_assert_eq!(
                        s.n_day_return_long.is_some(),
                        rows.len() > cfg.long_lookback_days
                    );
                    if let Some(v) = s.volatility_long {
                        prop_assert!(v.is_finite() && v >= 0.0);
                    }
                }
                Err(MarketDataError::InsufficientHistory { have, need, .. }) => {
                    prop_assert!(have < need);
                    prop_assert_eq!(need, lookback + 1);
                }
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }
    }
}
