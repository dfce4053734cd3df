//! Per-ticker rolling attention: how much, how fast, and how favourably a
//! ticker is being talked about.
//!
//! Each ticker owns its own window behind its own lock, so appends for
//! different tickers never contend. The outer map lock is only taken for
//! writing the first time a ticker is seen.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::ConfigError;
use common::time::{as_hours, from_hours};

use crate::rolling_window::RollingWindow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Trailing window, in hours, that mentions stay relevant for.
    pub window_hours: f64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self { window_hours: 6.0 }
    }
}

impl AttentionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range(
            "attention.window_hours",
            self.window_hours,
            1.0 / 60.0,
            24.0 * 30.0,
        )
    }

    pub fn window(&self) -> Duration {
        from_hours(self.window_hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MentionEvent {
    engagement: f64,
    sentiment: f64,
}

/// Read-only view of one ticker's window at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionWindowState {
    pub ticker: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub mention_count: usize,
    pub engagement_sum: f64,
    pub sentiment_sum: f64,
    /// `Σ sentiment × engagement` over the window.
    pub weighted_sentiment_sum: f64,
    /// Mention times inside the window, oldest first.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl AttentionWindowState {
    pub fn window_hours(&self) -> f64 {
        as_hours(self.window_end - self.window_start)
    }

    /// Mentions per hour over the configured window length.
    pub fn velocity(&self) -> f64 {
        let hours = self.window_hours();
        if hours <= 0.0 {
            return 0.0;
        }
        self.mention_count as f64 / hours
    }

    /// Engagement-weighted mean sentiment, in `[-1, 1]`.
    ///
    /// Dividing by total engagement keeps the value on the sentiment scale
    /// however many or however popular the mentions are.
    pub fn momentum(&self) -> f64 {
        if self.engagement_sum > 0.0 {
            (self.weighted_sentiment_sum / self.engagement_sum).clamp(-1.0, 1.0)
        } else {
            self.mean_sentiment()
        }
    }

    pub fn first_mention(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_mention(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    pub fn mean_sentiment(&self) -> f64 {
        if self.mention_count == 0 {
            return 0.0;
        }
        self.sentiment_sum / self.mention_count as f64
    }
}

type TickerWindow = Arc<Mutex<RollingWindow<MentionEvent>>>;

#[derive(Debug)]
pub struct AttentionAggregator {
    window: Duration,
    window_hours: f64,
    tickers: RwLock<HashMap<String, TickerWindow>>,
}

impl AttentionAggregator {
    pub fn new(cfg: &AttentionConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            window: cfg.window(),
            window_hours: cfg.window_hours,
            tickers: RwLock::new(HashMap::new()),
        })
    }

    pub fn window_hours(&self) -> f64 {
        self.window_hours
    }

    /// Appends one mention. Sentiment is clamped to `[-1, 1]`; a non-finite
    /// or negative engagement weight is replaced by zero.
    pub fn record(&self, ticker: &str, at: DateTime<Utc>, engagement: f64, sentiment: f64) {
        let engagement = if engagement.is_finite() && engagement >= 0.0 {
            engagement
        } else {
            warn!(%ticker, engagement, "invalid engagement weight, recording as zero");
            0.0
        };
        let sentiment = if sentiment.is_finite() {
            sentiment.clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let event = MentionEvent {
            engagement,
            sentiment,
        };

        // The map lock is held across the push so `prune` can never drop a
        // window between lookup and append.
        {
            let map = self.tickers.read();
            if let Some(window) = map.get(ticker) {
                window.lock().push(at, event);
                return;
            }
        }
        self.tickers
            .write()
            .entry(ticker.to_string())
            .or_default()
            .lock()
            .push(at, event);
    }

    /// Window state as of `as_of`, or `None` if no mention falls inside it.
    ///
    /// Mentions older than `as_of - window` are evicted for good. Mentions
    /// stamped after `as_of` are kept but not counted.
    pub fn snapshot(&self, ticker: &str, as_of: DateTime<Utc>) -> Option<AttentionWindowState> {
        let window = self.tickers.read().get(ticker).cloned()?;
        let window_start = as_of - self.window;

        let mut guard = window.lock();
        let evicted = guard.evict_before(window_start);
        if evicted > 0 {
            debug!(%ticker, evicted, "evicted stale mentions");
        }

        let mut state = AttentionWindowState {
            ticker: ticker.to_string(),
            window_start,
            window_end: as_of,
            mention_count: 0,
            engagement_sum: 0.0,
            sentiment_sum: 0.0,
            weighted_sentiment_sum: 0.0,
            timestamps: Vec::new(),
        };
        for (at, ev) in guard.iter_until(as_of) {
            state.mention_count += 1;
            state.engagement_sum += ev.engagement;
            state.sentiment_sum += ev.sentiment;
            state.weighted_sentiment_sum += ev.sentiment * ev.engagement;
            state.timestamps.push(at);
        }

        (state.mention_count > 0).then_some(state)
    }

    /// Snapshots of every ticker with at least one mention in its window.
    pub fn snapshot_all(&self, as_of: DateTime<Utc>) -> Vec<AttentionWindowState> {
        self.tickers()
            .into_iter()
            .filter_map(|t| self.snapshot(&t, as_of))
            .collect()
    }

    /// Every ticker that has ever been recorded and not pruned, sorted.
    pub fn tickers(&self) -> Vec<String> {
        let mut out: Vec<String> = self.tickers.read().keys().cloned().collect();
        out.sort();
        out
    }

    /// Evicts stale mentions everywhere and forgets tickers left empty.
    pub fn prune(&self, as_of: DateTime<Utc>) -> usize {
        let cutoff = as_of - self.window;
        let mut map = self.tickers.write();
        let before = map.len();
        map.retain(|_, window| {
            let mut guard = window.lock();
            guard.evict_before(cutoff);
            !guard.is_empty()
        });
        before - map.len()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn velocity_is_monotonic_in_mentions(base in 1usize..40, extra in 1usize..40) {
            let as_of = Utc.with_ymd_and_hms(2024, 1, 29, 14, 0, 0).unwrap();
            let a = AttentionAggregator::new(&AttentionConfig::default()).unwrap();
            for i in 0..base {
                a.record("GME", as_of - Duration::minutes(i as i64), 1.0, 0.0);
            }
            let before = a.snapshot("GME", as_of).unwrap().velocity();
            for i in 0..extra {
                a.record("GME", as_of - Duration::minutes(i as i64), 1.0, 0.0);
            }
            let after = a.snapshot("GME", as_of).unwrap().velocity();
            prop_assert!(after > before);
        }

        #[test]
        fn momentum_is_bounded(
            events in prop::collection::vec((0.0f64..1e6, -1.0f64..=1.0), 1..50),
        ) {
            let as_of = Utc.with_ymd_and_hms(2024, 1, 29, 14, 0, 0).unwrap();
            let a = AttentionAggregator::new(&AttentionConfig::default()).unwrap();
            for (w, s) in events {
                a.record("GME", as_of, w, s);
            }
            let m = a.snapshot("GME", as_of).unwrap().momentum();
            prop_assert!((-1.0..=1.0).contains(&m));
        }
    }
}
