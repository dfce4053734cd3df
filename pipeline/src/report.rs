use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use engine::sentiment::TickerSentiment;
use engine::{Abstention, Signal, Verdict};

/// Outcome of one batch: every candidate ticker appears exactly once, with
/// either a signal or the reason none was produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub trace_id: String,
    pub as_of: DateTime<Utc>,
    pub units_seen: usize,
    pub units_skipped: usize,
    pub mentions_accepted: usize,
    /// Mean polarity of this batch's units, per ticker.
    pub sentiment: BTreeMap<String, TickerSentiment>,
    pub outcomes: BTreeMap<String, Verdict>,
}

impl RunReport {
    /// Emitted signals, strongest |score| first. Ties keep ticker order.
    pub fn ranked_signals(&self) -> Vec<&Signal> {
        let mut signals: Vec<&Signal> =
            self.outcomes.values().filter_map(Verdict::signal).collect();
        signals.sort_by(|a, b| b.score.abs().total_cmp(&a.score.abs()));
        signals
    }

    pub fn abstentions(&self) -> Vec<(&str, &Abstention)> {
        self.outcomes
            .iter()
            .filter_map(|(ticker, verdict)| match verdict {
                Verdict::Abstained(reason) => Some((ticker.as_str(), reason)),
                Verdict::Emitted(_) => None,
            })
            .collect()
    }

    pub fn outcome(&self, ticker: &str) -> Option<&Verdict> {
        self.outcomes.get(ticker)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
