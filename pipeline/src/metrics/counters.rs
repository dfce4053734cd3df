use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cumulative counters across every batch a pipeline has run.
#[derive(Clone, Default)]
pub struct RunCounters {
    pub runs: Arc<AtomicU64>,

    pub units_seen: Arc<AtomicU64>,
    pub units_malformed: Arc<AtomicU64>,
    pub mentions_accepted: Arc<AtomicU64>,

    pub signals_emitted: Arc<AtomicU64>,

    // abstention reasons
    pub abstained_insufficient_evidence: Arc<AtomicU64>,
    pub abstained_provider_unavailable: Arc<AtomicU64>,
    pub ticker_failures: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub runs: u64,
    pub units_seen: u64,
    pub units_malformed: u64,
    pub mentions_accepted: u64,
    pub signals_emitted: u64,
    pub abstained_insufficient_evidence: u64,
    pub abstained_provider_unavailable: u64,
    pub ticker_failures: u64,
}

impl RunCounters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            runs: load(&self.runs),
            units_seen: load(&self.units_seen),
            units_malformed: load(&self.units_malformed),
            mentions_accepted: load(&self.mentions_accepted),
            signals_emitted: load(&self.signals_emitted),
            abstained_insufficient_evidence: load(&self.abstained_insufficient_evidence),
            abstained_provider_unavailable: load(&self.abstained_provider_unavailable),
            ticker_failures: load(&self.ticker_failures),
        }
    }
}
