use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Items kept in timestamp order, oldest first.
///
/// Out-of-order inserts are placed by binary search, so late-arriving
/// comments land where they belong instead of at the back.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    window: VecDeque<(DateTime<Utc>, T)>,
}

impl<T> Default for RollingWindow<T> {
    fn default() -> Self {
        Self {
            window: VecDeque::new(),
        }
    }
}

impl<T> RollingWindow<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: DateTime<Utc>, item: T) {
        let idx = self.window.partition_point(|(ts, _)| *ts <= at);
        self.window.insert(idx, (at, item));
    }

    /// Drops every item strictly older than `cutoff`. Returns how many were dropped.
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let stale = self.window.partition_point(|(ts, _)| *ts < cutoff);
        self.window.drain(..stale);
        stale
    }

    /// Items with timestamp `<= until`, oldest first.
    pub fn iter_until(&self, until: DateTime<Utc>) -> impl Iterator<Item = (DateTime<Utc>, &T)> {
        self.window
            .iter()
            .take_while(move |(ts, _)| *ts <= until)
            .map(|(ts, item)| (*ts, item))
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 29, 14, 0, 0).unwrap() + Duration::minutes(min)
    }

    #[test]
    fn out_of_order_pushes_are_sorted() {
        let mut w = RollingWindow::new();
        w.push(t(10), "b");
        w.push(t(0), "a");
        w.push(t(20), "c");
        w.push(t(10), "b2");

        let order: Vec<_> = w.iter_until(t(60)).map(|(_, s)| *s).collect();
        assert_eq!(order, vec!["a", "b", "b2", "c"]);
    }

    #[test]
    fn evict_before_is_exclusive_of_cutoff() {
        let mut w = RollingWindow::new();
        for m in [0, 5, 10, 15] {
            w.push(t(m), m);
        }
        assert_eq!(w.evict_before(t(10)), 2);
        assert_eq!(w.len(), 2);
        assert_eq!(w.evict_before(t(10)), 0);
    }

    #[test]
    fn iter_until_skips_future_items() {
        let mut w = RollingWindow::new();
        w.push(t(0), 1);
        w.push(t(30), 2);
        assert_eq!(w.iter_until(t(10)).count(), 1);
        assert_eq!(w.len(), 2);
    }
}
