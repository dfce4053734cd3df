pub mod counters;

pub use counters::{CounterSnapshot, RunCounters};
