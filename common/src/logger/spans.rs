use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{Span, field};

use super::TraceId;

/// Root span for one batch run.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "run",
        name = %name,
        trace_id = %trace_id.as_str(),
        ticker = field::Empty
    )
}

/// Child span; inherits `trace_id` from the enclosing root span.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("step", name = %name, ticker = field::Empty)
}

/// Records the ticker on the current span, if the span declared the field.
pub fn annotate_ticker(ticker: &str) {
    Span::current().record("ticker", field::display(ticker));
}

/// Awaits `fut` and warns under the `performance` target when it took longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
