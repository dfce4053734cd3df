use chrono::Duration;

/// Fractional hours in a (possibly negative) duration.
pub fn as_hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

/// Duration from fractional hours, rounded to the millisecond.
pub fn from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}
