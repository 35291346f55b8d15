use chrono::{DateTime, Utc};

/// Fractional hours elapsed between two timestamps, never negative
pub fn age_hours(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - observed_at).num_milliseconds().max(0);
    millis as f64 / 3_600_000.0
}

/// Calendar day key used for daily cache partitioning
pub fn day_key(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}

/// Linear freshness decay over `window_hours` down to `floor`
pub fn linear_freshness(observed_at: DateTime<Utc>, now: DateTime<Utc>, window_hours: f64, floor: f64) -> f64 {
    let decayed = 1.0 - age_hours(observed_at, now) / window_hours;
    decayed.max(floor).min(1.0)
}

/// Banded freshness used when summarising upstream source snapshots
pub fn banded_freshness(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = age_hours(observed_at, now);
    if hours < 1.0 {
        1.0
    } else if hours < 6.0 {
        0.8
    } else if hours < 24.0 {
        0.6
    } else {
        0.3
    }
}
