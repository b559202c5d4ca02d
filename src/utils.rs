use chrono::{DateTime, Utc};

/// Elapsed time between two instants, in fractional minutes.
/// Returns zero when `last` is not after `first`.
pub fn elapsed_minutes(first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let millis = last.signed_duration_since(first).num_milliseconds();
    if millis <= 0 {
        0.0
    } else {
        millis as f64 / 60_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_elapsed_minutes() {
        let first = Utc::now();
        assert_eq!(elapsed_minutes(first, first), 0.0);
        assert_eq!(elapsed_minutes(first, first + Duration::seconds(90)), 1.5);
        // Clock skew never yields a negative elapsed time
        assert_eq!(elapsed_minutes(first, first - Duration::seconds(10)), 0.0);
    }
}
