//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Whole seconds elapsed between this timestamp and now, clamped at zero.
    pub fn elapsed_secs(&self) -> u64 {
        Timestamp::now()
            .duration_since(self)
            .num_seconds()
            .max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_now_creates_current_time() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();

        assert!(ts.0 >= before);
        assert!(ts.0 <= after);
    }

    #[test]
    fn duration_since_is_signed() {
        let earlier = Timestamp(Utc::now() - Duration::seconds(30));
        let later = Timestamp::now();

        assert!(later.duration_since(&earlier).num_seconds() >= 30);
        assert!(earlier.duration_since(&later).num_seconds() <= -30);
    }

    #[test]
    fn elapsed_secs_counts_from_the_past() {
        let started = Timestamp(Utc::now() - Duration::seconds(90));
        assert!(started.elapsed_secs() >= 90);
    }

    #[test]
    fn elapsed_secs_clamps_future_to_zero() {
        let future = Timestamp(Utc::now() + Duration::seconds(90));
        assert_eq!(future.elapsed_secs(), 0);
    }

    #[test]
    fn timestamp_serializes_as_rfc3339() {
        let dt = DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_string(&Timestamp(dt)).unwrap();
        assert!(json.contains("2024-01-15T10:30:00"));
    }
}
