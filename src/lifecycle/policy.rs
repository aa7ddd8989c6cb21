//! Rotation policy evaluation logic.
//!
//! Rotation is time-based only: the configured duration is folded into a
//! millisecond threshold once, and each write compares the time elapsed since
//! the last rotation against it. There is no background timer; a due rotation
//! takes effect on the next write.

use serde::{Deserialize, Serialize};

pub const MS_PER_DAY: u64 = 86_400_000;
pub const MS_PER_HOUR: u64 = 3_600_000;
pub const MS_PER_MINUTE: u64 = 60_000;
pub const MS_PER_SECOND: u64 = 1_000;

/// How often an archive file is retired.
///
/// Every duration component is optional; absent components contribute nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    pub days: Option<u64>,
    pub hours: Option<u64>,
    pub minutes: Option<u64>,
    pub seconds: Option<u64>,
    pub milliseconds: Option<u64>,

    /// Accepted for configuration compatibility. Not evaluated by rotation.
    pub max_size_bytes: Option<u64>,

    /// Accepted for configuration compatibility. Not evaluated by rotation.
    pub max_files: Option<u64>,
}

impl RotationSettings {
    pub fn days(days: u64) -> Self {
        Self {
            days: Some(days),
            ..Default::default()
        }
    }

    pub fn hours(hours: u64) -> Self {
        Self {
            hours: Some(hours),
            ..Default::default()
        }
    }

    pub fn minutes(minutes: u64) -> Self {
        Self {
            minutes: Some(minutes),
            ..Default::default()
        }
    }

    pub fn seconds(seconds: u64) -> Self {
        Self {
            seconds: Some(seconds),
            ..Default::default()
        }
    }

    pub fn milliseconds(milliseconds: u64) -> Self {
        Self {
            milliseconds: Some(milliseconds),
            ..Default::default()
        }
    }
}

/// Fold a rotation duration into total milliseconds.
///
/// A settings value with no duration component yields 0, which in practice
/// rotates on every write after the first millisecond of a file's life.
pub fn milliseconds_from_settings(settings: &RotationSettings) -> u64 {
    [
        (settings.days, MS_PER_DAY),
        (settings.hours, MS_PER_HOUR),
        (settings.minutes, MS_PER_MINUTE),
        (settings.seconds, MS_PER_SECOND),
        (settings.milliseconds, 1),
    ]
    .iter()
    .map(|(value, multiplier)| value.unwrap_or(0).saturating_mul(*multiplier))
    .fold(0u64, u64::saturating_add)
}

/// Rotation threshold plus the queries derived from it.
///
/// `last_rotation_ms` is `None` until the first archive file has been created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    interval_ms: u64,
}

impl RotationPolicy {
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms }
    }

    pub fn from_settings(settings: &RotationSettings) -> Self {
        Self::new(milliseconds_from_settings(settings))
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Whole seconds since the last rotation.
    ///
    /// Never having rotated reports the current time in seconds.
    pub fn seconds_since_rotation(&self, last_rotation_ms: Option<i64>, now_ms: i64) -> i64 {
        match last_rotation_ms {
            None => now_ms.div_euclid(1_000),
            Some(last) => now_ms.saturating_sub(last).div_euclid(1_000),
        }
    }

    /// Whole seconds until the next rotation is due, floored.
    ///
    /// Negative once the interval has been exceeded. Never having rotated
    /// reports the full interval.
    pub fn seconds_until_rotation(&self, last_rotation_ms: Option<i64>, now_ms: i64) -> i64 {
        let interval = i64::try_from(self.interval_ms).unwrap_or(i64::MAX);
        match last_rotation_ms {
            None => interval.div_euclid(1_000),
            Some(last) => last
                .saturating_add(interval)
                .saturating_sub(now_ms)
                .div_euclid(1_000),
        }
    }

    pub fn should_rotate(&self, last_rotation_ms: Option<i64>, now_ms: i64) -> bool {
        self.seconds_until_rotation(last_rotation_ms, now_ms) < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_component() {
        assert_eq!(milliseconds_from_settings(&RotationSettings::hours(12)), 43_200_000);
        assert_eq!(milliseconds_from_settings(&RotationSettings::days(1)), MS_PER_DAY);
        assert_eq!(milliseconds_from_settings(&RotationSettings::minutes(5)), 300_000);
        assert_eq!(milliseconds_from_settings(&RotationSettings::seconds(7)), 7_000);
        assert_eq!(milliseconds_from_settings(&RotationSettings::milliseconds(9)), 9);
    }

    #[test]
    fn test_all_components_sum() {
        let settings = RotationSettings {
            days: Some(2),
            hours: Some(3),
            minutes: Some(20),
            seconds: Some(3),
            milliseconds: Some(21),
            ..Default::default()
        };
        assert_eq!(milliseconds_from_settings(&settings), 184_803_021);
    }

    #[test]
    fn test_thresholds_do_not_contribute() {
        let settings = RotationSettings {
            max_size_bytes: Some(1 << 20),
            max_files: Some(10),
            ..Default::default()
        };
        assert_eq!(milliseconds_from_settings(&settings), 0);
    }

    #[test]
    fn test_overflow_saturates() {
        let settings = RotationSettings {
            days: Some(u64::MAX),
            hours: Some(1),
            ..Default::default()
        };
        assert_eq!(milliseconds_from_settings(&settings), u64::MAX);
        let policy = RotationPolicy::from_settings(&settings);
        assert!(!policy.should_rotate(Some(0), i64::MAX));
    }

    #[test]
    fn test_never_rotated() {
        let policy = RotationPolicy::new(90_500);
        assert_eq!(policy.seconds_since_rotation(None, 1_700_000_000_123), 1_700_000_000);
        assert_eq!(policy.seconds_until_rotation(None, 1_700_000_000_123), 90);
        assert!(!policy.should_rotate(None, 1_700_000_000_123));
    }

    #[test]
    fn test_elapsed_and_remaining() {
        let policy = RotationPolicy::new(10_000);
        let last = Some(1_000_000);

        assert_eq!(policy.seconds_since_rotation(last, 1_000_000), 0);
        assert_eq!(policy.seconds_since_rotation(last, 1_004_999), 4);
        assert_eq!(policy.seconds_until_rotation(last, 1_004_999), 5);
        assert_eq!(policy.seconds_until_rotation(last, 1_010_000), 0);
        assert!(!policy.should_rotate(last, 1_010_000));
    }

    #[test]
    fn test_rotation_due_just_past_interval() {
        let policy = RotationPolicy::new(10_000);
        let last = Some(1_000_000);

        assert_eq!(policy.seconds_until_rotation(last, 1_010_001), -1);
        assert!(policy.should_rotate(last, 1_010_001));
    }

    #[test]
    fn test_zero_interval_rotates_after_first_millisecond() {
        let policy = RotationPolicy::new(0);
        assert!(!policy.should_rotate(Some(500), 500));
        assert!(policy.should_rotate(Some(500), 501));
    }
}
