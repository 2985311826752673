//! Sending-window gate.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::lead::TimezoneBucket;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    /// No email goes out on this operator-local weekday, whatever the bucket.
    pub rest_day: Option<Weekday>,
}

impl Default for SendingWindow {
    fn default() -> Self {
        Self { start_hour: 9, end_hour: 17, rest_day: Some(Weekday::Sun) }
    }
}

impl SendingWindow {
    pub fn new(start_hour: u32, end_hour: u32, rest_day: Option<Weekday>) -> Self {
        Self { start_hour, end_hour, rest_day }
    }

    /// True when the bucket-shifted hour of `now_local` lies in `[start_hour, end_hour)`.
    pub fn is_within_window(&self, bucket: TimezoneBucket, now_local: NaiveDateTime) -> bool {
        if self.rest_day.is_some_and(|rest_day| now_local.weekday() == rest_day) {
            return false;
        }
        let shifted = now_local + Duration::hours(bucket.hour_offset());
        let hour = shifted.hour();
        self.start_hour <= hour && hour < self.end_hour
    }
}

/// Parses `sun`, `Sunday`, `none` and the like. `none`/empty disables the rest day.
pub fn parse_rest_day(value: &str) -> Result<Option<Weekday>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed.parse::<Weekday>().map(Some).map_err(|_| format!("`{value}` is not a weekday"))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, Weekday};

    use super::{parse_rest_day, SendingWindow};
    use crate::domain::lead::TimezoneBucket;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        // 2024-03-03 is a Sunday.
        NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn rest_day_blocks_every_hour_and_bucket() {
        let window = SendingWindow::default();
        for bucket in [TimezoneBucket::Local, TimezoneBucket::Apac, TimezoneBucket::Europe] {
            for hour in 0..24 {
                assert!(!window.is_within_window(bucket, at(3, hour)), "{bucket:?} {hour}");
            }
        }
    }

    #[test]
    fn local_bucket_uses_half_open_hour_range() {
        let window = SendingWindow::default();
        assert!(!window.is_within_window(TimezoneBucket::Local, at(4, 8)));
        assert!(window.is_within_window(TimezoneBucket::Local, at(4, 9)));
        assert!(window.is_within_window(TimezoneBucket::Local, at(4, 16)));
        assert!(!window.is_within_window(TimezoneBucket::Local, at(4, 17)));
    }

    #[test]
    fn buckets_shift_the_operator_clock() {
        let window = SendingWindow::default();
        // 19:00 local + 14h = 09:00 next day.
        assert!(window.is_within_window(TimezoneBucket::Apac, at(4, 19)));
        assert!(!window.is_within_window(TimezoneBucket::Local, at(4, 19)));
        // 04:00 local + 5h = 09:00.
        assert!(window.is_within_window(TimezoneBucket::Europe, at(4, 4)));
        assert!(!window.is_within_window(TimezoneBucket::Europe, at(4, 12)));
    }

    #[test]
    fn matches_reference_definition_for_every_hour_of_a_week() {
        let window = SendingWindow::new(8, 18, Some(Weekday::Sat));
        let start = at(4, 0);
        for offset in 0..(24 * 7) {
            let now = start + Duration::hours(offset);
            for bucket in [TimezoneBucket::Local, TimezoneBucket::Apac, TimezoneBucket::Europe] {
                let shifted_hour = ((offset % 24) + bucket.hour_offset()) % 24;
                let is_saturday = (offset / 24) == 5;
                let expected = !is_saturday && (8..18).contains(&shifted_hour);
                assert_eq!(window.is_within_window(bucket, now), expected, "{bucket:?} +{offset}h");
            }
        }
    }

    #[test]
    fn rest_day_parsing() {
        assert_eq!(parse_rest_day("sunday"), Ok(Some(Weekday::Sun)));
        assert_eq!(parse_rest_day("Sat"), Ok(Some(Weekday::Sat)));
        assert_eq!(parse_rest_day("none"), Ok(None));
        assert!(parse_rest_day("someday").is_err());
    }
}
