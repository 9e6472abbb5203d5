//! Daily duty-shift windows.
//!
//! Vehicles may only be dispatched inside a fixed local-time window each day
//! (e.g. 06:00 to 21:00). The window is anchored on UTC day boundaries and
//! shifted by the reference timezone's UTC offset, sampled once per day at
//! 12:00 UTC. Sampling at noon keeps the result away from the actual
//! transition instant, so on a DST-transition day the whole window moves by
//! the new offset and keeps its nominal length.

use chrono::{DateTime, Offset, TimeZone};
use chrono_tz::Tz;

use crate::interval::Interval;
use crate::model::{DAY, DurationMs, HOUR, UnixtimeMs};

/// Returns one window per calendar day covering `[earliest, latest)`.
///
/// `start_on_day` and `end_on_day` are offsets from local midnight. The
/// windows come out sorted and are not merged.
pub fn allowed_times(
    earliest: UnixtimeMs,
    latest: UnixtimeMs,
    start_on_day: DurationMs,
    end_on_day: DurationMs,
    timezone: Tz,
) -> Vec<Interval> {
    if earliest >= latest || start_on_day > end_on_day {
        return Vec::new();
    }

    let first_day = earliest.div_euclid(DAY) * DAY;
    let last_day = latest.div_euclid(DAY) * DAY + DAY;

    let mut windows = Vec::new();
    let mut day = first_day;
    while day < last_day {
        let offset = utc_offset_at(day + 12 * HOUR, timezone);
        windows.push(Interval::new(
            day + start_on_day - offset,
            day + end_on_day - offset,
        ));
        day += DAY;
    }
    windows
}

/// Local time minus UTC at the given instant, in milliseconds.
fn utc_offset_at(instant: UnixtimeMs, timezone: Tz) -> DurationMs {
    match DateTime::from_timestamp_millis(instant) {
        Some(utc) => {
            let seconds = timezone
                .offset_from_utc_datetime(&utc.naive_utc())
                .fix()
                .local_minus_utc();
            DurationMs::from(seconds) * 1000
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn utc_ms(y: i32, m: u32, d: u32, h: u32) -> UnixtimeMs {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
            .expect("valid date")
    }

    #[test]
    fn test_empty_when_span_is_empty() {
        let t = utc_ms(2024, 6, 1, 0);
        assert!(allowed_times(t, t, 6 * HOUR, 21 * HOUR, chrono_tz::Europe::Berlin).is_empty());
        assert!(allowed_times(t + 1, t, 6 * HOUR, 21 * HOUR, chrono_tz::Europe::Berlin).is_empty());
    }

    #[test]
    fn test_three_days_without_dst() {
        let earliest = utc_ms(2024, 6, 10, 8);
        let latest = utc_ms(2024, 6, 12, 18);
        let windows = allowed_times(earliest, latest, 6 * HOUR, 21 * HOUR, chrono_tz::Europe::Berlin);

        assert_eq!(windows.len(), 3);
        for window in &windows {
            assert_eq!(window.duration_ms(), 15 * HOUR);
        }
        for pair in windows.windows(2) {
            assert_eq!(pair[1].start() - pair[0].start(), DAY);
            assert!(!pair[0].overlaps(&pair[1]));
        }
        // CEST is UTC+2, so 06:00 local is 04:00 UTC
        assert_eq!(windows[0].start(), utc_ms(2024, 6, 10, 4));
        assert_eq!(windows[2].end(), utc_ms(2024, 6, 12, 19));
    }

    #[test]
    fn test_utc_timezone_has_no_shift() {
        let windows = allowed_times(
            utc_ms(2024, 1, 1, 0),
            utc_ms(2024, 1, 1, 1),
            6 * HOUR,
            21 * HOUR,
            chrono_tz::UTC,
        );
        assert_eq!(windows, vec![Interval::new(utc_ms(2024, 1, 1, 6), utc_ms(2024, 1, 1, 21))]);
    }

    #[test]
    fn test_dst_start_moves_window_by_offset_change() {
        // Europe/Berlin switches from UTC+1 to UTC+2 on 2024-03-31 at 01:00 UTC
        let earliest = utc_ms(2024, 3, 30, 10);
        let latest = utc_ms(2024, 4, 1, 10);
        let windows = allowed_times(earliest, latest, 6 * HOUR, 21 * HOUR, chrono_tz::Europe::Berlin);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start(), utc_ms(2024, 3, 30, 5));
        assert_eq!(windows[1].start(), utc_ms(2024, 3, 31, 4));
        assert_eq!(windows[2].start(), utc_ms(2024, 4, 1, 4));
        // each window keeps its nominal length; the transition shows up in the
        // 23h distance between consecutive starts
        assert!(windows.iter().all(|w| w.duration_ms() == 15 * HOUR));
        assert_eq!(windows[1].start() - windows[0].start(), DAY - HOUR);
    }

    #[test]
    fn test_dst_end_gives_25h_distance() {
        // back to UTC+1 on 2024-10-27
        let windows = allowed_times(
            utc_ms(2024, 10, 26, 12),
            utc_ms(2024, 10, 27, 12),
            6 * HOUR,
            21 * HOUR,
            chrono_tz::Europe::Berlin,
        );
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start() - windows[0].start(), DAY + HOUR);
    }

    #[test]
    fn test_windows_cover_requested_days() {
        let earliest = utc_ms(2024, 6, 10, 23);
        let latest = utc_ms(2024, 6, 11, 0) + 1;
        let windows = allowed_times(earliest, latest, 0, 24 * HOUR, chrono_tz::UTC);
        assert_eq!(windows.first().map(Interval::start), Some(utc_ms(2024, 6, 10, 0)));
        assert!(windows.last().map(Interval::end).unwrap_or_default() >= latest);
    }
}
