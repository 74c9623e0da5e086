//! Timezone projection helpers.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve a user's timezone name, falling back to `default` and finally UTC.
pub fn resolve_timezone(preferred: Option<&str>, default: &str) -> Tz {
    if let Some(name) = preferred {
        match name.parse::<Tz>() {
            Ok(tz) => return tz,
            Err(_) => tracing::warn!(timezone = name, "unknown timezone, using default"),
        }
    }
    default.parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!(timezone = default, "unknown default timezone, using UTC");
        Tz::UTC
    })
}

/// Convert a local wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times that do
/// not exist (DST spring-forward gap) roll forward to the first valid one.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    let mut probe = local;
    // Gaps are at most a couple of hours; step by 15 minutes until valid.
    for _ in 0..16 {
        match tz.from_local_datetime(&probe) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(early, _) => return early.with_timezone(&Utc),
            LocalResult::None => probe += Duration::minutes(15),
        }
    }
    Utc.from_utc_datetime(&local)
}

/// UTC instant of `time` on local `date`.
pub fn at_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    local_to_utc(tz, date.and_time(time))
}

/// UTC bounds `[start, end)` of the local calendar day containing `instant`.
pub fn local_day_bounds(tz: Tz, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = instant.with_timezone(&tz).date_naive();
    let next = date.succ_opt().unwrap_or(date);
    (
        at_local(tz, date, NaiveTime::MIN),
        at_local(tz, next, NaiveTime::MIN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn resolves_known_and_falls_back() {
        assert_eq!(resolve_timezone(Some("Asia/Tokyo"), "UTC"), chrono_tz::Asia::Tokyo);
        assert_eq!(resolve_timezone(Some("nope"), "Europe/Paris"), chrono_tz::Europe::Paris);
        assert_eq!(resolve_timezone(None, "also-nope"), Tz::UTC);
    }

    #[test]
    fn spring_forward_gap_rolls_forward() {
        // 2026-03-08 02:30 does not exist in New York.
        let local = NaiveDate::from_ymd_opt(2026, 3, 8)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let utc = local_to_utc(chrono_tz::America::New_York, local);
        let back = utc.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(back.hour(), 3);
    }

    #[test]
    fn day_bounds_follow_local_midnight() {
        let tz = chrono_tz::Asia::Tokyo;
        let instant = Utc.with_ymd_and_hms(2026, 5, 1, 20, 0, 0).unwrap(); // 05:00 May 2 in Tokyo
        let (start, end) = local_day_bounds(tz, instant);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 5, 1, 15, 0, 0).unwrap());
        assert_eq!(end - start, Duration::hours(24));
    }
}
