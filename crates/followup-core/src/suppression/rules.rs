//! The suppression policy as data.
//!
//! `RULES` is evaluated first-match-wins against a [`PolicyContext`]; the
//! slot search in [`next_attempt`] advances a candidate instant through the
//! same constraints in a fixed order until none of them moves it.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use super::SuppressionReason;
use crate::preferences::SnoozePreferences;
use crate::reminder::NotificationMethod;
use crate::tz::local_to_utc;

/// Everything a rule may look at. Built once per evaluation.
#[derive(Debug, Clone)]
pub struct PolicyContext<'a> {
    pub prefs: &'a SnoozePreferences,
    /// The evaluated instant.
    pub instant: DateTime<Utc>,
    /// The evaluated instant in the user's timezone.
    pub local: NaiveDateTime,
    /// Deliveries already made on the local day of `instant`.
    pub fired_today: u32,
    pub last_delivery: Option<DateTime<Utc>>,
    pub method: Option<NotificationMethod>,
}

pub struct SuppressionRule {
    pub reason: SuppressionReason,
    pub applies: fn(&PolicyContext<'_>) -> bool,
}

/// Ordered policy table. Quiet hours come first and therefore win over
/// working hours when both apply.
pub const RULES: &[SuppressionRule] = &[
    SuppressionRule {
        reason: SuppressionReason::QuietHours,
        applies: in_quiet_hours,
    },
    SuppressionRule {
        reason: SuppressionReason::WorkingHours,
        applies: outside_working_hours,
    },
    SuppressionRule {
        reason: SuppressionReason::Weekend,
        applies: disallowed_weekend,
    },
    SuppressionRule {
        reason: SuppressionReason::DailyCap,
        applies: over_daily_cap,
    },
    SuppressionRule {
        reason: SuppressionReason::CooldownActive,
        applies: cooling_down,
    },
    SuppressionRule {
        reason: SuppressionReason::DndActive,
        applies: dnd_active,
    },
    SuppressionRule {
        reason: SuppressionReason::CategoryDisabled,
        applies: method_muted,
    },
];

/// First matching rule, or `None` when the reminder may fire.
pub fn first_match(ctx: &PolicyContext<'_>) -> Option<SuppressionReason> {
    RULES.iter().find(|rule| (rule.applies)(ctx)).map(|rule| rule.reason)
}

fn in_quiet_hours(ctx: &PolicyContext<'_>) -> bool {
    ctx.prefs
        .quiet_window()
        .is_some_and(|w| w.contains(ctx.local.time()))
}

fn within_working_time(prefs: &SnoozePreferences, t: NaiveTime) -> bool {
    let window = prefs.working_window();
    window.is_empty() || window.contains(t)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn outside_working_hours(ctx: &PolicyContext<'_>) -> bool {
    let date = ctx.local.date();
    let off_day = !is_weekend(date) && !ctx.prefs.working_days.contains(&date.weekday());
    off_day || !within_working_time(ctx.prefs, ctx.local.time())
}

fn disallowed_weekend(ctx: &PolicyContext<'_>) -> bool {
    !ctx.prefs.allow_weekends && is_weekend(ctx.local.date())
}

fn over_daily_cap(ctx: &PolicyContext<'_>) -> bool {
    ctx.fired_today >= ctx.prefs.max_reminders_per_day
}

fn cooling_down(ctx: &PolicyContext<'_>) -> bool {
    cooldown_until(ctx.prefs, ctx.last_delivery).is_some_and(|until| ctx.instant < until)
}

fn dnd_active(ctx: &PolicyContext<'_>) -> bool {
    ctx.prefs.dnd_until.is_some_and(|until| ctx.instant < until)
}

fn method_muted(ctx: &PolicyContext<'_>) -> bool {
    ctx.method
        .is_some_and(|m| ctx.prefs.muted_methods.contains(&m))
}

fn cooldown_until(
    prefs: &SnoozePreferences,
    last_delivery: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if prefs.cooldown_minutes <= 0 {
        return None;
    }
    last_delivery.map(|last| last + Duration::minutes(prefs.cooldown_minutes))
}

/// Inputs for the slot search that do not change while searching.
pub struct SlotSearch<'a> {
    pub tz: Tz,
    pub prefs: &'a SnoozePreferences,
    /// Deliveries already made per local date.
    pub fired_per_day: &'a HashMap<NaiveDate, u32>,
    pub last_delivery: Option<DateTime<Utc>>,
    pub horizon: Duration,
}

const MAX_STEPS: usize = 256;

enum Step {
    Move(DateTime<Utc>),
    Settled,
    /// No future instant can satisfy the constraints.
    Impossible,
}

/// Earliest instant at or after `from` that no time-based rule suppresses.
///
/// Returns `None` if no such instant exists within the search horizon
/// (for instance when quiet hours swallow the entire working window).
pub fn next_attempt(search: &SlotSearch<'_>, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let limit = from + search.horizon;
    let mut candidate = from;

    for _ in 0..MAX_STEPS {
        if candidate > limit {
            return None;
        }
        match advance_once(search, candidate) {
            Step::Settled => return Some(candidate),
            Step::Impossible => return None,
            Step::Move(next) if next > candidate => candidate = next,
            // DST ambiguity can map a local boundary behind the candidate.
            Step::Move(_) => candidate += Duration::minutes(1),
        }
    }

    tracing::warn!(from = %from, "slot search did not converge");
    None
}

/// Apply the constraints in fixed order and return the first move.
fn advance_once(search: &SlotSearch<'_>, candidate: DateTime<Utc>) -> Step {
    let prefs = search.prefs;
    let tz = search.tz;
    let local = candidate.with_timezone(&tz).naive_local();

    if let Some(quiet) = prefs.quiet_window() {
        if quiet.contains(local.time()) {
            return Step::Move(local_to_utc(tz, quiet.end_after(local)));
        }
    }

    let working = prefs.working_window();
    if !working.is_empty() && !working.contains(local.time()) {
        return Step::Move(local_to_utc(tz, working.next_start(local)));
    }

    // Working days and weekends.
    if !prefs.day_allowed(local.date().weekday()) {
        return match next_allowed_day(prefs, local.date()) {
            Some(day) => Step::Move(local_to_utc(tz, day.and_time(day_start(prefs)))),
            None => Step::Impossible,
        };
    }

    if prefs.max_reminders_per_day == 0 {
        return Step::Impossible;
    }
    let fired = search
        .fired_per_day
        .get(&local.date())
        .copied()
        .unwrap_or(0);
    if fired >= prefs.max_reminders_per_day {
        return match local.date().succ_opt() {
            Some(next_day) => Step::Move(local_to_utc(tz, next_day.and_time(day_start(prefs)))),
            None => Step::Impossible,
        };
    }

    if let Some(until) = cooldown_until(prefs, search.last_delivery) {
        if candidate < until {
            return Step::Move(until);
        }
    }

    if let Some(until) = prefs.dnd_until {
        if candidate < until {
            return Step::Move(until);
        }
    }

    Step::Settled
}

fn day_start(prefs: &SnoozePreferences) -> NaiveTime {
    let working = prefs.working_window();
    if working.is_empty() {
        NaiveTime::MIN
    } else {
        working.start
    }
}

fn next_allowed_day(prefs: &SnoozePreferences, from: NaiveDate) -> Option<NaiveDate> {
    let mut day = from;
    for _ in 0..7 {
        day = day.succ_opt()?;
        if prefs.day_allowed(day.weekday()) {
            return Some(day);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Weekday};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn quiet_prefs() -> SnoozePreferences {
        SnoozePreferences {
            quiet_hours_start: Some(t(22, 0)),
            quiet_hours_end: Some(t(7, 0)),
            working_hours_start: t(8, 0),
            working_hours_end: t(20, 0),
            ..SnoozePreferences::default()
        }
    }

    fn ctx<'a>(prefs: &'a SnoozePreferences, instant: DateTime<Utc>) -> PolicyContext<'a> {
        PolicyContext {
            prefs,
            instant,
            local: instant.naive_utc(),
            fired_today: 0,
            last_delivery: None,
            method: None,
        }
    }

    // 2026-06-10 is a Wednesday.
    fn wed(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn quiet_hours_take_precedence_over_working_hours() {
        let prefs = quiet_prefs();
        // 23:00 is both quiet and outside working hours.
        assert_eq!(first_match(&ctx(&prefs, wed(23, 0))), Some(SuppressionReason::QuietHours));
        assert_eq!(first_match(&ctx(&prefs, wed(21, 0))), Some(SuppressionReason::WorkingHours));
        assert_eq!(first_match(&ctx(&prefs, wed(12, 0))), None);
    }

    #[test]
    fn weekend_rule_fires_when_not_allowed() {
        let prefs = SnoozePreferences::default();
        let saturday = Utc.with_ymd_and_hms(2026, 6, 13, 10, 0, 0).unwrap();
        assert_eq!(first_match(&ctx(&prefs, saturday)), Some(SuppressionReason::Weekend));
    }

    #[test]
    fn non_working_weekday_counts_as_working_hours() {
        let mut prefs = SnoozePreferences::default();
        prefs.working_days.retain(|d| *d != Weekday::Wed);
        assert_eq!(first_match(&ctx(&prefs, wed(10, 0))), Some(SuppressionReason::WorkingHours));
    }

    #[test]
    fn cap_cooldown_dnd_and_mute() {
        let mut prefs = SnoozePreferences::default();
        let mut c = ctx(&prefs, wed(10, 0));
        c.fired_today = 10;
        assert_eq!(first_match(&c), Some(SuppressionReason::DailyCap));

        prefs.cooldown_minutes = 30;
        let mut c = ctx(&prefs, wed(10, 0));
        c.last_delivery = Some(wed(9, 45));
        assert_eq!(first_match(&c), Some(SuppressionReason::CooldownActive));

        prefs.cooldown_minutes = 0;
        prefs.dnd_until = Some(wed(11, 0));
        assert_eq!(first_match(&ctx(&prefs, wed(10, 0))), Some(SuppressionReason::DndActive));

        prefs.dnd_until = None;
        prefs.muted_methods = vec![NotificationMethod::Email];
        let mut c = ctx(&prefs, wed(10, 0));
        c.method = Some(NotificationMethod::Email);
        assert_eq!(first_match(&c), Some(SuppressionReason::CategoryDisabled));
    }

    fn search<'a>(prefs: &'a SnoozePreferences, fired: &'a HashMap<NaiveDate, u32>) -> SlotSearch<'a> {
        SlotSearch {
            tz: Tz::UTC,
            prefs,
            fired_per_day: fired,
            last_delivery: None,
            horizon: Duration::days(14),
        }
    }

    #[test]
    fn next_attempt_leaves_quiet_hours_then_enters_working_hours() {
        let prefs = quiet_prefs();
        let fired = HashMap::new();
        let next = next_attempt(&search(&prefs, &fired), wed(23, 0)).unwrap();
        // Quiet ends 07:00 Thursday, working starts 08:00.
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 11, 8, 0, 0).unwrap());
    }

    #[test]
    fn next_attempt_skips_disallowed_weekend() {
        let prefs = quiet_prefs();
        let fired = HashMap::new();
        // Friday 23:00 -> quiet ends Saturday 07:00 -> weekend -> Monday 08:00.
        let friday = Utc.with_ymd_and_hms(2026, 6, 12, 23, 0, 0).unwrap();
        let next = next_attempt(&search(&prefs, &fired), friday).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn next_attempt_skips_capped_day() {
        let prefs = quiet_prefs();
        let mut fired = HashMap::new();
        fired.insert(NaiveDate::from_ymd_opt(2026, 6, 10).unwrap(), 10);
        let next = next_attempt(&search(&prefs, &fired), wed(12, 0)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 11, 8, 0, 0).unwrap());
    }

    #[test]
    fn next_attempt_is_none_when_quiet_covers_working_hours() {
        let prefs = SnoozePreferences {
            quiet_hours_start: Some(t(8, 0)),
            quiet_hours_end: Some(t(18, 0)),
            ..SnoozePreferences::default()
        };
        let fired = HashMap::new();
        assert!(next_attempt(&search(&prefs, &fired), wed(10, 0)).is_none());
    }

    #[test]
    fn next_attempt_respects_local_timezone() {
        let prefs = quiet_prefs();
        let fired = HashMap::new();
        let mut s = search(&prefs, &fired);
        s.tz = chrono_tz::Asia::Tokyo;
        // 14:00 UTC = 23:00 Tokyo, in quiet hours.
        let next = next_attempt(&s, wed(14, 0)).unwrap();
        let local = next.with_timezone(&chrono_tz::Asia::Tokyo);
        assert_eq!((local.hour(), local.minute()), (8, 0));
    }
}
