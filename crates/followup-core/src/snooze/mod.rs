//! Smart snooze recommender.
//!
//! Suggests a snooze duration from the user's own history. Tiers are tried
//! from most to least specific; the first one with enough data wins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::storage::{Database, PreferenceStore};
use crate::tz::resolve_timezone;

const LOOKBACK_DAYS: i64 = 30;
const TIME_OF_DAY_RADIUS_MINUTES: u32 = 120;
const MINUTES_PER_DAY: u32 = 24 * 60;
const DEFAULT_MINUTES: i64 = 10;
const DEFAULT_CONFIDENCE: f64 = 0.3;
const MIN_MINUTES: i64 = 5;
const MAX_MINUTES: i64 = 120;
/// Width of a pattern bucket in hours.
const BUCKET_HOURS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnoozeReason {
    UserAction,
    SmartSuggestion,
    Auto,
}

impl SnoozeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SnoozeReason::UserAction => "user_action",
            SnoozeReason::SmartSuggestion => "smart_suggestion",
            SnoozeReason::Auto => "auto",
        }
    }
}

impl fmt::Display for SnoozeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnoozeReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user_action" => Ok(SnoozeReason::UserAction),
            "smart_suggestion" => Ok(SnoozeReason::SmartSuggestion),
            "auto" => Ok(SnoozeReason::Auto),
            other => Err(ValidationError::UnknownVariant {
                kind: "snooze reason",
                value: other.to_string(),
            }),
        }
    }
}

/// One recorded snooze. `time_of_day` is minutes since local midnight and
/// `day_of_week` counts from Monday = 0, both in the user's timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeHistoryEntry {
    pub id: String,
    pub user_id: String,
    pub reminder_id: Option<String>,
    pub duration_minutes: i64,
    pub reason: SnoozeReason,
    pub time_of_day: u32,
    pub day_of_week: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionBasis {
    SameWeekday,
    TimeOfDay,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeSuggestion {
    pub duration_minutes: i64,
    pub confidence: f64,
    pub basis: SuggestionBasis,
    pub snooze_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct SnoozeContext<'a> {
    pub now: DateTime<Utc>,
    /// Overrides the user's stored timezone.
    pub timezone: Option<&'a str>,
}

/// Local position of "now" that the tiers compare history against.
#[derive(Debug, Clone, Copy)]
struct Moment {
    time_of_day: u32,
    day_of_week: u8,
}

/// A fallback tier: yields `(average, confidence)` when it has enough data.
#[derive(Debug, Clone, Copy)]
enum SnoozeTier {
    SameWeekday,
    TimeOfDay,
}

/// Most specific first.
const TIERS: &[SnoozeTier] = &[SnoozeTier::SameWeekday, SnoozeTier::TimeOfDay];

impl SnoozeTier {
    fn basis(self) -> SuggestionBasis {
        match self {
            SnoozeTier::SameWeekday => SuggestionBasis::SameWeekday,
            SnoozeTier::TimeOfDay => SuggestionBasis::TimeOfDay,
        }
    }

    fn evaluate(self, history: &[SnoozeHistoryEntry], at: Moment) -> Option<(f64, f64)> {
        let (matching, min_len, confidence): (Vec<i64>, usize, f64) = match self {
            SnoozeTier::SameWeekday => (
                history
                    .iter()
                    .filter(|e| e.day_of_week == at.day_of_week)
                    .map(|e| e.duration_minutes)
                    .collect(),
                3,
                0.8,
            ),
            SnoozeTier::TimeOfDay => (
                history
                    .iter()
                    .filter(|e| {
                        circular_distance(e.time_of_day, at.time_of_day) <= TIME_OF_DAY_RADIUS_MINUTES
                    })
                    .map(|e| e.duration_minutes)
                    .collect(),
                1,
                0.7,
            ),
        };
        if matching.len() < min_len {
            return None;
        }
        let avg = matching.iter().sum::<i64>() as f64 / matching.len() as f64;
        Some((avg, confidence))
    }
}

fn circular_distance(a: u32, b: u32) -> u32 {
    let d = a.abs_diff(b) % MINUTES_PER_DAY;
    d.min(MINUTES_PER_DAY - d)
}

/// Round to the nearest 5 minutes, then clamp to [5, 120].
pub fn normalize_minutes(avg: f64) -> i64 {
    let rounded = ((avg / 5.0).round() as i64) * 5;
    rounded.clamp(MIN_MINUTES, MAX_MINUTES)
}

fn moment(tz: Tz, instant: DateTime<Utc>) -> Moment {
    let local = instant.with_timezone(&tz);
    Moment {
        time_of_day: local.hour() * 60 + local.minute(),
        day_of_week: local.weekday().num_days_from_monday() as u8,
    }
}

/// Pattern bucket (0..6) for a local time of day in minutes.
pub fn bucket_of(time_of_day: u32) -> u8 {
    (time_of_day / 60 / BUCKET_HOURS) as u8
}

pub struct SnoozeRecommender<'a> {
    db: &'a Database,
    prefs: PreferenceStore<'a>,
    default_timezone: String,
}

impl<'a> SnoozeRecommender<'a> {
    pub fn new(db: &'a Database, default_timezone: &str) -> Self {
        Self {
            db,
            prefs: PreferenceStore::new(db, default_timezone),
            default_timezone: default_timezone.to_string(),
        }
    }

    /// Suggest a snooze duration, or `None` when smart suggestions are off.
    ///
    /// `reminder_id` is accepted for symmetry with `record`; suggestions are
    /// per user, not per reminder.
    pub fn suggest(
        &self,
        user_id: &str,
        _reminder_id: Option<&str>,
        ctx: SnoozeContext<'_>,
    ) -> Result<Option<SnoozeSuggestion>> {
        let prefs = self.prefs.load(user_id)?;
        if !prefs.schedule.smart_suggestions_enabled {
            return Ok(None);
        }
        let tz = resolve_timezone(
            ctx.timezone.or(prefs.timezone.as_deref()),
            &self.default_timezone,
        );

        let recent = self
            .db
            .snoozes_since(user_id, ctx.now - Duration::days(LOOKBACK_DAYS))?;
        let at = moment(tz, ctx.now);

        let (minutes, confidence, basis) = TIERS
            .iter()
            .find_map(|tier| {
                tier.evaluate(&recent, at)
                    .map(|(avg, conf)| (normalize_minutes(avg), conf, tier.basis()))
            })
            .unwrap_or((DEFAULT_MINUTES, DEFAULT_CONFIDENCE, SuggestionBasis::Default));

        tracing::debug!(user_id, minutes, confidence, ?basis, "snooze suggestion");
        Ok(Some(SnoozeSuggestion {
            duration_minutes: minutes,
            confidence,
            basis,
            snooze_until: ctx.now + Duration::minutes(minutes),
        }))
    }

    /// Append a snooze to history and fold it into the rolling pattern.
    pub fn record(
        &self,
        user_id: &str,
        reminder_id: Option<&str>,
        duration_minutes: i64,
        reason: SnoozeReason,
        now: DateTime<Utc>,
    ) -> Result<SnoozeHistoryEntry> {
        let prefs = self.prefs.load(user_id)?;
        let tz = self.prefs.timezone(&prefs);
        let at = moment(tz, now);
        let entry = SnoozeHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            reminder_id: reminder_id.map(str::to_string),
            duration_minutes,
            reason,
            time_of_day: at.time_of_day,
            day_of_week: at.day_of_week,
            created_at: now,
        };

        let tx = self.db.conn().unchecked_transaction()?;
        self.db.insert_snooze(&entry)?;
        self.db.fold_snooze_pattern(
            user_id,
            entry.day_of_week,
            bucket_of(entry.time_of_day),
            duration_minutes,
            now,
        )?;
        tx.commit()?;
        Ok(entry)
    }

    /// Rolling average for a (weekday, 4-hour bucket), if any samples exist.
    pub fn pattern_average(&self, user_id: &str, day_of_week: u8, bucket: u8) -> Result<Option<f64>> {
        let samples = self.db.snooze_pattern(user_id, day_of_week, bucket)?;
        if samples.is_empty() {
            return Ok(None);
        }
        Ok(Some(samples.iter().sum::<i64>() as f64 / samples.len() as f64))
    }
}
