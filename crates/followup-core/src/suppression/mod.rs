//! Suppression policy: decides whether a reminder may fire at its scheduled
//! time and, if not, when it should be tried again.
//!
//! The decision itself is pure (see [`rules`]); this module gathers the
//! inputs from storage, projects the instant into the user's timezone and
//! records the outcome in the event log.

pub mod rules;
mod window;

pub use window::TimeWindow;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::events::{Event, EventPayload, EventSource};
use crate::reminder::ReminderStatus;
use crate::storage::{Database, EngineConfig, PreferenceStore};
use crate::tz::{local_day_bounds, resolve_timezone};
use rules::{PolicyContext, SlotSearch};

/// Why a reminder was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    QuietHours,
    WorkingHours,
    Weekend,
    DailyCap,
    CooldownActive,
    CategoryDisabled,
    DndActive,
    Other,
}

impl SuppressionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SuppressionReason::QuietHours => "quiet_hours",
            SuppressionReason::WorkingHours => "working_hours",
            SuppressionReason::Weekend => "weekend",
            SuppressionReason::DailyCap => "daily_cap",
            SuppressionReason::CooldownActive => "cooldown_active",
            SuppressionReason::CategoryDisabled => "category_disabled",
            SuppressionReason::DndActive => "dnd_active",
            SuppressionReason::Other => "other",
        }
    }

    /// Whether waiting can clear this reason. A muted method never clears
    /// by itself.
    pub fn is_time_based(self) -> bool {
        !matches!(
            self,
            SuppressionReason::CategoryDisabled | SuppressionReason::Other
        )
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuppressionReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "quiet_hours" => Ok(SuppressionReason::QuietHours),
            "working_hours" => Ok(SuppressionReason::WorkingHours),
            "weekend" => Ok(SuppressionReason::Weekend),
            "daily_cap" => Ok(SuppressionReason::DailyCap),
            "cooldown_active" => Ok(SuppressionReason::CooldownActive),
            "category_disabled" => Ok(SuppressionReason::CategoryDisabled),
            "dnd_active" => Ok(SuppressionReason::DndActive),
            "other" => Ok(SuppressionReason::Other),
            other => Err(ValidationError::UnknownVariant {
                kind: "suppression reason",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of a policy evaluation. Not persisted as an entity; a suppressed
/// decision is recorded as a `reminder_suppressed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionDecision {
    pub suppressed: bool,
    pub reason: Option<SuppressionReason>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

impl SuppressionDecision {
    pub fn cleared() -> Self {
        Self {
            suppressed: false,
            reason: None,
            next_attempt_time: None,
        }
    }

    pub fn suppressed(reason: SuppressionReason, next_attempt_time: Option<DateTime<Utc>>) -> Self {
        Self {
            suppressed: true,
            reason: Some(reason),
            next_attempt_time,
        }
    }
}

/// Evaluates reminders against a user's schedule preferences.
pub struct SuppressionEngine<'a> {
    db: &'a Database,
    prefs: PreferenceStore<'a>,
    default_timezone: String,
    horizon: Duration,
}

impl<'a> SuppressionEngine<'a> {
    pub fn new(db: &'a Database, config: &EngineConfig) -> Self {
        Self {
            db,
            prefs: PreferenceStore::new(db, config.default_timezone.clone()),
            default_timezone: config.default_timezone.clone(),
            horizon: Duration::days(config.search_horizon_days.max(1)),
        }
    }

    /// Decide whether `reminder_id` may fire at `scheduled_time`.
    ///
    /// `timezone` overrides the user's stored timezone when given. The
    /// retry search starts at the later of `scheduled_time` and `now`. A
    /// suppressed decision is logged once per (reminder, retry time); the
    /// reminder row itself is left untouched.
    pub fn evaluate(
        &self,
        user_id: &str,
        reminder_id: &str,
        scheduled_time: DateTime<Utc>,
        timezone: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SuppressionDecision> {
        let prefs = self.prefs.load(user_id)?;
        let schedule = &prefs.schedule;
        let tz = resolve_timezone(
            timezone.or(prefs.timezone.as_deref()),
            &self.default_timezone,
        );
        let reminder = self.db.get_reminder(reminder_id)?;

        let search_from = scheduled_time.max(now);
        let (window_start, _) = local_day_bounds(tz, scheduled_time.min(search_from));
        let window_end = search_from + self.horizon + Duration::days(1);
        let fired_per_day = self.fired_per_day(user_id, tz, window_start, window_end)?;
        let last_delivery = self.db.last_delivery_at(user_id)?;

        let local = scheduled_time.with_timezone(&tz).naive_local();
        let ctx = PolicyContext {
            prefs: schedule,
            instant: scheduled_time,
            local,
            fired_today: fired_per_day.get(&local.date()).copied().unwrap_or(0),
            last_delivery,
            method: reminder.as_ref().map(|r| r.notification_method),
        };

        let Some(reason) = rules::first_match(&ctx) else {
            tracing::debug!(user_id, reminder_id, "reminder cleared to fire");
            return Ok(SuppressionDecision::cleared());
        };

        let next_attempt_time = if reason.is_time_based() {
            let search = SlotSearch {
                tz,
                prefs: schedule,
                fired_per_day: &fired_per_day,
                last_delivery,
                horizon: self.horizon,
            };
            rules::next_attempt(&search, search_from)
        } else {
            None
        };

        let decision = SuppressionDecision::suppressed(reason, next_attempt_time);
        tracing::debug!(
            user_id,
            reminder_id,
            reason = %reason,
            next_attempt = ?next_attempt_time,
            "reminder suppressed"
        );
        self.log_once(user_id, reminder_id, &decision, reminder.and_then(|r| r.contact_id), now)?;
        Ok(decision)
    }

    /// Caller-side choice to park the reminder in `suppressed`.
    pub fn mark_suppressed(&self, reminder_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.db.transition_reminder(
            reminder_id,
            &[ReminderStatus::Pending, ReminderStatus::Snoozed],
            ReminderStatus::Suppressed,
            now,
        )
    }

    fn fired_per_day(
        &self,
        user_id: &str,
        tz: chrono_tz::Tz,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<NaiveDate, u32>> {
        let mut per_day = HashMap::new();
        for sent in self.db.delivery_times_between(user_id, from, to)? {
            *per_day
                .entry(sent.with_timezone(&tz).date_naive())
                .or_insert(0) += 1;
        }
        Ok(per_day)
    }

    fn log_once(
        &self,
        user_id: &str,
        reminder_id: &str,
        decision: &SuppressionDecision,
        contact_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(reason) = decision.reason else {
            return Ok(());
        };
        if self
            .db
            .suppression_logged(reminder_id, decision.next_attempt_time)?
        {
            tracing::debug!(reminder_id, "suppression already logged for this window");
            return Ok(());
        }
        let event = Event::new(
            user_id,
            EventPayload::ReminderSuppressed {
                reminder_id: reminder_id.to_string(),
                reason,
                next_attempt_time: decision.next_attempt_time,
            },
            EventSource::Scheduler,
            now,
        )
        .with_contact(contact_id);
        self.db.append_event(&event)?;
        Ok(())
    }
}
