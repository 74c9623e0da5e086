//! Popup action resolution.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Popup, PopupStatus, TriggerEngine};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::{Event, EventPayload, EventSource};
use crate::reminder::{Reminder, ReminderStatus};
use crate::snooze::{SnoozeReason, SnoozeRecommender};
use crate::storage::{Config, Database};
use crate::streak::StreakTracker;

pub const DEFAULT_SNOOZE_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    FollowUpNow,
    MarkDone,
    Snooze,
    Dismiss,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::FollowUpNow => "FOLLOW_UP_NOW",
            ActionKind::MarkDone => "MARK_DONE",
            ActionKind::Snooze => "SNOOZE",
            ActionKind::Dismiss => "DISMISS",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts any case and `-`, `_` or space as separators.
impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "FOLLOW_UP_NOW" | "FOLLOWUP_NOW" | "FOLLOW_UP" => Ok(ActionKind::FollowUpNow),
            "MARK_DONE" | "COMPLETE" | "COMPLETED" | "DONE" => Ok(ActionKind::MarkDone),
            "SNOOZE" => Ok(ActionKind::Snooze),
            "DISMISS" => Ok(ActionKind::Dismiss),
            _ => Err(ValidationError::UnknownVariant {
                kind: "popup action",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub popup_id: String,
    pub action: ActionKind,
    pub status: PopupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snooze_until: Option<DateTime<Utc>>,
    /// The action was recorded but its downstream effects were not applied,
    /// either because the linked reminder is gone or the popup was already
    /// closed.
    pub side_effects_skipped: bool,
    /// Popups queued as a consequence (completion, streak milestones).
    pub follow_on_popups: Vec<Popup>,
}

/// Side-effect results folded into the outcome.
#[derive(Default)]
struct Effects {
    skipped: bool,
    popups: Vec<Popup>,
}

pub struct ActionResolver<'a> {
    db: &'a Database,
    trigger: TriggerEngine<'a>,
    streaks: StreakTracker<'a>,
    snoozes: SnoozeRecommender<'a>,
}

impl<'a> ActionResolver<'a> {
    pub fn new(db: &'a Database, config: &Config) -> Self {
        Self {
            db,
            trigger: TriggerEngine::new(db, config),
            streaks: StreakTracker::new(db, config),
            snoozes: SnoozeRecommender::new(db, &config.engine.default_timezone),
        }
    }

    /// Apply a user action to a popup.
    ///
    /// The `popup_action` event is recorded once the input is valid.
    /// Unknown action names, malformed snooze data and unknown popups are
    /// errors; a missing reminder only skips the side effects.
    pub fn apply(
        &self,
        popup_id: &str,
        action_type: &str,
        data: &Value,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome> {
        let action: ActionKind = action_type.parse()?;
        let popup = self
            .db
            .get_popup(popup_id)?
            .ok_or_else(|| CoreError::not_found("popup", popup_id))?;
        let snooze_until = match action {
            ActionKind::Snooze => Some(snooze_target(data, now)?),
            _ => None,
        };

        let mut recorded = Event::new(
            &popup.user_id,
            EventPayload::PopupAction {
                popup_id: popup.id.clone(),
                action,
            },
            EventSource::User,
            now,
        );
        recorded.reminder_id = popup.reminder_id.clone();
        self.db.append_event(&recorded)?;

        let mut outcome = ActionOutcome {
            popup_id: popup.id.clone(),
            action,
            status: popup.status,
            action_url: None,
            snooze_until: None,
            side_effects_skipped: false,
            follow_on_popups: Vec::new(),
        };

        if popup.status.is_closed() {
            tracing::debug!(popup_id, %action, status = %popup.status, "action on closed popup");
            outcome.side_effects_skipped = true;
            return Ok(outcome);
        }

        let effects = match snooze_until {
            Some(until) => {
                if !self.db.snooze_popup(&popup.id, until, Some(action))? {
                    return self.lost_race(outcome);
                }
                outcome.snooze_until = Some(until);
                self.snooze_reminder(&popup, until, now)?
            }
            None => {
                if !self.db.close_popup(&popup.id, action, now)? {
                    return self.lost_race(outcome);
                }
                outcome.status = PopupStatus::Acted;
                match action {
                    ActionKind::MarkDone => self.complete_reminder(&popup, now)?,
                    ActionKind::Dismiss => self.dismiss_reminder(&popup, now)?,
                    _ => {
                        outcome.action_url = action_url(&popup);
                        if popup.reminder_id.is_some() && self.linked_reminder(&popup)?.is_none() {
                            Self::missing_reminder(&popup)
                        } else {
                            Effects::default()
                        }
                    }
                }
            }
        };

        outcome.side_effects_skipped = effects.skipped;
        outcome.follow_on_popups = effects.popups;
        tracing::info!(
            popup_id,
            user_id = %popup.user_id,
            %action,
            skipped = outcome.side_effects_skipped,
            "popup action applied"
        );
        Ok(outcome)
    }

    fn lost_race(&self, mut outcome: ActionOutcome) -> Result<ActionOutcome> {
        if let Some(current) = self.db.get_popup(&outcome.popup_id)? {
            outcome.status = current.status;
        }
        outcome.side_effects_skipped = true;
        Ok(outcome)
    }

    fn linked_reminder(&self, popup: &Popup) -> Result<Option<Reminder>> {
        match &popup.reminder_id {
            Some(id) => self.db.get_reminder(id),
            None => Ok(None),
        }
    }

    fn missing_reminder(popup: &Popup) -> Effects {
        tracing::warn!(
            popup_id = %popup.id,
            reminder_id = ?popup.reminder_id,
            "linked reminder missing, skipping side effects"
        );
        Effects {
            skipped: true,
            popups: Vec::new(),
        }
    }

    fn snooze_reminder(&self, popup: &Popup, until: DateTime<Utc>, now: DateTime<Utc>) -> Result<Effects> {
        if popup.reminder_id.is_none() {
            return Ok(Effects::default());
        }
        let Some(reminder) = self.linked_reminder(popup)? else {
            return Ok(Self::missing_reminder(popup));
        };
        Ok(match self.snooze(&reminder, until, SnoozeReason::UserAction, now)? {
            Some(popups) => Effects { skipped: false, popups },
            None => Effects { skipped: true, popups: Vec::new() },
        })
    }

    fn complete_reminder(&self, popup: &Popup, now: DateTime<Utc>) -> Result<Effects> {
        if popup.reminder_id.is_none() {
            return Ok(Effects::default());
        }
        let Some(reminder) = self.linked_reminder(popup)? else {
            return Ok(Self::missing_reminder(popup));
        };
        let popups = self.complete(&reminder, now)?;
        Ok(Effects { skipped: false, popups })
    }

    fn dismiss_reminder(&self, popup: &Popup, now: DateTime<Utc>) -> Result<Effects> {
        if popup.reminder_id.is_none() {
            return Ok(Effects::default());
        }
        let Some(reminder) = self.linked_reminder(popup)? else {
            return Ok(Self::missing_reminder(popup));
        };
        let popups = self.dismiss(&reminder, now)?;
        Ok(Effects { skipped: false, popups })
    }

    /// Push a reminder to `until`, record the snooze and log it.
    /// Returns the popups the `reminder_snoozed` event produced, or `None`
    /// when the reminder was already dismissed.
    pub fn snooze(
        &self,
        reminder: &Reminder,
        until: DateTime<Utc>,
        reason: SnoozeReason,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Popup>>> {
        let minutes = (until - now).num_minutes().max(0);
        if !self.db.reschedule_reminder(&reminder.id, until, now)? {
            tracing::debug!(reminder_id = %reminder.id, "reminder not reschedulable");
            return Ok(None);
        }
        self.snoozes
            .record(&reminder.user_id, Some(&reminder.id), minutes, reason, now)?;

        let event = Event::new(
            &reminder.user_id,
            EventPayload::ReminderSnoozed {
                reminder_id: reminder.id.clone(),
                minutes,
                snooze_until: until,
                reason,
            },
            EventSource::User,
            now,
        )
        .with_contact(reminder.contact_id.clone());
        Ok(Some(self.trigger.ingest(&event)?.popups))
    }

    /// Mark a reminder done and update the user's streak. A dismissed
    /// reminder stays dismissed and produces nothing.
    pub fn complete(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<Vec<Popup>> {
        let current = self
            .db
            .get_reminder(&reminder.id)?
            .map_or(reminder.status, |r| r.status);
        if current == ReminderStatus::Dismissed {
            tracing::debug!(reminder_id = %reminder.id, "completion of dismissed reminder ignored");
            return Ok(Vec::new());
        }

        // Already-sent reminders stay sent; completion is still recorded.
        self.db.transition_reminder(
            &reminder.id,
            &[
                ReminderStatus::Pending,
                ReminderStatus::Snoozed,
                ReminderStatus::Suppressed,
                ReminderStatus::Failed,
            ],
            ReminderStatus::Sent,
            now,
        )?;

        let event = Event::new(
            &reminder.user_id,
            EventPayload::ReminderCompleted {
                reminder_id: reminder.id.clone(),
            },
            EventSource::User,
            now,
        )
        .with_contact(reminder.contact_id.clone());
        let mut popups = self.trigger.ingest(&event)?.popups;
        if let Some(streak) = self.streaks.on_completion(&reminder.user_id, now)? {
            popups.extend(streak.popups);
        }
        Ok(popups)
    }

    pub fn dismiss(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<Vec<Popup>> {
        let moved = self.db.transition_reminder(
            &reminder.id,
            &[
                ReminderStatus::Pending,
                ReminderStatus::Snoozed,
                ReminderStatus::Suppressed,
            ],
            ReminderStatus::Dismissed,
            now,
        )?;
        if !moved {
            return Ok(Vec::new());
        }
        let event = Event::new(
            &reminder.user_id,
            EventPayload::ReminderDismissed {
                reminder_id: reminder.id.clone(),
            },
            EventSource::User,
            now,
        )
        .with_contact(reminder.contact_id.clone());
        Ok(self.trigger.ingest(&event)?.popups)
    }
}

/// Explicit `snooze_until` wins over `minutes`. Either must land at
/// least a minute after `now`.
fn snooze_target(data: &Value, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Some(raw) = data.get("snooze_until").filter(|v| !v.is_null()) {
        let until: DateTime<Utc> =
            serde_json::from_value(raw.clone()).map_err(|e| ValidationError::InvalidValue {
                field: "snooze_until".into(),
                message: e.to_string(),
            })?;
        if until < now + Duration::minutes(1) {
            return Err(ValidationError::InvalidValue {
                field: "snooze_until".into(),
                message: format!("{until} is not in the future"),
            }
            .into());
        }
        return Ok(until);
    }
    let minutes = match data.get("minutes") {
        None | Some(Value::Null) => DEFAULT_SNOOZE_MINUTES,
        Some(v) => v.as_i64().ok_or_else(|| ValidationError::InvalidValue {
            field: "minutes".into(),
            message: format!("expected an integer, got {v}"),
        })?,
    };
    Ok(now + Duration::minutes(minutes.max(1)))
}

fn action_url(popup: &Popup) -> Option<String> {
    popup
        .payload_str("action_url")
        .map(str::to_string)
        .or_else(|| popup.payload_str("contact_id").map(|c| format!("/contacts/{c}")))
}
