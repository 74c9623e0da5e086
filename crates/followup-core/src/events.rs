use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::affirmation::AffirmationCategory;
use crate::error::ValidationError;
use crate::popup::ActionKind;
use crate::snooze::SnoozeReason;
use crate::suppression::SuppressionReason;

/// Every behavioral fact the engine records is an Event.
///
/// Events are append-only: they form the audit trail and are the only
/// input to the popup trigger pipeline. The payload is a closed set keyed
/// by `event_type`; each variant carries its own required fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event_data", rename_all = "snake_case")]
pub enum EventPayload {
    ReminderSent {
        reminder_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bundle_id: Option<String>,
    },
    ReminderFailed {
        reminder_id: String,
        error: String,
    },
    ReminderSuppressed {
        reminder_id: String,
        reason: SuppressionReason,
        next_attempt_time: Option<DateTime<Utc>>,
    },
    ReminderSnoozed {
        reminder_id: String,
        minutes: i64,
        snooze_until: DateTime<Utc>,
        reason: SnoozeReason,
    },
    ReminderCompleted {
        reminder_id: String,
    },
    ReminderDismissed {
        reminder_id: String,
    },
    ReminderOverdue {
        reminder_id: String,
        scheduled_time: DateTime<Utc>,
    },
    BundleDelivered {
        bundle_id: String,
        reminder_ids: Vec<String>,
    },
    FollowUpRequired {
        contact_id: String,
        #[serde(default)]
        contact_name: Option<String>,
        #[serde(default)]
        reminder_id: Option<String>,
    },
    StreakAchieved {
        streak_days: u32,
    },
    InactivityDetected {
        days_inactive: u32,
    },
    PopupShown {
        popup_id: String,
    },
    PopupAction {
        popup_id: String,
        action: ActionKind,
    },
    AffirmationShown {
        affirmation_id: String,
        category: AffirmationCategory,
        #[serde(default)]
        popup_id: Option<String>,
    },
}

/// All event type names, in declaration order.
pub const EVENT_TYPES: &[&str] = &[
    "reminder_sent",
    "reminder_failed",
    "reminder_suppressed",
    "reminder_snoozed",
    "reminder_completed",
    "reminder_dismissed",
    "reminder_overdue",
    "bundle_delivered",
    "follow_up_required",
    "streak_achieved",
    "inactivity_detected",
    "popup_shown",
    "popup_action",
    "affirmation_shown",
];

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::ReminderSent { .. } => "reminder_sent",
            EventPayload::ReminderFailed { .. } => "reminder_failed",
            EventPayload::ReminderSuppressed { .. } => "reminder_suppressed",
            EventPayload::ReminderSnoozed { .. } => "reminder_snoozed",
            EventPayload::ReminderCompleted { .. } => "reminder_completed",
            EventPayload::ReminderDismissed { .. } => "reminder_dismissed",
            EventPayload::ReminderOverdue { .. } => "reminder_overdue",
            EventPayload::BundleDelivered { .. } => "bundle_delivered",
            EventPayload::FollowUpRequired { .. } => "follow_up_required",
            EventPayload::StreakAchieved { .. } => "streak_achieved",
            EventPayload::InactivityDetected { .. } => "inactivity_detected",
            EventPayload::PopupShown { .. } => "popup_shown",
            EventPayload::PopupAction { .. } => "popup_action",
            EventPayload::AffirmationShown { .. } => "affirmation_shown",
        }
    }

    /// Validate an externally supplied `(event_type, event_data)` pair.
    pub fn parse(event_type: &str, event_data: serde_json::Value) -> Result<Self, ValidationError> {
        if !EVENT_TYPES.contains(&event_type) {
            return Err(ValidationError::UnknownVariant {
                kind: "event type",
                value: event_type.to_string(),
            });
        }
        let tagged = serde_json::json!({
            "event_type": event_type,
            "event_data": event_data,
        });
        serde_json::from_value(tagged).map_err(|e| ValidationError::InvalidEvent {
            event_type: event_type.to_string(),
            message: e.to_string(),
        })
    }

    /// The `event_data` object alone, as stored.
    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("event_data").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn reminder_id(&self) -> Option<&str> {
        match self {
            EventPayload::ReminderSent { reminder_id, .. }
            | EventPayload::ReminderFailed { reminder_id, .. }
            | EventPayload::ReminderSuppressed { reminder_id, .. }
            | EventPayload::ReminderSnoozed { reminder_id, .. }
            | EventPayload::ReminderCompleted { reminder_id }
            | EventPayload::ReminderDismissed { reminder_id }
            | EventPayload::ReminderOverdue { reminder_id, .. } => Some(reminder_id),
            EventPayload::FollowUpRequired { reminder_id, .. } => reminder_id.as_deref(),
            _ => None,
        }
    }

    pub fn contact_id(&self) -> Option<&str> {
        match self {
            EventPayload::FollowUpRequired { contact_id, .. } => Some(contact_id),
            _ => None,
        }
    }
}

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Scheduler,
    User,
    System,
    Sweep,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::Scheduler => "scheduler",
            EventSource::User => "user",
            EventSource::System => "system",
            EventSource::Sweep => "sweep",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduler" => EventSource::Scheduler,
            "user" => EventSource::User,
            "sweep" => EventSource::Sweep,
            _ => EventSource::System,
        }
    }
}

/// A recorded event. `id` is assigned by storage (0 until appended).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub user_id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub contact_id: Option<String>,
    pub reminder_id: Option<String>,
    pub source: EventSource,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        user_id: impl Into<String>,
        payload: EventPayload,
        source: EventSource,
        created_at: DateTime<Utc>,
    ) -> Self {
        let reminder_id = payload.reminder_id().map(str::to_string);
        let contact_id = payload.contact_id().map(str::to_string);
        Self {
            id: 0,
            user_id: user_id.into(),
            payload,
            contact_id,
            reminder_id,
            source,
            created_at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Attach a contact to an event whose payload does not carry one.
    pub fn with_contact(mut self, contact_id: Option<String>) -> Self {
        if self.contact_id.is_none() {
            self.contact_id = contact_id;
        }
        self
    }
}
