//! Trigger rules and popup templates.
//!
//! A rule maps one event type to one built-in template, plus rate limits.
//! Conditions are a small closed set; there is no expression language.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::events::{Event, EventPayload};

/// Extra requirement on the triggering event. All conditions of a rule
/// must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    HasContact,
    HasReminder,
    MinStreakDays { days: u32 },
}

impl RuleCondition {
    pub fn holds(&self, event: &Event) -> bool {
        match self {
            RuleCondition::HasContact => event.contact_id.is_some(),
            RuleCondition::HasReminder => event.reminder_id.is_some(),
            RuleCondition::MinStreakDays { days } => matches!(
                event.payload,
                EventPayload::StreakAchieved { streak_days } if streak_days >= *days
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    /// Rule key. Built-in rules use `default:<event_type>`.
    pub id: String,
    pub user_id: String,
    pub trigger_event_type: String,
    pub template_key: String,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    pub priority: u8,
    pub cooldown_seconds: i64,
    /// 0 means unlimited.
    pub max_per_day: u32,
    /// `None` uses the configured default TTL.
    pub ttl_seconds: Option<i64>,
    pub enabled: bool,
    /// `None` for built-in rules.
    pub created_at: Option<DateTime<Utc>>,
}

const DEFAULT_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_MAX_PER_DAY: u32 = 20;

/// Built-in event type → (template, priority).
const DEFAULT_MAPPING: &[(&str, &str, u8)] = &[
    ("reminder_completed", "success", 5),
    ("streak_achieved", "streak", 7),
    ("inactivity_detected", "inactivity", 4),
    ("follow_up_required", "action_required", 8),
    ("reminder_overdue", "overdue", 6),
];

impl TriggerRule {
    pub fn new(
        user_id: impl Into<String>,
        trigger_event_type: impl Into<String>,
        template_key: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            trigger_event_type: trigger_event_type.into(),
            template_key: template_key.into(),
            conditions: Vec::new(),
            priority: super::clamp_priority(priority as i64),
            cooldown_seconds: 0,
            max_per_day: 0,
            ttl_seconds: None,
            enabled: true,
            created_at: Some(Utc::now()),
        }
    }

    /// The built-in rule for `event_type`, if there is one.
    pub fn builtin(user_id: &str, event_type: &str) -> Option<Self> {
        DEFAULT_MAPPING
            .iter()
            .find(|(kind, _, _)| *kind == event_type)
            .map(|(kind, template, priority)| Self {
                id: format!("default:{kind}"),
                user_id: user_id.to_string(),
                trigger_event_type: kind.to_string(),
                template_key: template.to_string(),
                conditions: Vec::new(),
                priority: *priority,
                cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
                max_per_day: DEFAULT_MAX_PER_DAY,
                ttl_seconds: None,
                enabled: true,
                created_at: None,
            })
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.enabled
            && self.trigger_event_type == event.event_type()
            && self.conditions.iter().all(|c| c.holds(event))
    }

    /// Reject rules that reference unknown event types or templates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !crate::events::EVENT_TYPES.contains(&self.trigger_event_type.as_str()) {
            return Err(ValidationError::UnknownVariant {
                kind: "event type",
                value: self.trigger_event_type.clone(),
            });
        }
        if PopupTemplate::find(&self.template_key).is_none() {
            return Err(ValidationError::UnknownVariant {
                kind: "popup template",
                value: self.template_key.clone(),
            });
        }
        if self.cooldown_seconds < 0 || self.ttl_seconds.is_some_and(|t| t <= 0) {
            return Err(ValidationError::InvalidValue {
                field: "trigger rule".into(),
                message: "cooldown must be >= 0 and ttl > 0".into(),
            });
        }
        Ok(())
    }
}

/// Built-in popup copy. `{name}` placeholders are filled from the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupTemplate {
    pub key: &'static str,
    pub template_type: &'static str,
    pub title: &'static str,
    pub message: &'static str,
}

pub const TEMPLATES: &[PopupTemplate] = &[
    PopupTemplate {
        key: "success",
        template_type: "success",
        title: "Nice work",
        message: "Reminder done. Keep the momentum going.",
    },
    PopupTemplate {
        key: "streak",
        template_type: "streak",
        title: "{streak_days}-day streak",
        message: "You've followed up {streak_days} days in a row.",
    },
    PopupTemplate {
        key: "inactivity",
        template_type: "inactivity",
        title: "Welcome back",
        message: "It's been {days_inactive} days. One small follow-up gets things moving.",
    },
    PopupTemplate {
        key: "action_required",
        template_type: "action_required",
        title: "Follow up with {contact_name}",
        message: "{contact_name} is waiting to hear from you.",
    },
    PopupTemplate {
        key: "overdue",
        template_type: "overdue",
        title: "Overdue reminder",
        message: "A reminder scheduled for {scheduled_time} is still open.",
    },
];

/// Rendered popup copy and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPopup {
    pub template_type: String,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
}

impl PopupTemplate {
    pub fn find(key: &str) -> Option<&'static PopupTemplate> {
        TEMPLATES.iter().find(|t| t.key == key)
    }

    pub fn render(&self, event: &Event) -> RenderedPopup {
        let mut vars: Vec<(&str, String)> = Vec::new();
        match &event.payload {
            EventPayload::StreakAchieved { streak_days } => {
                vars.push(("streak_days", streak_days.to_string()));
            }
            EventPayload::InactivityDetected { days_inactive } => {
                vars.push(("days_inactive", days_inactive.to_string()));
            }
            EventPayload::FollowUpRequired { contact_name, .. } => {
                vars.push((
                    "contact_name",
                    contact_name.clone().unwrap_or_else(|| "your contact".into()),
                ));
            }
            EventPayload::ReminderOverdue { scheduled_time, .. } => {
                vars.push(("scheduled_time", scheduled_time.format("%Y-%m-%d %H:%M UTC").to_string()));
            }
            _ => {}
        }
        let fill = |text: &str| {
            vars.iter().fold(text.to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        };

        let mut payload = serde_json::json!({ "event_type": event.event_type() });
        if let Some(contact) = &event.contact_id {
            payload["contact_id"] = contact.clone().into();
            payload["action_url"] = format!("/contacts/{contact}").into();
        } else if let Some(reminder) = &event.reminder_id {
            payload["action_url"] = format!("/reminders/{reminder}").into();
        }
        if let Some(reminder) = &event.reminder_id {
            payload["reminder_id"] = reminder.clone().into();
        }

        RenderedPopup {
            template_type: self.template_type.to_string(),
            title: fill(self.title),
            message: fill(self.message),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSource;

    fn event(payload: EventPayload) -> Event {
        Event::new("u1", payload, EventSource::User, Utc::now())
    }

    #[test]
    fn builtin_mapping() {
        let rule = TriggerRule::builtin("u1", "follow_up_required").unwrap();
        assert_eq!(rule.template_key, "action_required");
        assert_eq!(rule.priority, 8);
        assert_eq!(rule.id, "default:follow_up_required");
        assert!(TriggerRule::builtin("u1", "popup_shown").is_none());
        for (_, template, _) in DEFAULT_MAPPING {
            assert!(PopupTemplate::find(template).is_some());
        }
    }

    #[test]
    fn conditions_must_all_hold() {
        let mut rule = TriggerRule::new("u1", "streak_achieved", "streak", 7);
        rule.conditions = vec![RuleCondition::MinStreakDays { days: 7 }];
        assert!(!rule.matches(&event(EventPayload::StreakAchieved { streak_days: 3 })));
        assert!(rule.matches(&event(EventPayload::StreakAchieved { streak_days: 14 })));

        rule.conditions.push(RuleCondition::HasContact);
        assert!(!rule.matches(&event(EventPayload::StreakAchieved { streak_days: 14 })));
    }

    #[test]
    fn render_fills_placeholders_and_url() {
        let e = event(EventPayload::FollowUpRequired {
            contact_id: "c9".into(),
            contact_name: Some("Priya".into()),
            reminder_id: None,
        });
        let rendered = PopupTemplate::find("action_required").unwrap().render(&e);
        assert_eq!(rendered.title, "Follow up with Priya");
        assert_eq!(rendered.payload["action_url"], "/contacts/c9");
        assert_eq!(rendered.payload["event_type"], "follow_up_required");
    }

    #[test]
    fn validate_rejects_unknown_template() {
        let rule = TriggerRule::new("u1", "reminder_completed", "confetti", 5);
        assert!(rule.validate().is_err());
        let rule = TriggerRule::new("u1", "not_an_event", "success", 5);
        assert!(rule.validate().is_err());
        assert!(TriggerRule::new("u1", "reminder_completed", "success", 5).validate().is_ok());
    }
}
