//! Reminder records as seen by the engine.
//!
//! Reminder CRUD belongs to the surrounding product; the engine only needs
//! to read reminders and move them between statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ValidationError;

/// Lifecycle status of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    /// Deferred by the user; fires again at its new `scheduled_time`.
    Snoozed,
    Suppressed,
    Dismissed,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Snoozed => "snoozed",
            ReminderStatus::Suppressed => "suppressed",
            ReminderStatus::Dismissed => "dismissed",
            ReminderStatus::Failed => "failed",
        }
    }

    /// Whether the scheduler may still fire a reminder in this status.
    pub fn is_active(self) -> bool {
        matches!(self, ReminderStatus::Pending | ReminderStatus::Snoozed)
    }
}

impl FromStr for ReminderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "sent" => Ok(ReminderStatus::Sent),
            "snoozed" => Ok(ReminderStatus::Snoozed),
            "suppressed" => Ok(ReminderStatus::Suppressed),
            "dismissed" => Ok(ReminderStatus::Dismissed),
            "failed" => Ok(ReminderStatus::Failed),
            other => Err(ValidationError::UnknownVariant {
                kind: "reminder status",
                value: other.to_string(),
            }),
        }
    }
}

/// Channel a reminder is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMethod {
    Email,
    Push,
    InApp,
}

impl NotificationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationMethod::Email => "email",
            NotificationMethod::Push => "push",
            NotificationMethod::InApp => "in_app",
        }
    }
}

impl FromStr for NotificationMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(NotificationMethod::Email),
            "push" => Ok(NotificationMethod::Push),
            "in_app" | "in-app" | "inapp" => Ok(NotificationMethod::InApp),
            other => Err(ValidationError::UnknownVariant {
                kind: "notification method",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub notification_method: NotificationMethod,
    pub status: ReminderStatus,
    pub contact_id: Option<String>,
    /// Display name of the contact, denormalized for message formatting.
    pub contact_name: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn new(
        user_id: impl Into<String>,
        message: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        notification_method: NotificationMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            message: message.into(),
            scheduled_time,
            notification_method,
            status: ReminderStatus::Pending,
            contact_id: None,
            contact_name: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_contact(mut self, contact_id: impl Into<String>, name: Option<String>) -> Self {
        self.contact_id = Some(contact_id.into());
        self.contact_name = name;
        self
    }

    /// Reminders tied to a contact count as follow-ups.
    pub fn is_follow_up(&self) -> bool {
        self.contact_id.is_some()
    }

    /// Line used when the reminder is itemized inside a bundle.
    pub fn display_line(&self) -> String {
        match &self.contact_name {
            Some(name) => format!("{name}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            ReminderStatus::Pending,
            ReminderStatus::Sent,
            ReminderStatus::Snoozed,
            ReminderStatus::Suppressed,
            ReminderStatus::Dismissed,
            ReminderStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ReminderStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ReminderStatus>().is_err());
    }

    #[test]
    fn only_pending_and_snoozed_are_active() {
        assert!(ReminderStatus::Pending.is_active());
        assert!(ReminderStatus::Snoozed.is_active());
        assert!(!ReminderStatus::Sent.is_active());
        assert!(!ReminderStatus::Suppressed.is_active());
    }

    #[test]
    fn display_line_prefers_contact_name() {
        let r = Reminder::new("u1", "Call back", Utc::now(), NotificationMethod::Push)
            .with_contact("c1", Some("Dana".into()));
        assert_eq!(r.display_line(), "Dana: Call back");
        assert!(r.is_follow_up());
    }
}
