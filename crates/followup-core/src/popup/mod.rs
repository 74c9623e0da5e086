//! Popup trigger and queue engine.
//!
//! Events become popups through trigger rules ([`TriggerEngine`]); clients
//! pull one popup at a time from the [`PopupQueue`] and answer it through
//! the [`ActionResolver`].
//!
//! State machine: `queued → displayed → {acted | expired}`. A displayed
//! popup with a past `snooze_until` is eligible for dequeue again.

mod action;
mod queue;
mod rule;
mod trigger;

pub use action::{ActionKind, ActionOutcome, ActionResolver, DEFAULT_SNOOZE_MINUTES};
pub use queue::{Dequeued, PopupQueue};
pub use rule::{PopupTemplate, RuleCondition, TriggerRule, TEMPLATES};
pub use trigger::{Ingested, TriggerEngine};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

pub fn clamp_priority(priority: i64) -> u8 {
    priority.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupStatus {
    Queued,
    Displayed,
    Acted,
    Expired,
}

impl PopupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PopupStatus::Queued => "queued",
            PopupStatus::Displayed => "displayed",
            PopupStatus::Acted => "acted",
            PopupStatus::Expired => "expired",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, PopupStatus::Acted | PopupStatus::Expired)
    }
}

impl fmt::Display for PopupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PopupStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(PopupStatus::Queued),
            "displayed" => Ok(PopupStatus::Displayed),
            "acted" => Ok(PopupStatus::Acted),
            "expired" => Ok(PopupStatus::Expired),
            other => Err(ValidationError::UnknownVariant {
                kind: "popup status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Popup {
    pub id: String,
    pub user_id: String,
    pub reminder_id: Option<String>,
    /// Rule that produced this popup.
    pub rule_key: String,
    pub template_type: String,
    pub title: String,
    pub message: String,
    pub affirmation: Option<String>,
    /// Template-specific data: triggering event type, contact, action URL.
    pub payload: serde_json::Value,
    pub priority: u8,
    pub status: PopupStatus,
    pub queued_at: DateTime<Utc>,
    pub displayed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub snooze_until: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub action_taken: Option<ActionKind>,
}

impl Popup {
    /// Whether the queue may hand this popup out at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        let status_ok = match self.status {
            PopupStatus::Queued => self.snooze_until.map_or(true, |t| t <= now),
            PopupStatus::Displayed => self.snooze_until.is_some_and(|t| t <= now),
            PopupStatus::Acted | PopupStatus::Expired => false,
        };
        status_ok && self.expires_at.map_or(true, |t| t > now)
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }

    /// Event type that triggered this popup.
    pub fn trigger_event_type(&self) -> Option<&str> {
        self.payload_str("event_type")
    }
}
