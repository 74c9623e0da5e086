//! Conflict detection and bundling.
//!
//! Reminders of one user whose scheduled times fall within
//! `bundle_window_minutes` of each other are merged into a single
//! delivery unit. Grouping never depends on the presentation format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, ValidationError};
use crate::events::{Event, EventPayload, EventSource};
use crate::reminder::Reminder;
use crate::storage::{Database, PreferenceStore};

/// Presentation style of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleFormat {
    /// One line per reminder, with contact names.
    #[default]
    List,
    /// Count split into follow-ups and other reminders.
    Summary,
    /// Count only.
    Combined,
}

impl BundleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            BundleFormat::List => "list",
            BundleFormat::Summary => "summary",
            BundleFormat::Combined => "combined",
        }
    }

    pub fn render(self, reminders: &[Reminder]) -> BundleMessage {
        let n = reminders.len();
        let title = format!("{n} reminders");
        let body = match self {
            BundleFormat::List => reminders
                .iter()
                .map(|r| format!("• {}", r.display_line()))
                .collect::<Vec<_>>()
                .join("\n"),
            BundleFormat::Summary => {
                let follow_ups = reminders.iter().filter(|r| r.is_follow_up()).count();
                format!("{n} reminders: {follow_ups} follow-ups, {} other", n - follow_ups)
            }
            BundleFormat::Combined => format!("You have {n} reminders"),
        };
        BundleMessage { title, body }
    }
}

impl fmt::Display for BundleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "list" => Ok(BundleFormat::List),
            "summary" => Ok(BundleFormat::Summary),
            "combined" => Ok(BundleFormat::Combined),
            other => Err(ValidationError::UnknownVariant {
                kind: "bundle format",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMessage {
    pub title: String,
    pub body: String,
}

/// A set of colliding reminders delivered together. Immutable once delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderBundle {
    pub id: String,
    pub user_id: String,
    pub bundle_time: DateTime<Utc>,
    /// Unique, in insertion order.
    pub reminder_ids: Vec<String>,
    pub delivery_format: BundleFormat,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReminderBundle {
    pub fn new(
        user_id: impl Into<String>,
        bundle_time: DateTime<Utc>,
        mut reminder_ids: Vec<String>,
        delivery_format: BundleFormat,
        now: DateTime<Utc>,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        reminder_ids.retain(|id| seen.insert(id.clone()));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            bundle_time,
            reminder_ids,
            delivery_format,
            delivered: false,
            delivered_at: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictOutcome {
    pub should_bundle: bool,
    pub bundle_id: Option<String>,
}

impl ConflictOutcome {
    fn independent() -> Self {
        Self {
            should_bundle: false,
            bundle_id: None,
        }
    }

    fn bundled(bundle_id: String) -> Self {
        Self {
            should_bundle: true,
            bundle_id: Some(bundle_id),
        }
    }
}

/// Result of a successful bundle delivery claim.
#[derive(Debug, Clone)]
pub struct DeliveredBundle {
    pub bundle: ReminderBundle,
    /// Members as they were before delivery, in bundle order.
    pub reminders: Vec<Reminder>,
    pub message: BundleMessage,
}

pub struct Bundler<'a> {
    db: &'a Database,
    prefs: PreferenceStore<'a>,
}

impl<'a> Bundler<'a> {
    pub fn new(db: &'a Database, default_timezone: &str) -> Self {
        Self {
            db,
            prefs: PreferenceStore::new(db, default_timezone),
        }
    }

    /// Decide whether `reminder_id` joins (or starts) a bundle.
    ///
    /// Re-running for a reminder that is already in an open bundle returns
    /// that bundle unchanged.
    pub fn check_and_handle_conflicts(
        &self,
        user_id: &str,
        reminder_id: &str,
        scheduled_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ConflictOutcome> {
        let prefs = self.prefs.load(user_id)?;
        if !prefs.schedule.bundle_enabled {
            return Ok(ConflictOutcome::independent());
        }

        if let Some(existing) = self.db.open_bundle_for_reminder(reminder_id)? {
            return Ok(ConflictOutcome::bundled(existing.id));
        }

        let window = Duration::minutes(prefs.schedule.bundle_window_minutes.max(0));
        let from = scheduled_time - window;
        let to = scheduled_time + window;

        let conflicts: Vec<Reminder> = self
            .db
            .active_reminders_between(user_id, from, to)?
            .into_iter()
            .filter(|r| r.id != reminder_id)
            .collect();
        if conflicts.is_empty() {
            return Ok(ConflictOutcome::independent());
        }

        if let Some(open) = self.db.open_bundle_between(user_id, from, to)? {
            if self.db.append_to_bundle(&open.id, reminder_id)? {
                tracing::debug!(bundle_id = %open.id, reminder_id, "appended to open bundle");
                return Ok(ConflictOutcome::bundled(open.id));
            }
            // Delivered between the lookup and the append; start a new one.
            tracing::debug!(bundle_id = %open.id, "open bundle closed before append");
        }

        // Members already held by another open bundle stay where they are.
        let mut members: Vec<(DateTime<Utc>, String)> = vec![(scheduled_time, reminder_id.to_string())];
        for r in conflicts {
            if self.db.open_bundle_for_reminder(&r.id)?.is_none() {
                members.push((r.scheduled_time, r.id));
            }
        }
        if members.len() < 2 {
            return Ok(ConflictOutcome::independent());
        }
        members.sort();

        let bundle = ReminderBundle::new(
            user_id,
            members[0].0,
            members.into_iter().map(|(_, id)| id).collect(),
            prefs.schedule.bundle_format,
            now,
        );
        let tx = self.db.conn().unchecked_transaction()?;
        self.db.insert_bundle(&bundle)?;
        tx.commit()?;
        tracing::info!(
            bundle_id = %bundle.id,
            user_id,
            size = bundle.reminder_ids.len(),
            "bundle created"
        );
        Ok(ConflictOutcome::bundled(bundle.id))
    }

    /// Deliver a bundle: flip it to delivered, mark every member sent and
    /// record the events, all in one transaction.
    ///
    /// Returns `None` when another caller already delivered it.
    pub fn deliver(&self, bundle_id: &str, now: DateTime<Utc>) -> Result<Option<DeliveredBundle>> {
        let bundle = self
            .db
            .get_bundle(bundle_id)?
            .ok_or_else(|| CoreError::not_found("bundle", bundle_id))?;
        if bundle.delivered {
            return Ok(None);
        }
        let reminders = self.db.get_reminders(&bundle.reminder_ids)?;

        let tx = self.db.conn().unchecked_transaction()?;
        if !self.db.mark_bundle_delivered(bundle_id, now)? {
            return Ok(None);
        }
        let sent = self.db.mark_bundle_members_sent(bundle_id, now)?;
        for reminder_id in &sent {
            let contact = reminders
                .iter()
                .find(|r| &r.id == reminder_id)
                .and_then(|r| r.contact_id.clone());
            self.db.append_event(
                &Event::new(
                    &bundle.user_id,
                    EventPayload::ReminderSent {
                        reminder_id: reminder_id.clone(),
                        bundle_id: Some(bundle.id.clone()),
                    },
                    EventSource::Scheduler,
                    now,
                )
                .with_contact(contact),
            )?;
        }
        self.db.append_event(&Event::new(
            &bundle.user_id,
            EventPayload::BundleDelivered {
                bundle_id: bundle.id.clone(),
                reminder_ids: bundle.reminder_ids.clone(),
            },
            EventSource::Scheduler,
            now,
        ))?;
        tx.commit()?;

        tracing::info!(bundle_id, sent = sent.len(), "bundle delivered");
        let message = bundle.delivery_format.render(&reminders);
        Ok(Some(DeliveredBundle {
            bundle,
            reminders,
            message,
        }))
    }

    /// Render a bundle in its stored format without delivering it.
    pub fn preview(&self, bundle_id: &str) -> Result<BundleMessage> {
        let bundle = self
            .db
            .get_bundle(bundle_id)?
            .ok_or_else(|| CoreError::not_found("bundle", bundle_id))?;
        let reminders = self.db.get_reminders(&bundle.reminder_ids)?;
        Ok(bundle.delivery_format.render(&reminders))
    }
}
