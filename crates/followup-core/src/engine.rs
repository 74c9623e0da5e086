//! Reminder firing.
//!
//! [`NotificationEngine::fire`] is the callback an external scheduler
//! invokes at a reminder's due time. Each call is independent: it reads the
//! shared store, decides, writes back and returns. Redelivered callbacks are
//! harmless because only active reminders fire and the sent transition is a
//! compare-and-set.

use std::error::Error;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::affirmation::{AffirmationContext, AffirmationEngine};
use crate::bundle::{Bundler, DeliveredBundle};
use crate::error::Result;
use crate::events::{Event, EventPayload, EventSource};
use crate::reminder::{NotificationMethod, Reminder, ReminderStatus};
use crate::storage::{Config, Database};
use crate::suppression::{SuppressionEngine, SuppressionReason};

pub type TransportError = Box<dyn Error + Send + Sync>;

/// A message ready for a delivery channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub user_id: String,
    pub method: NotificationMethod,
    pub title: String,
    pub body: String,
    pub affirmation: Option<String>,
    pub reminder_ids: Vec<String>,
    pub bundle_id: Option<String>,
}

/// Raw delivery (email, push, in-app). Implementations do not retry.
pub trait DeliveryTransport {
    fn name(&self) -> &str;

    fn send(&self, message: &OutgoingMessage) -> std::result::Result<(), TransportError>;
}

/// "Fire me at time T" service that re-invokes [`NotificationEngine::fire`].
pub trait Scheduler {
    fn schedule(&self, reminder_id: &str, at: DateTime<Utc>) -> std::result::Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FireOutcome {
    /// Nothing to do: the reminder is gone, inactive, or already claimed.
    Skipped { reason: String },
    Suppressed {
        reason: SuppressionReason,
        next_attempt_time: Option<DateTime<Utc>>,
    },
    Delivered { reminder_id: String },
    BundleDelivered {
        bundle_id: String,
        reminder_ids: Vec<String>,
    },
    Failed { reminder_ids: Vec<String>, error: String },
}

impl FireOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        FireOutcome::Skipped {
            reason: reason.into(),
        }
    }
}

pub struct NotificationEngine<'a> {
    db: &'a Database,
    suppression: SuppressionEngine<'a>,
    bundler: Bundler<'a>,
    affirmations: AffirmationEngine<'a>,
    transport: &'a dyn DeliveryTransport,
    scheduler: &'a dyn Scheduler,
}

impl<'a> NotificationEngine<'a> {
    pub fn new(
        db: &'a Database,
        config: &Config,
        transport: &'a dyn DeliveryTransport,
        scheduler: &'a dyn Scheduler,
    ) -> Self {
        let tz = config.engine.default_timezone.as_str();
        Self {
            db,
            suppression: SuppressionEngine::new(db, &config.engine),
            bundler: Bundler::new(db, tz),
            affirmations: AffirmationEngine::new(db, tz),
            transport,
            scheduler,
        }
    }

    pub fn fire(
        &self,
        reminder_id: &str,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<FireOutcome> {
        let Some(reminder) = self.db.get_reminder(reminder_id)? else {
            tracing::debug!(reminder_id, "fire for unknown reminder");
            return Ok(FireOutcome::skipped("missing"));
        };
        if !reminder.status.is_active() {
            tracing::debug!(reminder_id, status = reminder.status.as_str(), "reminder not active");
            return Ok(FireOutcome::skipped(reminder.status.as_str()));
        }

        // A late callback is judged at the time it actually runs.
        let fire_at = reminder.scheduled_time.max(now);
        let decision =
            self.suppression
                .evaluate(&reminder.user_id, &reminder.id, fire_at, None, now)?;
        if let Some(reason) = decision.reason {
            match decision.next_attempt_time {
                Some(at) => {
                    if let Err(e) = self.scheduler.schedule(&reminder.id, at) {
                        tracing::warn!(reminder_id, error = %e, "could not hand retry to scheduler");
                    }
                }
                None => {
                    self.suppression.mark_suppressed(&reminder.id, now)?;
                }
            }
            return Ok(FireOutcome::Suppressed {
                reason,
                next_attempt_time: decision.next_attempt_time,
            });
        }

        let conflict = self.bundler.check_and_handle_conflicts(
            &reminder.user_id,
            &reminder.id,
            reminder.scheduled_time,
            now,
        )?;
        if let Some(bundle_id) = conflict.bundle_id.filter(|_| conflict.should_bundle) {
            return match self.bundler.deliver(&bundle_id, now)? {
                Some(delivered) => self.send_bundle(delivered, now, rng),
                None => Ok(FireOutcome::skipped("bundle already delivered")),
            };
        }

        self.send_single(&reminder, now, rng)
    }

    fn send_single(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<FireOutcome> {
        let tx = self.db.conn().unchecked_transaction()?;
        if !self.db.mark_reminder_sent(&reminder.id, now)? {
            return Ok(FireOutcome::skipped("already claimed"));
        }
        self.db.append_event(
            &Event::new(
                &reminder.user_id,
                EventPayload::ReminderSent {
                    reminder_id: reminder.id.clone(),
                    bundle_id: None,
                },
                EventSource::Scheduler,
                now,
            )
            .with_contact(reminder.contact_id.clone()),
        )?;
        tx.commit()?;

        let title = match &reminder.contact_name {
            Some(name) => format!("Follow up with {name}"),
            None => "Reminder".to_string(),
        };
        let message = OutgoingMessage {
            user_id: reminder.user_id.clone(),
            method: reminder.notification_method,
            title,
            body: reminder.message.clone(),
            affirmation: self.affirmation(&reminder.user_id, "reminder_sent", now, rng),
            reminder_ids: vec![reminder.id.clone()],
            bundle_id: None,
        };

        match self.transport.send(&message) {
            Ok(()) => {
                tracing::info!(reminder_id = %reminder.id, transport = self.transport.name(), "reminder delivered");
                Ok(FireOutcome::Delivered {
                    reminder_id: reminder.id.clone(),
                })
            }
            Err(e) => self.fail(&reminder.user_id, &message.reminder_ids, e, now),
        }
    }

    fn send_bundle(
        &self,
        delivered: DeliveredBundle,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<FireOutcome> {
        let bundle = delivered.bundle;
        let method = delivered
            .reminders
            .first()
            .map(|r| r.notification_method)
            .unwrap_or(NotificationMethod::InApp);
        let message = OutgoingMessage {
            user_id: bundle.user_id.clone(),
            method,
            title: delivered.message.title,
            body: delivered.message.body,
            affirmation: self.affirmation(&bundle.user_id, "bundle_delivered", now, rng),
            reminder_ids: bundle.reminder_ids.clone(),
            bundle_id: Some(bundle.id.clone()),
        };

        match self.transport.send(&message) {
            Ok(()) => {
                tracing::info!(
                    bundle_id = %bundle.id,
                    size = bundle.reminder_ids.len(),
                    transport = self.transport.name(),
                    "bundle delivered"
                );
                Ok(FireOutcome::BundleDelivered {
                    bundle_id: bundle.id,
                    reminder_ids: bundle.reminder_ids,
                })
            }
            Err(e) => self.fail(&bundle.user_id, &bundle.reminder_ids, e, now),
        }
    }

    fn affirmation(
        &self,
        user_id: &str,
        event_type: &str,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Option<String> {
        let ctx = AffirmationContext {
            event_type: Some(event_type),
            popup_id: None,
        };
        self.affirmations
            .select(user_id, ctx, now, rng)
            .map(|pick| pick.text)
    }

    /// Transport failure: sent → failed for every claimed reminder. No retry.
    fn fail(
        &self,
        user_id: &str,
        reminder_ids: &[String],
        error: TransportError,
        now: DateTime<Utc>,
    ) -> Result<FireOutcome> {
        let error = error.to_string();
        tracing::warn!(user_id, ?reminder_ids, %error, transport = self.transport.name(), "delivery failed");
        let tx = self.db.conn().unchecked_transaction()?;
        for id in reminder_ids {
            if self
                .db
                .transition_reminder(id, &[ReminderStatus::Sent], ReminderStatus::Failed, now)?
            {
                self.db.append_event(&Event::new(
                    user_id,
                    EventPayload::ReminderFailed {
                        reminder_id: id.clone(),
                        error: error.clone(),
                    },
                    EventSource::Scheduler,
                    now,
                ))?;
            }
        }
        tx.commit()?;
        Ok(FireOutcome::Failed {
            reminder_ids: reminder_ids.to_vec(),
            error,
        })
    }
}
