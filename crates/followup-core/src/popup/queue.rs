//! Pull queue: one popup per call.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::Popup;
use crate::affirmation::{AffirmationContext, AffirmationEngine};
use crate::error::{CoreError, Result};
use crate::events::{Event, EventPayload, EventSource};
use crate::storage::{Config, Database};

/// A dequeued popup. `transitioned` is false when another caller won the
/// display transition for the same popup; such a caller must not treat the
/// popup as newly shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dequeued {
    pub popup: Popup,
    pub transitioned: bool,
}

pub struct PopupQueue<'a> {
    db: &'a Database,
    affirmations: AffirmationEngine<'a>,
}

impl<'a> PopupQueue<'a> {
    pub fn new(db: &'a Database, config: &Config) -> Self {
        Self {
            db,
            affirmations: AffirmationEngine::new(db, &config.engine.default_timezone),
        }
    }

    /// Surface the best eligible popup for `user_id`.
    ///
    /// Expired popups are swept first. The winner of the display
    /// transition logs `popup_shown` and gets an affirmation attached.
    pub fn next(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Dequeued>> {
        match self.db.expire_popups(user_id, now) {
            Ok(0) => {}
            Ok(n) => tracing::debug!(user_id, expired = n, "expired stale popups"),
            // Expiry is advisory; eligibility below re-checks `expires_at`.
            Err(e) => tracing::warn!(user_id, error = %e, "popup expiry sweep failed"),
        }

        let Some(candidate) = self.db.eligible_popups(user_id, now, 1)?.into_iter().next() else {
            return Ok(None);
        };

        if !self.db.claim_popup(&candidate, now)? {
            tracing::debug!(popup_id = %candidate.id, "lost display race");
            let popup = self.db.get_popup(&candidate.id)?.unwrap_or(candidate);
            return Ok(Some(Dequeued {
                popup,
                transitioned: false,
            }));
        }

        self.db.append_event(&Event::new(
            user_id,
            EventPayload::PopupShown {
                popup_id: candidate.id.clone(),
            },
            EventSource::System,
            now,
        ))?;

        let ctx = AffirmationContext {
            event_type: candidate.trigger_event_type(),
            popup_id: Some(&candidate.id),
        };
        if let Some(pick) = self.affirmations.select(user_id, ctx, now, rng) {
            if let Err(e) = self.db.set_popup_affirmation(&candidate.id, &pick.text) {
                tracing::warn!(popup_id = %candidate.id, error = %e, "could not attach affirmation");
            }
        }

        let popup = self
            .db
            .get_popup(&candidate.id)?
            .ok_or_else(|| CoreError::not_found("popup", &candidate.id))?;
        tracing::info!(popup_id = %popup.id, user_id, priority = popup.priority, "popup displayed");
        Ok(Some(Dequeued {
            popup,
            transitioned: true,
        }))
    }

    /// Hide an open popup until `now + minutes`.
    pub fn snooze(&self, popup_id: &str, minutes: i64, now: DateTime<Utc>) -> Result<bool> {
        let until = now + Duration::minutes(minutes.max(1));
        let snoozed = self.db.snooze_popup(popup_id, until, None)?;
        if snoozed {
            tracing::debug!(popup_id, %until, "popup snoozed");
        }
        Ok(snoozed)
    }
}
