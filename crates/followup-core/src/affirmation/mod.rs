//! Affirmation selection.
//!
//! Affirmations are enrichment: [`AffirmationEngine::select`] never fails,
//! it returns `None` and logs instead. The rate-limit reads, the pick and
//! the ledger write share one write-locked transaction, so two concurrent
//! selections cannot both pass the cooldown.

mod catalog;

pub use catalog::{Affirmation, CATALOG};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::RngCore;
use rusqlite::{Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::events::{Event, EventPayload, EventSource};
use crate::storage::{Database, PreferenceStore};
use crate::tz::local_day_bounds;

/// Usages remembered for anti-repetition.
const RECENT_WINDOW: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffirmationCategory {
    SalesMomentum,
    Focus,
    Consistency,
    GeneralPositive,
    Resilience,
    CalmProductivity,
}

impl AffirmationCategory {
    pub const ALL: [AffirmationCategory; 6] = [
        AffirmationCategory::SalesMomentum,
        AffirmationCategory::Focus,
        AffirmationCategory::Consistency,
        AffirmationCategory::GeneralPositive,
        AffirmationCategory::Resilience,
        AffirmationCategory::CalmProductivity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AffirmationCategory::SalesMomentum => "sales_momentum",
            AffirmationCategory::Focus => "focus",
            AffirmationCategory::Consistency => "consistency",
            AffirmationCategory::GeneralPositive => "general_positive",
            AffirmationCategory::Resilience => "resilience",
            AffirmationCategory::CalmProductivity => "calm_productivity",
        }
    }

    /// Categories that suit an event type, most fitting first.
    pub fn for_event(event_type: Option<&str>) -> &'static [AffirmationCategory] {
        use AffirmationCategory::*;
        match event_type {
            Some("follow_up_required" | "reminder_sent" | "bundle_delivered") => {
                &[SalesMomentum, Focus]
            }
            Some("reminder_completed" | "streak_achieved") => &[Consistency, GeneralPositive],
            Some(
                "inactivity_detected" | "reminder_overdue" | "reminder_failed" | "reminder_dismissed"
                | "reminder_snoozed",
            ) => &[Resilience, CalmProductivity],
            _ => &Self::ALL,
        }
    }
}

impl fmt::Display for AffirmationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AffirmationCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "affirmation category",
                value: s.to_string(),
            })
    }
}

/// One row of the usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffirmationUsage {
    pub user_id: String,
    pub affirmation_id: String,
    pub category: AffirmationCategory,
    pub shown_at: DateTime<Utc>,
    pub popup_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffirmationPick {
    pub affirmation_id: String,
    pub category: AffirmationCategory,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AffirmationContext<'a> {
    pub event_type: Option<&'a str>,
    pub popup_id: Option<&'a str>,
}

pub struct AffirmationEngine<'a> {
    db: &'a Database,
    prefs: PreferenceStore<'a>,
}

impl<'a> AffirmationEngine<'a> {
    pub fn new(db: &'a Database, default_timezone: &str) -> Self {
        Self {
            db,
            prefs: PreferenceStore::new(db, default_timezone),
        }
    }

    /// Pick, record and return an affirmation, or `None` when rate limits,
    /// preferences or an internal error prevent one.
    pub fn select(
        &self,
        user_id: &str,
        ctx: AffirmationContext<'_>,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Option<AffirmationPick> {
        match self.try_select(user_id, ctx, now, rng) {
            Ok(pick) => pick,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "affirmation selection failed");
                None
            }
        }
    }

    fn try_select(
        &self,
        user_id: &str,
        ctx: AffirmationContext<'_>,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<Option<AffirmationPick>> {
        let prefs = self.prefs.load(user_id)?;
        let settings = &prefs.affirmations;
        if !settings.enabled {
            return Ok(None);
        }

        let tx = Transaction::new_unchecked(self.db.conn(), TransactionBehavior::Immediate)?;
        if let Some(last) = self.db.last_affirmation_at(user_id)? {
            if now < last + Duration::minutes(settings.cooldown_minutes.max(0)) {
                tracing::debug!(user_id, "affirmation cooldown active");
                return Ok(None);
            }
        }

        let (day_start, day_end) = local_day_bounds(self.prefs.timezone(&prefs), now);
        if self.db.count_affirmations_between(user_id, day_start, day_end)? >= settings.daily_cap {
            tracing::debug!(user_id, "affirmation daily cap reached");
            return Ok(None);
        }

        let mut candidates: Vec<AffirmationCategory> = AffirmationCategory::for_event(ctx.event_type)
            .iter()
            .copied()
            .filter(|c| settings.categories.contains(c))
            .collect();
        if settings.categories.contains(&AffirmationCategory::GeneralPositive)
            && !candidates.contains(&AffirmationCategory::GeneralPositive)
        {
            candidates.push(AffirmationCategory::GeneralPositive);
        }

        let recent = self.db.recent_affirmations(user_id, RECENT_WINDOW)?;
        // Rotate away from the category shown last when there is a choice.
        if let Some(last) = recent.first() {
            if candidates.len() > 1 {
                candidates.retain(|c| *c != last.category);
            }
        }

        let Some(&category) = candidates.choose(rng) else {
            return Ok(None);
        };

        let full: Vec<&Affirmation> = catalog::pool(category).collect();
        let fresh: Vec<&Affirmation> = full
            .iter()
            .copied()
            .filter(|a| !recent.iter().any(|u| u.affirmation_id == a.id))
            .collect();
        let pool = if fresh.is_empty() { &full } else { &fresh };
        let Some(&chosen) = pool.choose(rng) else {
            return Ok(None);
        };

        let usage = AffirmationUsage {
            user_id: user_id.to_string(),
            affirmation_id: chosen.id.to_string(),
            category,
            shown_at: now,
            popup_id: ctx.popup_id.map(str::to_string),
        };
        self.db.insert_affirmation_usage(&usage)?;
        self.db.append_event(&Event::new(
            user_id,
            EventPayload::AffirmationShown {
                affirmation_id: usage.affirmation_id.clone(),
                category,
                popup_id: usage.popup_id.clone(),
            },
            EventSource::System,
            now,
        ))?;
        tx.commit()?;

        tracing::debug!(user_id, affirmation = chosen.id, %category, "affirmation selected");
        Ok(Some(AffirmationPick {
            affirmation_id: usage.affirmation_id,
            category,
            text: chosen.text.to_string(),
        }))
    }
}
