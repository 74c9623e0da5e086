//! # Followup Core Library
//!
//! The notification trust and triggering engine behind the `followup` CLI.
//! It decides, for every scheduled reminder, whether to hold it back, how
//! to group colliding reminders, how long a snooze should last, and how
//! behavioral events become a prioritized, rate-limited popup queue.
//!
//! ## Architecture
//!
//! Every operation is a short, independent invocation against a shared
//! SQLite store. There is no in-process scheduler: callers pass `now`
//! explicitly and an external service re-invokes
//! [`NotificationEngine::fire`] at the times the engine asks for.
//!
//! ## Key Components
//!
//! - [`SuppressionEngine`]: quiet hours, working hours, daily caps and the
//!   next permissible delivery time
//! - [`Bundler`]: merges reminders scheduled close together
//! - [`SnoozeRecommender`]: snooze durations mined from history
//! - [`TriggerEngine`], [`PopupQueue`], [`ActionResolver`]: the popup pipeline
//! - [`AffirmationEngine`]: rate-limited, non-repeating encouragement
//! - [`Database`], [`Config`], [`PreferenceStore`]: persistence

pub mod affirmation;
pub mod bundle;
pub mod engine;
pub mod error;
pub mod events;
pub mod popup;
pub mod preferences;
pub mod reminder;
pub mod snooze;
pub mod storage;
pub mod streak;
pub mod suppression;
pub mod sweeps;
pub mod tz;

pub use affirmation::{AffirmationCategory, AffirmationContext, AffirmationEngine, AffirmationPick};
pub use bundle::{BundleFormat, Bundler, ConflictOutcome, ReminderBundle};
pub use engine::{DeliveryTransport, FireOutcome, NotificationEngine, OutgoingMessage, Scheduler};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::{Event, EventPayload, EventSource};
pub use popup::{
    ActionKind, ActionOutcome, ActionResolver, Dequeued, Popup, PopupQueue, PopupStatus,
    TriggerEngine, TriggerRule,
};
pub use preferences::UserPreferences;
pub use reminder::{NotificationMethod, Reminder, ReminderStatus};
pub use snooze::{SnoozeContext, SnoozeReason, SnoozeRecommender, SnoozeSuggestion};
pub use storage::{Config, Database, EventQuery, PreferenceStore};
pub use streak::StreakTracker;
pub use suppression::{SuppressionDecision, SuppressionEngine, SuppressionReason};
pub use sweeps::{SweepReport, Sweeps};
