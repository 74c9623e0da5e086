use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use followup_core::{
    ActionResolver, Bundler, CoreError, NotificationEngine, NotificationMethod, Reminder,
    ReminderStatus, SnoozeContext, SnoozeReason, SnoozeRecommender,
};
use serde_json::json;

use super::{print_json, CliResult, Context, LogScheduler, LogTransport};

#[derive(Subcommand)]
pub enum ReminderAction {
    /// Schedule a reminder and check it for bundle conflicts
    Add {
        /// Reminder text
        message: String,
        /// Delivery time (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,
        /// email, push or in_app
        #[arg(long, default_value = "push")]
        method: String,
        /// Contact this reminder follows up on
        #[arg(long)]
        contact: Option<String>,
        /// Contact display name
        #[arg(long, requires = "contact")]
        contact_name: Option<String>,
    },
    /// List reminders
    List {
        /// Only reminders with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Evaluate and deliver a reminder whose time has come
    Fire {
        /// Reminder ID
        id: String,
    },
    /// Snooze a reminder
    Snooze {
        /// Reminder ID
        id: String,
        /// Minutes to snooze; a smart suggestion is used when omitted
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// Mark a reminder done
    Complete {
        /// Reminder ID
        id: String,
    },
    /// Dismiss a reminder without completing it
    Dismiss {
        /// Reminder ID
        id: String,
    },
}

pub fn run(ctx: &Context, action: ReminderAction) -> CliResult {
    let (db, config) = ctx.open()?;
    let tz = config.engine.default_timezone.as_str();

    match action {
        ReminderAction::Add {
            message,
            at,
            method,
            contact,
            contact_name,
        } => {
            let method: NotificationMethod = method.parse()?;
            let mut reminder = Reminder::new(&ctx.user, message, at, method);
            if let Some(contact) = contact {
                reminder = reminder.with_contact(contact, contact_name);
            }
            db.insert_reminder(&reminder)?;
            let conflicts = Bundler::new(&db, tz).check_and_handle_conflicts(
                &ctx.user,
                &reminder.id,
                reminder.scheduled_time,
                ctx.now,
            )?;
            print_json(&json!({ "reminder": reminder, "conflicts": conflicts }))?;
        }
        ReminderAction::List { status } => {
            let status = status
                .map(|s| s.parse::<ReminderStatus>())
                .transpose()?;
            print_json(&db.list_reminders(&ctx.user, status)?)?;
        }
        ReminderAction::Fire { id } => {
            let engine = NotificationEngine::new(&db, &config, &LogTransport, &LogScheduler);
            let outcome = engine.fire(&id, ctx.now, &mut rand::thread_rng())?;
            print_json(&outcome)?;
        }
        ReminderAction::Snooze { id, minutes } => {
            let reminder = load(&db, &id)?;
            let (minutes, reason) = match minutes {
                Some(m) => (m.max(1), SnoozeReason::UserAction),
                None => {
                    let suggested = SnoozeRecommender::new(&db, tz)
                        .suggest(&ctx.user, Some(&id), SnoozeContext { now: ctx.now, timezone: None })?
                        .map_or(followup_core::popup::DEFAULT_SNOOZE_MINUTES, |s| s.duration_minutes);
                    (suggested, SnoozeReason::SmartSuggestion)
                }
            };
            let until = ctx.now + Duration::minutes(minutes);
            let popups = ActionResolver::new(&db, &config)
                .snooze(&reminder, until, reason, ctx.now)?
                .ok_or_else(|| format!("reminder {id} is {} and cannot be snoozed", reminder.status.as_str()))?;
            print_json(&json!({
                "reminder_id": id,
                "minutes": minutes,
                "reason": reason,
                "snooze_until": until,
                "popups": popups,
            }))?;
        }
        ReminderAction::Complete { id } => {
            let reminder = load(&db, &id)?;
            let popups = ActionResolver::new(&db, &config).complete(&reminder, ctx.now)?;
            print_json(&json!({ "reminder_id": id, "popups": popups }))?;
        }
        ReminderAction::Dismiss { id } => {
            let reminder = load(&db, &id)?;
            let popups = ActionResolver::new(&db, &config).dismiss(&reminder, ctx.now)?;
            print_json(&json!({ "reminder_id": id, "popups": popups }))?;
        }
    }
    Ok(())
}

fn load(db: &followup_core::Database, id: &str) -> Result<Reminder, CoreError> {
    db.get_reminder(id)?
        .ok_or_else(|| CoreError::not_found("reminder", id))
}
