pub mod affirm;
pub mod config;
pub mod event;
pub mod popup;
pub mod prefs;
pub mod reminder;
pub mod rule;
pub mod snooze;
pub mod sweep;

use chrono::{DateTime, Utc};
use followup_core::engine::TransportError;
use followup_core::{Config, Database, DeliveryTransport, OutgoingMessage, Scheduler};
use serde::Serialize;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Per-invocation settings shared by every command.
pub struct Context {
    pub user: String,
    pub now: DateTime<Utc>,
}

impl Context {
    pub fn open(&self) -> Result<(Database, Config), Box<dyn std::error::Error>> {
        Ok((Database::open()?, Config::load()?))
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Delivery through the log. A real transport is wired in by the host
/// service; the CLI only records what would have been sent.
pub struct LogTransport;

impl DeliveryTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        tracing::info!(
            user_id = %message.user_id,
            method = message.method.as_str(),
            reminders = message.reminder_ids.len(),
            title = %message.title,
            "delivered"
        );
        Ok(())
    }
}

/// Retry requests are logged; the caller re-runs `reminder fire` at the
/// reported `next_attempt_time`.
pub struct LogScheduler;

impl Scheduler for LogScheduler {
    fn schedule(&self, reminder_id: &str, at: DateTime<Utc>) -> Result<(), TransportError> {
        tracing::info!(reminder_id, at = %at, "retry requested");
        Ok(())
    }
}
