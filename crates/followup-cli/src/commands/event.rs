use clap::Subcommand;
use followup_core::{Event, EventPayload, EventQuery, EventSource, TriggerEngine};

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum EventAction {
    /// Record an event and enqueue the popups it triggers
    Emit {
        /// Event type (e.g. "follow_up_required")
        event_type: String,
        /// Event data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
        /// user, system, scheduler or sweep
        #[arg(long, default_value = "user")]
        source: String,
    },
    /// Show logged events, oldest first
    Log {
        /// Only events of this type
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Only events about this reminder
        #[arg(long)]
        reminder: Option<String>,
        /// Maximum number of events
        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

pub fn run(ctx: &Context, action: EventAction) -> CliResult {
    let (db, config) = ctx.open()?;

    match action {
        EventAction::Emit {
            event_type,
            data,
            source,
        } => {
            let data: serde_json::Value = serde_json::from_str(&data)?;
            let payload = EventPayload::parse(&event_type, data)?;
            let event = Event::new(&ctx.user, payload, EventSource::parse(&source), ctx.now);
            let ingested = TriggerEngine::new(&db, &config).ingest(&event)?;
            print_json(&ingested)?;
        }
        EventAction::Log {
            event_type,
            reminder,
            limit,
        } => {
            let mut query = EventQuery::for_user(&ctx.user).limit(limit);
            if let Some(event_type) = event_type {
                query = query.event_type(event_type);
            }
            if let Some(reminder) = reminder {
                query = query.reminder(reminder);
            }
            print_json(&db.query_events(&query)?)?;
        }
    }
    Ok(())
}
