use chrono::Duration;
use clap::Subcommand;
use followup_core::{SnoozeContext, SnoozeRecommender};

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum SnoozeAction {
    /// Suggest a snooze duration from the user's history
    Suggest {
        /// Reminder being snoozed
        #[arg(long)]
        reminder: Option<String>,
        /// Evaluate in this IANA timezone instead of the user's
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Show snooze history
    History {
        /// How many days back
        #[arg(long, default_value = "30")]
        days: i64,
    },
}

pub fn run(ctx: &Context, action: SnoozeAction) -> CliResult {
    let (db, config) = ctx.open()?;
    let recommender = SnoozeRecommender::new(&db, &config.engine.default_timezone);

    match action {
        SnoozeAction::Suggest { reminder, timezone } => {
            let suggestion = recommender.suggest(
                &ctx.user,
                reminder.as_deref(),
                SnoozeContext {
                    now: ctx.now,
                    timezone: timezone.as_deref(),
                },
            )?;
            match suggestion {
                Some(s) => print_json(&s)?,
                None => println!("smart suggestions are disabled"),
            }
        }
        SnoozeAction::History { days } => {
            let since = ctx.now - Duration::days(days.max(0));
            print_json(&db.snoozes_since(&ctx.user, since)?)?;
        }
    }
    Ok(())
}
