use clap::Subcommand;
use followup_core::{AffirmationContext, AffirmationEngine, StreakTracker};
use serde_json::json;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum AffirmAction {
    /// Pick an affirmation, honoring cooldown and daily cap
    Pick {
        /// Event type that prompted it (selects categories)
        #[arg(long)]
        event_type: Option<String>,
    },
    /// Show the user's current completion streak
    Streak,
}

pub fn run(ctx: &Context, action: AffirmAction) -> CliResult {
    let (db, config) = ctx.open()?;

    match action {
        AffirmAction::Pick { event_type } => {
            let pick = AffirmationEngine::new(&db, &config.engine.default_timezone).select(
                &ctx.user,
                AffirmationContext {
                    event_type: event_type.as_deref(),
                    popup_id: None,
                },
                ctx.now,
                &mut rand::thread_rng(),
            );
            print_json(&pick)?;
        }
        AffirmAction::Streak => {
            let days = StreakTracker::new(&db, &config).current(&ctx.user, ctx.now)?;
            print_json(&json!({ "user_id": ctx.user, "streak_days": days }))?;
        }
    }
    Ok(())
}
