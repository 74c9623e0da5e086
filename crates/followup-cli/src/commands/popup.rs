use clap::Subcommand;
use followup_core::{ActionResolver, PopupQueue, PopupStatus};
use serde_json::json;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum PopupAction {
    /// Take the next eligible popup off the queue
    Next,
    /// Answer a popup
    Act {
        /// Popup ID
        id: String,
        /// FOLLOW_UP_NOW, MARK_DONE, SNOOZE or DISMISS
        action: String,
        /// Action data as a JSON object (e.g. '{"minutes": 60}')
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Hide a popup for a number of minutes
    Snooze {
        /// Popup ID
        id: String,
        #[arg(long, default_value_t = followup_core::popup::DEFAULT_SNOOZE_MINUTES)]
        minutes: i64,
    },
    /// List the user's popups
    List {
        /// queued, displayed, acted or expired
        #[arg(long)]
        status: Option<String>,
    },
}

pub fn run(ctx: &Context, action: PopupAction) -> CliResult {
    let (db, config) = ctx.open()?;

    match action {
        PopupAction::Next => {
            let next = PopupQueue::new(&db, &config).next(&ctx.user, ctx.now, &mut rand::thread_rng())?;
            print_json(&next)?;
        }
        PopupAction::Act { id, action, data } => {
            let data: serde_json::Value = serde_json::from_str(&data)?;
            let outcome = ActionResolver::new(&db, &config).apply(&id, &action, &data, ctx.now)?;
            print_json(&outcome)?;
        }
        PopupAction::Snooze { id, minutes } => {
            let snoozed = PopupQueue::new(&db, &config).snooze(&id, minutes, ctx.now)?;
            print_json(&json!({ "popup_id": id, "snoozed": snoozed }))?;
        }
        PopupAction::List { status } => {
            let status = status.map(|s| s.parse::<PopupStatus>()).transpose()?;
            print_json(&db.list_popups(&ctx.user, status)?)?;
        }
    }
    Ok(())
}
