use clap::Subcommand;
use followup_core::{PreferenceStore, UserPreferences};

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Show all preferences for the user
    Show,
    /// Get one preference (e.g. "schedule.quiet_hours_start")
    Get {
        /// Dot-separated key
        key: String,
    },
    /// Set one preference
    Set {
        /// Dot-separated key
        key: String,
        /// New value; JSON literals are accepted
        value: String,
    },
    /// Restore the user's defaults
    Reset,
}

pub fn run(ctx: &Context, action: PrefsAction) -> CliResult {
    let (db, config) = ctx.open()?;
    let store = PreferenceStore::new(&db, config.engine.default_timezone.clone());

    match action {
        PrefsAction::Show => print_json(&store.load(&ctx.user)?)?,
        PrefsAction::Get { key } => match store.get_value(&ctx.user, &key)? {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown key: {key}").into()),
        },
        PrefsAction::Set { key, value } => {
            store.set_value(&ctx.user, &key, &value)?;
            println!("ok");
        }
        PrefsAction::Reset => {
            store.save(&UserPreferences::defaults_for(ctx.user.as_str()))?;
            println!("preferences reset to defaults");
        }
    }
    Ok(())
}
