use clap::Subcommand;
use followup_core::Sweeps;
use serde_json::json;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum SweepAction {
    /// Flag reminders past their grace period
    Overdue,
    /// Flag users with no recent activity
    Inactivity,
    /// Run every sweep
    All,
}

pub fn run(ctx: &Context, action: SweepAction) -> CliResult {
    let (db, config) = ctx.open()?;
    let sweeps = Sweeps::new(&db, &config);

    match action {
        SweepAction::Overdue => print_json(&sweeps.detect_overdue(ctx.now)?)?,
        SweepAction::Inactivity => print_json(&sweeps.detect_inactivity(ctx.now)?)?,
        SweepAction::All => {
            let overdue = sweeps.detect_overdue(ctx.now)?;
            let inactivity = sweeps.detect_inactivity(ctx.now)?;
            print_json(&json!({ "overdue": overdue, "inactivity": inactivity }))?;
        }
    }
    Ok(())
}
