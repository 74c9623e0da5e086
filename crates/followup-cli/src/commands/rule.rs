use clap::Subcommand;
use followup_core::popup::{RuleCondition, TEMPLATES};
use followup_core::{Database, TriggerRule};
use serde_json::json;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum RuleAction {
    /// Add a trigger rule mapping an event type to a popup template
    Add {
        /// Event type (e.g. "reminder_overdue")
        event_type: String,
        /// Template key (see `rule templates`)
        template: String,
        /// Popup priority, 1-10 (defaults to popups.default_priority)
        #[arg(long)]
        priority: Option<u8>,
        /// Minimum seconds between firings
        #[arg(long, default_value = "0")]
        cooldown: i64,
        /// Maximum firings per local day, 0 for unlimited
        #[arg(long, default_value = "0")]
        max_per_day: u32,
        /// Popup lifetime in seconds
        #[arg(long)]
        ttl: Option<i64>,
        /// Conditions as a JSON array (e.g. '[{"type":"has_contact"}]')
        #[arg(long, default_value = "[]")]
        conditions: String,
    },
    /// List the user's trigger rules
    List {
        /// Only rules for this event type
        #[arg(long)]
        event_type: Option<String>,
    },
    /// Delete a trigger rule
    Remove {
        /// Rule ID
        id: String,
    },
    /// Enable a trigger rule
    Enable {
        /// Rule ID
        id: String,
    },
    /// Disable a trigger rule
    Disable {
        /// Rule ID
        id: String,
    },
    /// List the built-in popup templates
    Templates,
}

pub fn run(ctx: &Context, action: RuleAction) -> CliResult {
    let (db, config) = ctx.open()?;

    match action {
        RuleAction::Add {
            event_type,
            template,
            priority,
            cooldown,
            max_per_day,
            ttl,
            conditions,
        } => {
            let priority = priority.unwrap_or(config.popups.default_priority);
            let mut rule = TriggerRule::new(&ctx.user, event_type, template, priority);
            rule.cooldown_seconds = cooldown;
            rule.max_per_day = max_per_day;
            rule.ttl_seconds = ttl;
            rule.conditions = serde_json::from_str::<Vec<RuleCondition>>(&conditions)?;
            rule.created_at = Some(ctx.now);
            rule.validate()?;
            db.insert_trigger_rule(&rule)?;
            print_json(&rule)?;
        }
        RuleAction::List { event_type } => {
            print_json(&db.list_trigger_rules(&ctx.user, event_type.as_deref())?)?;
        }
        RuleAction::Remove { id } => {
            if !db.delete_trigger_rule(&ctx.user, &id)? {
                return Err(format!("rule not found: {id}").into());
            }
            println!("rule {id} removed");
        }
        RuleAction::Enable { id } => set_enabled(&db, ctx, &id, true)?,
        RuleAction::Disable { id } => set_enabled(&db, ctx, &id, false)?,
        RuleAction::Templates => {
            let templates: Vec<_> = TEMPLATES
                .iter()
                .map(|t| json!({ "key": t.key, "title": t.title, "message": t.message }))
                .collect();
            print_json(&templates)?;
        }
    }
    Ok(())
}

fn set_enabled(db: &Database, ctx: &Context, id: &str, enabled: bool) -> CliResult {
    if !db.set_trigger_rule_enabled(&ctx.user, id, enabled)? {
        return Err(format!("rule not found: {id}").into());
    }
    println!("ok");
    Ok(())
}
