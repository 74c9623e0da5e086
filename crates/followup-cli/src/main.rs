use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use followup_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "followup", version, about = "Followup notification engine CLI")]
struct Cli {
    /// User the command acts for
    #[arg(long, global = true, default_value = "local")]
    user: String,
    /// Evaluate as of this instant (RFC 3339) instead of the wall clock
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reminder scheduling and delivery
    Reminder {
        #[command(subcommand)]
        action: commands::reminder::ReminderAction,
    },
    /// Per-user preferences
    Prefs {
        #[command(subcommand)]
        action: commands::prefs::PrefsAction,
    },
    /// Behavioral event ingestion
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Popup queue
    Popup {
        #[command(subcommand)]
        action: commands::popup::PopupAction,
    },
    /// Snooze suggestions and history
    Snooze {
        #[command(subcommand)]
        action: commands::snooze::SnoozeAction,
    },
    /// Affirmations
    Affirm {
        #[command(subcommand)]
        action: commands::affirm::AffirmAction,
    },
    /// Trigger rule management
    Rule {
        #[command(subcommand)]
        action: commands::rule::RuleAction,
    },
    /// Overdue and inactivity detection
    Sweep {
        #[command(subcommand)]
        action: commands::sweep::SweepAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOLLOWUP_LOG")
        .unwrap_or_else(|_| EnvFilter::new(Config::load_or_default().logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let ctx = commands::Context {
        user: cli.user,
        now: cli.now.unwrap_or_else(Utc::now),
    };
    let result = match cli.command {
        Commands::Reminder { action } => commands::reminder::run(&ctx, action),
        Commands::Prefs { action } => commands::prefs::run(&ctx, action),
        Commands::Event { action } => commands::event::run(&ctx, action),
        Commands::Popup { action } => commands::popup::run(&ctx, action),
        Commands::Snooze { action } => commands::snooze::run(&ctx, action),
        Commands::Affirm { action } => commands::affirm::run(&ctx, action),
        Commands::Rule { action } => commands::rule::run(&ctx, action),
        Commands::Sweep { action } => commands::sweep::run(&ctx, action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
